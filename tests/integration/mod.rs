//! Integration tests for the shiprel binary

mod helpers;
mod test_init;
mod test_release;
mod test_status;
