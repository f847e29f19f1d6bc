//! CLI commands for shiprel
//!
//! - **release**: run or resume the release in the current releases directory
//! - **init**: create `shiprel.toml` for a feed in an empty directory
//! - **status**: show how far the release in progress got
//! - **abandon**: roll back a release that has not been tagged yet

pub mod abandon;
pub mod init;
pub mod release;
pub mod status;

pub use abandon::run_abandon;
pub use init::run_init;
pub use release::run_release;
pub use status::run_status;
