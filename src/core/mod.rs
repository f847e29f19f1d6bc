//! Core engine for shiprel
//!
//! - **config**: `shiprel.toml` parsing and validation
//! - **error**: error types with contextual help messages and exit codes
//! - **process**: external command execution
//! - **state**: the persisted `release-status` record
//! - **vcs**: source control abstraction (system git)
//! - **version**: snapshot and release version handling

pub mod config;
pub mod error;
pub mod process;
pub mod state;
pub mod vcs;
pub mod version;
