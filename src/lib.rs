//! Symlink-based dotfiles manager: scans package directories, computes the
//! desired symlink layout, resolves conflicts against resolution policies,
//! and executes the resulting plan with checkpointing and rollback.

pub mod client;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod fs;
pub mod ignore;
pub mod manifest;
pub mod operation;
pub mod path;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod retry;
pub mod scanner;

pub use client::{Client, ClientConfig, PackageInfo, Status, StatusEntry, UnmanageOptions};
pub use error::{Error, Result};
