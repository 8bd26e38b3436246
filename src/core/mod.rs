// src/core/mod.rs
//! Shared plumbing: configuration, file system and HTTP client

pub mod config_manager;
pub mod fs_ops;
pub mod service_client;

pub use config_manager::{ConfigManager, ServiceConfig};
pub use fs_ops::FsOps;
pub use service_client::{HttpError, ServiceClient};
