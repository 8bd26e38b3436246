// src/relay/mod.rs
//! File relay: ephemeral platform file ids in, permanent URLs out.

pub mod file_api;
pub mod naming;
pub mod service;
pub mod storage;

pub use crate::classifier::is_ephemeral_reference;
pub use file_api::{BotFileApi, FileApi};
pub use naming::NamingScheme;
pub use service::RelayService;
pub use storage::{DurableStore, LocalStore, StoreOutcome};
