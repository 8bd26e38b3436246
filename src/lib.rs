//! Durable file relay for bot uploads and reconciliation of CRM file fields.

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod core;
pub mod crm;
pub mod environment;
pub mod error;
pub mod relay;
pub mod sanitizer;
pub mod sweep;
pub mod throttle;
pub mod types;
pub mod utils;
pub mod web;

pub use classifier::Classifier;
pub use relay::{is_ephemeral_reference, RelayService};
pub use sweep::{ReconciliationSweep, SweepOptions, SweepRunner};
pub use web::start_web_server;
