//! # Fisca Common Library
//!
//! Shared code for the fisca crates including:
//! - Error types
//! - Audit configuration loading (TOML, environment, compiled defaults)
//! - Audit event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use config::AuditConfig;
pub use error::{Error, Result};
pub use events::{AuditEvent, EventBus};
