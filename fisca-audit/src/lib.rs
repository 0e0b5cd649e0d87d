//! fisca-audit library interface
//!
//! Control-point engine auditing SYSCOHADA trial balances: a validated rule
//! registry, the control functions of levels 0 to 8, the runner executing
//! them in phases, and the reporter comparing two sessions.

pub mod context;
pub mod controls;
pub mod diff;
pub mod error;
pub mod event_bridge;
pub mod export;
pub mod loader;
pub mod models;
pub mod reference;
pub mod registry;
pub mod runner;

pub use crate::context::{AuditContext, TypeLiasse};
pub use crate::error::{AuditError, AuditResult, ControlError, RegistryError};
pub use crate::registry::ControlRegistry;
pub use crate::runner::{AuditObserver, AuditRunner, NoopObserver, TokenObserver};
