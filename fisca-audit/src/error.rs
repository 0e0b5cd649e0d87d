//! Error types for fisca-audit
//!
//! Detected anomalies are findings, not errors. These types cover the
//! remaining failure paths: a control faulting internally, a malformed rule
//! catalogue, and session-level faults surfaced by the runner.

use thiserror::Error;

/// Internal fault raised by one control evaluator
///
/// Converted by the runner into a single `ERREUR_EXEC` finding for the
/// control's reference. Never used for data conditions the control detects.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Context data the control relies on is inconsistent
    #[error("Inconsistent context: {0}")]
    Context(String),

    /// Numeric computation produced an unusable value
    #[error("Computation failed: {0}")]
    Computation(String),

    /// Evaluator panicked
    #[error("Control panicked: {0}")]
    Panic(String),
}

/// Rule catalogue validation error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two definitions share a reference code
    #[error("Duplicate control reference: {0}")]
    DuplicateReference(String),

    /// Reference prefix does not belong to the declared level
    #[error("Control {reference} declared at level {niveau} but its prefix belongs elsewhere")]
    LevelMismatch { reference: String, niveau: u8 },

    /// Phase is not the one owning the declared level
    #[error("Control {reference} declared for {phase} but level {niveau} is evaluated in another phase")]
    PhaseMismatch {
        reference: String,
        niveau: u8,
        phase: String,
    },

    /// Lookup of an unknown reference
    #[error("Unknown control reference: {0}")]
    UnknownReference(String),
}

/// Audit engine error
#[derive(Debug, Error)]
pub enum AuditError {
    /// Session-level fault (halts the run, session goes to ERREUR)
    #[error("Session fault: {0}")]
    Session(String),

    /// Required context missing for an active level
    #[error("Missing context for level {niveau}: {what}")]
    MissingContext { niveau: u8, what: String },

    /// Invalid lifecycle transition
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Rule catalogue error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Control fault
    #[error(transparent)]
    Control(#[from] ControlError),

    /// fisca-common error
    #[error("Common error: {0}")]
    Common(#[from] fisca_common::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_converts() {
        let err: AuditError = RegistryError::DuplicateReference("F-001".to_string()).into();
        assert!(matches!(err, AuditError::Registry(_)));
        assert_eq!(err.to_string(), "Duplicate control reference: F-001");
    }

    #[test]
    fn test_missing_context_message() {
        let err = AuditError::MissingContext {
            niveau: 2,
            what: "plan comptable vide".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing context for level 2: plan comptable vide"
        );
    }
}
