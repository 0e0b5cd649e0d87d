//! Control function set
//!
//! One evaluator per rule, grouped by level. Every evaluator has the same
//! signature and always returns a sequence of findings (usually one).
//! Data conditions are reported as findings; `Err` is reserved for internal
//! faults, which the runner turns into an `ERREUR_EXEC` finding.

pub mod helpers;
pub mod level0;
pub mod level1;
pub mod level2;
pub mod level3;
pub mod level4;
pub mod level5;
pub mod level6;
pub mod level7;
pub mod level8;

use crate::context::AuditContext;
use crate::error::ControlError;
use crate::models::{Niveau, PhaseAudit, ResultatControle, Severite};
use std::fmt;

/// Evaluator signature shared by every control
pub type ControlFn = fn(&AuditContext) -> Result<Vec<ResultatControle>, ControlError>;

/// Identity of a control, used to build its findings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMeta {
    pub reference: &'static str,
    pub nom: &'static str,
    pub niveau: Niveau,
}

impl ControlMeta {
    pub const fn new(reference: &'static str, nom: &'static str, niveau: Niveau) -> Self {
        Self {
            reference,
            nom,
            niveau,
        }
    }

    pub fn ok(&self, message: impl Into<String>) -> ResultatControle {
        ResultatControle::ok(self.reference, self.nom, self.niveau, message)
    }

    pub fn anomalie(&self, severite: Severite, message: impl Into<String>) -> ResultatControle {
        ResultatControle::anomalie(self.reference, self.nom, self.niveau, severite, message)
    }

    pub fn non_applicable(&self, message: impl Into<String>) -> ResultatControle {
        ResultatControle::non_applicable(self.reference, self.nom, self.niveau, message)
    }

    pub fn erreur_exec(&self, message: impl Into<String>) -> ResultatControle {
        ResultatControle::erreur_exec(self.reference, self.nom, self.niveau, message)
    }
}

/// Static definition of one control
#[derive(Clone)]
pub struct ControlDefinition {
    pub reference: &'static str,
    pub niveau: Niveau,
    pub nom: &'static str,
    pub description: &'static str,
    pub severite_defaut: Severite,
    pub phase: PhaseAudit,
    pub actif: bool,
    pub evaluator: ControlFn,
}

impl ControlDefinition {
    /// Active definition owned by the phase of its level
    pub fn new(
        meta: ControlMeta,
        description: &'static str,
        severite_defaut: Severite,
        evaluator: ControlFn,
    ) -> Self {
        Self {
            reference: meta.reference,
            niveau: meta.niveau,
            nom: meta.nom,
            description,
            severite_defaut,
            phase: meta.niveau.phase(),
            actif: true,
            evaluator,
        }
    }

    pub fn meta(&self) -> ControlMeta {
        ControlMeta::new(self.reference, self.nom, self.niveau)
    }

    pub fn evaluate(&self, ctx: &AuditContext) -> Result<Vec<ResultatControle>, ControlError> {
        (self.evaluator)(ctx)
    }
}

impl fmt::Debug for ControlDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlDefinition")
            .field("reference", &self.reference)
            .field("niveau", &self.niveau)
            .field("nom", &self.nom)
            .field("severite_defaut", &self.severite_defaut)
            .field("phase", &self.phase)
            .field("actif", &self.actif)
            .finish()
    }
}

/// Built-in catalogue in declaration order (level by level)
pub fn standard_definitions() -> Vec<ControlDefinition> {
    let mut defs = Vec::new();
    defs.extend(level0::definitions());
    defs.extend(level1::definitions());
    defs.extend(level2::definitions());
    defs.extend(level3::definitions());
    defs.extend(level4::definitions());
    defs.extend(level5::definitions());
    defs.extend(level6::definitions());
    defs.extend(level7::definitions());
    defs.extend(level8::definitions());
    defs
}
