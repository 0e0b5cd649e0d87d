//! Rule registry
//!
//! Immutable catalogue of control definitions, validated when it is built.
//! The built-in catalogue is initialised once and shared.

use crate::controls::{standard_definitions, ControlDefinition};
use crate::error::RegistryError;
use crate::models::{Niveau, PhaseAudit};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use tracing::debug;

static STANDARD: Lazy<Result<ControlRegistry, RegistryError>> = Lazy::new(|| {
    let registry = ControlRegistry::new(standard_definitions())?;
    debug!(controls = registry.len(), "Standard control registry loaded");
    Ok(registry)
});

/// Validated, ordered set of control definitions
#[derive(Debug, Clone)]
pub struct ControlRegistry {
    definitions: Vec<ControlDefinition>,
}

impl ControlRegistry {
    /// Validate and build a registry
    ///
    /// Rejects duplicate references, reference prefixes that do not belong
    /// to the declared level, and phases that do not own the level.
    pub fn new(definitions: Vec<ControlDefinition>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(definitions.len());
        for def in &definitions {
            if !seen.insert(def.reference) {
                return Err(RegistryError::DuplicateReference(def.reference.to_string()));
            }
            if !def
                .niveau
                .reference_prefixes()
                .iter()
                .any(|p| def.reference.starts_with(p))
            {
                return Err(RegistryError::LevelMismatch {
                    reference: def.reference.to_string(),
                    niveau: def.niveau.value(),
                });
            }
            if def.phase != def.niveau.phase() {
                return Err(RegistryError::PhaseMismatch {
                    reference: def.reference.to_string(),
                    niveau: def.niveau.value(),
                    phase: def.phase.to_string(),
                });
            }
        }
        Ok(Self { definitions })
    }

    /// Built-in SYSCOHADA catalogue
    pub fn standard() -> Result<&'static ControlRegistry, RegistryError> {
        STANDARD.as_ref().map_err(Clone::clone)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlDefinition> {
        self.definitions.iter()
    }

    pub fn get(&self, reference: &str) -> Option<&ControlDefinition> {
        self.definitions.iter().find(|d| d.reference == reference)
    }

    /// Active definitions of one level, in declaration order
    pub fn for_level(&self, niveau: Niveau) -> Vec<&ControlDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.actif && d.niveau == niveau)
            .collect()
    }

    /// Active definitions evaluated by a phase, level by level
    pub fn for_phase(&self, phase: PhaseAudit) -> Vec<&ControlDefinition> {
        Self::levels_for_phase(phase)
            .iter()
            .flat_map(|n| self.for_level(*n))
            .collect()
    }

    pub fn levels_for_phase(phase: PhaseAudit) -> &'static [Niveau] {
        phase.levels()
    }

    /// Number of active definitions a phase will evaluate
    pub fn active_count(&self, phase: PhaseAudit) -> usize {
        self.for_phase(phase).len()
    }

    /// Copy of this registry with one rule switched off
    pub fn deactivate(&self, reference: &str) -> Result<Self, RegistryError> {
        self.with_inactive(&[reference])
    }

    /// Copy of this registry with several rules switched off
    ///
    /// Other rules keep their reference, level and order.
    pub fn with_inactive(&self, references: &[&str]) -> Result<Self, RegistryError> {
        if let Some(unknown) = references.iter().find(|r| self.get(r).is_none()) {
            return Err(RegistryError::UnknownReference(unknown.to_string()));
        }
        let definitions = self
            .definitions
            .iter()
            .cloned()
            .map(|mut d| {
                if references.contains(&d.reference) {
                    d.actif = false;
                }
                d
            })
            .collect();
        Ok(Self { definitions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuditContext;
    use crate::controls::helpers::{one, Findings};
    use crate::controls::ControlMeta;
    use crate::models::Severite;

    fn passing(_: &AuditContext) -> Findings {
        one(ControlMeta::new("F-900", "Test", Niveau::Fondamental).ok("ok"))
    }

    fn def(reference: &'static str, niveau: Niveau) -> ControlDefinition {
        ControlDefinition::new(ControlMeta::new(reference, "Test", niveau), "test", Severite::Mineur, passing)
    }

    #[test]
    fn test_standard_catalogue_is_valid() {
        let registry = ControlRegistry::standard().unwrap();
        assert!(registry.len() > 80);
        for niveau in Niveau::ALL {
            assert!(!registry.for_level(niveau).is_empty(), "level {} has no control", niveau);
        }
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let err = ControlRegistry::new(vec![def("F-900", Niveau::Fondamental), def("F-900", Niveau::Fondamental)])
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateReference("F-900".to_string()));
    }

    #[test]
    fn test_prefix_must_match_level() {
        let err = ControlRegistry::new(vec![def("F-900", Niveau::Fiscal)]).unwrap_err();
        assert!(matches!(err, RegistryError::LevelMismatch { niveau: 7, .. }));
    }

    #[test]
    fn test_phase_must_own_level() {
        let mut d = def("EF-900", Niveau::EtatsFinanciers);
        d.phase = PhaseAudit::Phase1;
        let err = ControlRegistry::new(vec![d]).unwrap_err();
        assert!(matches!(err, RegistryError::PhaseMismatch { niveau: 6, .. }));
    }

    #[test]
    fn test_phase_queries_follow_level_order() {
        let registry = ControlRegistry::standard().unwrap();
        let levels: Vec<u8> = registry
            .for_phase(PhaseAudit::Phase1)
            .iter()
            .map(|d| d.niveau.value())
            .collect();
        assert!(levels.windows(2).all(|w| {
            let order = |v: u8| PhaseAudit::Phase1.levels().iter().position(|n| n.value() == v);
            order(w[0]) <= order(w[1])
        }));
        assert_eq!(registry.active_count(PhaseAudit::Phase2), registry.active_count(PhaseAudit::Phase1));
        assert!(registry.for_phase(PhaseAudit::Phase3).iter().all(|d| d.niveau.value() >= 6));
    }

    #[test]
    fn test_deactivate_keeps_other_rules() {
        let registry = ControlRegistry::standard().unwrap();
        let reduced = registry.deactivate("F-010").unwrap();
        assert_eq!(reduced.len(), registry.len());
        assert_eq!(reduced.active_count(PhaseAudit::Phase1), registry.active_count(PhaseAudit::Phase1) - 1);
        assert!(!reduced.get("F-010").unwrap().actif);
        assert!(reduced.get("F-001").unwrap().actif);
        assert_eq!(reduced.get("F-001").unwrap().niveau, Niveau::Fondamental);

        assert_eq!(
            registry.deactivate("X-999").unwrap_err(),
            RegistryError::UnknownReference("X-999".to_string())
        );
    }
}
