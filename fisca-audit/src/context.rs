//! Read-only audit context
//!
//! Built once per run and shared by every control. Nothing mutates it while
//! the runner evaluates levels.

use crate::models::{ArchiveAudit, BalanceEntry};
use crate::reference::{MappingSyscohada, PlanComptable};
use chrono::{DateTime, Utc};
use fisca_common::AuditConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Liasse (statement package) type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeLiasse {
    /// Systeme normal
    #[default]
    Sn,
    /// Systeme minimal de tresorerie
    Smt,
    Conso,
    Banque,
    Assurance,
    Microfinance,
    /// Entites a but non lucratif
    Ebnl,
}

impl TypeLiasse {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeLiasse::Sn => "SN",
            TypeLiasse::Smt => "SMT",
            TypeLiasse::Conso => "CONSO",
            TypeLiasse::Banque => "BANQUE",
            TypeLiasse::Assurance => "ASSURANCE",
            TypeLiasse::Microfinance => "MICROFINANCE",
            TypeLiasse::Ebnl => "EBNL",
        }
    }

    /// Sector-specific liasse with its own statement layout
    pub fn is_sectoriel(&self) -> bool {
        matches!(
            self,
            TypeLiasse::Banque | TypeLiasse::Assurance | TypeLiasse::Microfinance | TypeLiasse::Ebnl
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SN" => Some(TypeLiasse::Sn),
            "SMT" => Some(TypeLiasse::Smt),
            "CONSO" => Some(TypeLiasse::Conso),
            "BANQUE" => Some(TypeLiasse::Banque),
            "ASSURANCE" => Some(TypeLiasse::Assurance),
            "MICROFINANCE" => Some(TypeLiasse::Microfinance),
            "EBNL" => Some(TypeLiasse::Ebnl),
            _ => None,
        }
    }
}

impl fmt::Display for TypeLiasse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs shared by every control of a run
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub balance_n: Vec<BalanceEntry>,
    pub balance_n1: Option<Vec<BalanceEntry>>,
    pub plan_comptable: PlanComptable,
    pub mapping: MappingSyscohada,
    /// Archived audits of prior exercises (any order)
    pub archives: Vec<ArchiveAudit>,
    pub exercice: String,
    pub type_liasse: TypeLiasse,
    pub config: AuditConfig,
    /// Timestamp stamped on every finding of the run
    pub evaluated_at: DateTime<Utc>,
}

impl AuditContext {
    pub fn builder(balance_n: Vec<BalanceEntry>) -> AuditContextBuilder {
        AuditContextBuilder::new(balance_n)
    }

    /// Prior-year balance, when present and non-empty
    pub fn n1(&self) -> Option<&[BalanceEntry]> {
        self.balance_n1.as_deref().filter(|b| !b.is_empty())
    }

    /// Exercise as a year, when numeric
    pub fn annee(&self) -> Option<i32> {
        self.exercice.trim().parse().ok()
    }

    /// Archives sorted by exercise (non-numeric exercises last)
    pub fn archives_triees(&self) -> Vec<&ArchiveAudit> {
        let mut archives: Vec<&ArchiveAudit> = self.archives.iter().collect();
        archives.sort_by_key(|a| (a.annee().is_none(), a.annee(), a.exercice.clone()));
        archives
    }
}

/// Builder for `AuditContext`
///
/// Chart of accounts and statement mapping default to the built-in SYSCOHADA tables.
#[derive(Debug, Clone)]
pub struct AuditContextBuilder {
    balance_n: Vec<BalanceEntry>,
    balance_n1: Option<Vec<BalanceEntry>>,
    plan_comptable: Option<PlanComptable>,
    mapping: Option<MappingSyscohada>,
    archives: Vec<ArchiveAudit>,
    exercice: String,
    type_liasse: TypeLiasse,
    config: AuditConfig,
    evaluated_at: Option<DateTime<Utc>>,
}

impl AuditContextBuilder {
    fn new(balance_n: Vec<BalanceEntry>) -> Self {
        Self {
            balance_n,
            balance_n1: None,
            plan_comptable: None,
            mapping: None,
            archives: Vec::new(),
            exercice: String::new(),
            type_liasse: TypeLiasse::default(),
            config: AuditConfig::default(),
            evaluated_at: None,
        }
    }

    pub fn balance_n1(mut self, balance: Vec<BalanceEntry>) -> Self {
        self.balance_n1 = Some(balance);
        self
    }

    pub fn plan_comptable(mut self, plan: PlanComptable) -> Self {
        self.plan_comptable = Some(plan);
        self
    }

    pub fn mapping(mut self, mapping: MappingSyscohada) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn archives(mut self, archives: Vec<ArchiveAudit>) -> Self {
        self.archives = archives;
        self
    }

    pub fn exercice(mut self, exercice: impl Into<String>) -> Self {
        self.exercice = exercice.into();
        self
    }

    pub fn type_liasse(mut self, type_liasse: TypeLiasse) -> Self {
        self.type_liasse = type_liasse;
        self
    }

    pub fn config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn evaluated_at(mut self, at: DateTime<Utc>) -> Self {
        self.evaluated_at = Some(at);
        self
    }

    pub fn build(self) -> AuditContext {
        AuditContext {
            balance_n: self.balance_n,
            balance_n1: self.balance_n1,
            plan_comptable: self
                .plan_comptable
                .unwrap_or_else(|| PlanComptable::standard().clone()),
            mapping: self
                .mapping
                .unwrap_or_else(|| MappingSyscohada::standard().clone()),
            archives: self.archives,
            exercice: self.exercice,
            type_liasse: self.type_liasse,
            config: self.config,
            evaluated_at: self.evaluated_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_reference_data() {
        let ctx = AuditContext::builder(Vec::new()).exercice("2024").build();
        assert!(!ctx.plan_comptable.is_empty());
        assert!(!ctx.mapping.is_empty());
        assert_eq!(ctx.annee(), Some(2024));
        assert_eq!(ctx.type_liasse, TypeLiasse::Sn);
        assert!(ctx.n1().is_none());
    }

    #[test]
    fn test_empty_n1_treated_as_absent() {
        let ctx = AuditContext::builder(Vec::new()).balance_n1(Vec::new()).build();
        assert!(ctx.n1().is_none());
    }

    #[test]
    fn test_type_liasse_parse() {
        assert_eq!(TypeLiasse::parse("banque"), Some(TypeLiasse::Banque));
        assert!(TypeLiasse::Ebnl.is_sectoriel());
        assert!(!TypeLiasse::Smt.is_sectoriel());
        assert_eq!(TypeLiasse::parse("XYZ"), None);
    }
}
