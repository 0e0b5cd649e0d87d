//! Audit enumerations
//!
//! One authoritative type per concept. Serialized with the codes used in
//! exported reports (`BLOQUANT`, `NON_APPLICABLE`, `PHASE_1`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity
///
/// Ordered from least to most severe: `Ok < Info < Mineur < Majeur < Bloquant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severite {
    /// No issue
    Ok,
    /// Informational
    Info,
    /// Minor anomaly
    Mineur,
    /// Major anomaly
    Majeur,
    /// Prevents downstream compliance use of the balance
    Bloquant,
}

impl Severite {
    /// All severities, most severe first
    pub const ALL: [Severite; 5] = [
        Severite::Bloquant,
        Severite::Majeur,
        Severite::Mineur,
        Severite::Info,
        Severite::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severite::Ok => "OK",
            Severite::Info => "INFO",
            Severite::Mineur => "MINEUR",
            Severite::Majeur => "MAJEUR",
            Severite::Bloquant => "BLOQUANT",
        }
    }
}

impl fmt::Display for Severite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one control evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatutControle {
    /// Control passed
    Ok,
    /// Domain anomaly detected
    Anomalie,
    /// Control could not apply (missing optional input)
    NonApplicable,
    /// Control faulted internally
    ErreurExec,
}

impl StatutControle {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatutControle::Ok => "OK",
            StatutControle::Anomalie => "ANOMALIE",
            StatutControle::NonApplicable => "NON_APPLICABLE",
            StatutControle::ErreurExec => "ERREUR_EXEC",
        }
    }
}

impl fmt::Display for StatutControle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit phase
///
/// `Phase1` audits the imported balance, `Phase2` re-runs the same rules on a
/// corrected re-import, `Phase3` checks the financial statements and fiscal figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseAudit {
    #[serde(rename = "PHASE_1")]
    Phase1,
    #[serde(rename = "PHASE_2")]
    Phase2,
    #[serde(rename = "PHASE_3")]
    Phase3,
}

impl PhaseAudit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseAudit::Phase1 => "PHASE_1",
            PhaseAudit::Phase2 => "PHASE_2",
            PhaseAudit::Phase3 => "PHASE_3",
        }
    }

    /// Levels evaluated by this phase, in execution order
    pub fn levels(&self) -> &'static [Niveau] {
        const BALANCE: [Niveau; 7] = [
            Niveau::Structurel,
            Niveau::Fondamental,
            Niveau::Conformite,
            Niveau::SensMontants,
            Niveau::InterComptes,
            Niveau::Comparaison,
            Niveau::Archives,
        ];
        const ETATS: [Niveau; 2] = [Niveau::EtatsFinanciers, Niveau::Fiscal];

        match self {
            PhaseAudit::Phase1 | PhaseAudit::Phase2 => &BALANCE,
            PhaseAudit::Phase3 => &ETATS,
        }
    }

    /// Parse the CLI form (`1`, `2`, `3`) or the report code (`PHASE_1`, ...)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "1" | "PHASE_1" => Some(PhaseAudit::Phase1),
            "2" | "PHASE_2" => Some(PhaseAudit::Phase2),
            "3" | "PHASE_3" => Some(PhaseAudit::Phase3),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatutSession {
    /// Created, not started
    EnAttente,
    /// Runner is evaluating levels
    EnCours,
    /// All levels evaluated
    Terminee,
    /// Session-level fault
    Erreur,
    /// Cancelled between levels
    Annulee,
}

impl StatutSession {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatutSession::EnAttente => "EN_ATTENTE",
            StatutSession::EnCours => "EN_COURS",
            StatutSession::Terminee => "TERMINEE",
            StatutSession::Erreur => "ERREUR",
            StatutSession::Annulee => "ANNULEE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatutSession::Terminee | StatutSession::Erreur | StatutSession::Annulee
        )
    }
}

impl fmt::Display for StatutSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control level (0-8), which is also the execution order
///
/// Serialized as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Niveau {
    Structurel,
    Fondamental,
    Conformite,
    SensMontants,
    InterComptes,
    Comparaison,
    EtatsFinanciers,
    Fiscal,
    Archives,
}

impl Niveau {
    /// All levels in ascending order
    pub const ALL: [Niveau; 9] = [
        Niveau::Structurel,
        Niveau::Fondamental,
        Niveau::Conformite,
        Niveau::SensMontants,
        Niveau::InterComptes,
        Niveau::Comparaison,
        Niveau::EtatsFinanciers,
        Niveau::Fiscal,
        Niveau::Archives,
    ];

    pub fn value(&self) -> u8 {
        match self {
            Niveau::Structurel => 0,
            Niveau::Fondamental => 1,
            Niveau::Conformite => 2,
            Niveau::SensMontants => 3,
            Niveau::InterComptes => 4,
            Niveau::Comparaison => 5,
            Niveau::EtatsFinanciers => 6,
            Niveau::Fiscal => 7,
            Niveau::Archives => 8,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Niveau::ALL.get(value as usize).copied()
    }

    /// Display name of the level
    pub fn name(&self) -> &'static str {
        match self {
            Niveau::Structurel => "Controles structurels",
            Niveau::Fondamental => "Controles fondamentaux",
            Niveau::Conformite => "Conformite OHADA",
            Niveau::SensMontants => "Sens et montants",
            Niveau::InterComptes => "Inter-comptes",
            Niveau::Comparaison => "Comparaison N/N-1",
            Niveau::EtatsFinanciers => "Etats financiers",
            Niveau::Fiscal => "Controles fiscaux",
            Niveau::Archives => "Archives multi-exercices",
        }
    }

    /// Reference code prefixes allowed for controls of this level
    pub fn reference_prefixes(&self) -> &'static [&'static str] {
        match self {
            Niveau::Structurel => &["S-"],
            Niveau::Fondamental => &["F-"],
            Niveau::Conformite => &["C-"],
            Niveau::SensMontants => &["SS-", "MA-"],
            Niveau::InterComptes => &["IC-"],
            Niveau::Comparaison => &["NN-", "COMP-"],
            Niveau::EtatsFinanciers => &["EF-"],
            Niveau::Fiscal => &["FI-"],
            Niveau::Archives => &["AR-"],
        }
    }

    /// Phase that owns this level
    pub fn phase(&self) -> PhaseAudit {
        match self {
            Niveau::EtatsFinanciers | Niveau::Fiscal => PhaseAudit::Phase3,
            _ => PhaseAudit::Phase1,
        }
    }
}

impl TryFrom<u8> for Niveau {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Niveau::from_value(value).ok_or_else(|| format!("invalid control level: {} (expected 0-8)", value))
    }
}

impl From<Niveau> for u8 {
    fn from(niveau: Niveau) -> u8 {
        niveau.value()
    }
}

impl fmt::Display for Niveau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severite::Ok < Severite::Info);
        assert!(Severite::Info < Severite::Mineur);
        assert!(Severite::Mineur < Severite::Majeur);
        assert!(Severite::Majeur < Severite::Bloquant);
    }

    #[test]
    fn test_serialized_codes() {
        assert_eq!(serde_json::to_string(&Severite::Bloquant).unwrap(), "\"BLOQUANT\"");
        assert_eq!(
            serde_json::to_string(&StatutControle::NonApplicable).unwrap(),
            "\"NON_APPLICABLE\""
        );
        assert_eq!(serde_json::to_string(&PhaseAudit::Phase2).unwrap(), "\"PHASE_2\"");
        assert_eq!(
            serde_json::to_string(&StatutSession::EnAttente).unwrap(),
            "\"EN_ATTENTE\""
        );
        assert_eq!(serde_json::to_string(&Niveau::Fiscal).unwrap(), "7");
    }

    #[test]
    fn test_niveau_rejects_out_of_range() {
        assert!(serde_json::from_str::<Niveau>("9").is_err());
        assert_eq!(serde_json::from_str::<Niveau>("4").unwrap(), Niveau::InterComptes);
    }

    #[test]
    fn test_phase_levels() {
        let values: Vec<u8> = PhaseAudit::Phase1.levels().iter().map(|n| n.value()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 8]);
        assert_eq!(PhaseAudit::Phase2.levels(), PhaseAudit::Phase1.levels());
        let values: Vec<u8> = PhaseAudit::Phase3.levels().iter().map(|n| n.value()).collect();
        assert_eq!(values, vec![6, 7]);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!(PhaseAudit::parse("1"), Some(PhaseAudit::Phase1));
        assert_eq!(PhaseAudit::parse("phase_3"), Some(PhaseAudit::Phase3));
        assert_eq!(PhaseAudit::parse("4"), None);
    }
}
