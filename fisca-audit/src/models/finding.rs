//! Control findings
//!
//! A `ResultatControle` is the output of one control evaluation. Constructors
//! enforce the status/severity pairing: `OK` severity only with `OK` status,
//! anomalies strictly above `OK`, and `NON_APPLICABLE`/`ERREUR_EXEC` at `INFO`.

use super::enums::{Niveau, Severite, StatutControle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Debit or credit side of a journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sens {
    #[serde(rename = "D")]
    Debit,
    #[serde(rename = "C")]
    Credit,
}

/// One line of a proposed journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LigneEcriture {
    pub sens: Sens,
    pub compte: String,
    pub libelle: String,
    pub montant: f64,
}

/// Proposed corrective journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcritureCorrective {
    pub journal: String,
    pub date: String,
    pub lignes: Vec<LigneEcriture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentaire: Option<String>,
}

impl EcritureCorrective {
    pub fn new(journal: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            journal: journal.into(),
            date: date.into(),
            lignes: Vec::new(),
            commentaire: None,
        }
    }

    pub fn debit(mut self, compte: &str, libelle: &str, montant: f64) -> Self {
        self.lignes.push(LigneEcriture {
            sens: Sens::Debit,
            compte: compte.to_string(),
            libelle: libelle.to_string(),
            montant,
        });
        self
    }

    pub fn credit(mut self, compte: &str, libelle: &str, montant: f64) -> Self {
        self.lignes.push(LigneEcriture {
            sens: Sens::Credit,
            compte: compte.to_string(),
            libelle: libelle.to_string(),
            montant,
        });
        self
    }

    pub fn commentaire(mut self, commentaire: &str) -> Self {
        self.commentaire = Some(commentaire.to_string());
        self
    }

    /// Entry is balanced when debit and credit lines sum to the same amount
    pub fn is_balanced(&self) -> bool {
        let (d, c) = self.lignes.iter().fold((0.0, 0.0), |(d, c), l| match l.sens {
            Sens::Debit => (d + l.montant, c),
            Sens::Credit => (d, c + l.montant),
        });
        (d - c).abs() < 0.005
    }
}

/// Structured details attached to a finding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsControle {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comptes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub montants: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecart: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Expected value or condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendu: Option<String>,
    /// Observed value or condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_fiscal: Option<String>,
}

impl DetailsControle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comptes<I, S>(mut self, comptes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comptes = comptes.into_iter().map(Into::into).collect();
        self
    }

    pub fn montant(mut self, label: &str, value: f64) -> Self {
        self.montants.insert(label.to_string(), value);
        self
    }

    pub fn ecart(mut self, ecart: f64) -> Self {
        self.ecart = Some(ecart);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn attendu(mut self, attendu: impl Into<String>) -> Self {
        self.attendu = Some(attendu.into());
        self
    }

    pub fn constate(mut self, constate: impl Into<String>) -> Self {
        self.constate = Some(constate.into());
        self
    }

    pub fn impact_fiscal(mut self, impact: impl Into<String>) -> Self {
        self.impact_fiscal = Some(impact.into());
        self
    }
}

/// Result of one control evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultatControle {
    #[serde(rename = "ref")]
    pub reference: String,
    pub nom: String,
    pub niveau: Niveau,
    pub statut: StatutControle,
    pub severite: Severite,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsControle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ecritures_correctives: Vec<EcritureCorrective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_reglementaire: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResultatControle {
    fn build(
        reference: &str,
        nom: &str,
        niveau: Niveau,
        statut: StatutControle,
        severite: Severite,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.to_string(),
            nom: nom.to_string(),
            niveau,
            statut,
            severite,
            message: message.into(),
            details: None,
            suggestion: None,
            ecritures_correctives: Vec::new(),
            reference_reglementaire: None,
            timestamp: Utc::now(),
        }
    }

    /// Passing control
    pub fn ok(reference: &str, nom: &str, niveau: Niveau, message: impl Into<String>) -> Self {
        Self::build(reference, nom, niveau, StatutControle::Ok, Severite::Ok, message)
    }

    /// Detected anomaly (`Ok` severity is promoted to `Info`)
    pub fn anomalie(
        reference: &str,
        nom: &str,
        niveau: Niveau,
        severite: Severite,
        message: impl Into<String>,
    ) -> Self {
        let severite = severite.max(Severite::Info);
        Self::build(reference, nom, niveau, StatutControle::Anomalie, severite, message)
    }

    /// Control could not apply
    pub fn non_applicable(
        reference: &str,
        nom: &str,
        niveau: Niveau,
        message: impl Into<String>,
    ) -> Self {
        Self::build(
            reference,
            nom,
            niveau,
            StatutControle::NonApplicable,
            Severite::Info,
            message,
        )
    }

    /// Control faulted internally
    pub fn erreur_exec(
        reference: &str,
        nom: &str,
        niveau: Niveau,
        message: impl Into<String>,
    ) -> Self {
        Self::build(
            reference,
            nom,
            niveau,
            StatutControle::ErreurExec,
            Severite::Info,
            message,
        )
    }

    pub fn with_details(mut self, details: DetailsControle) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_ecriture(mut self, ecriture: EcritureCorrective) -> Self {
        self.ecritures_correctives.push(ecriture);
        self
    }

    pub fn with_reference_reglementaire(mut self, citation: impl Into<String>) -> Self {
        self.reference_reglementaire = Some(citation.into());
        self
    }

    /// Replace the timestamp (runner stamps every finding of a run identically)
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.statut == StatutControle::Ok
    }

    pub fn is_anomalie(&self) -> bool {
        self.statut == StatutControle::Anomalie
    }

    pub fn is_bloquant(&self) -> bool {
        self.is_anomalie() && self.severite == Severite::Bloquant
    }

    /// Accounts listed in the details, if any
    pub fn comptes(&self) -> &[String] {
        self.details.as_ref().map(|d| d.comptes.as_slice()).unwrap_or(&[])
    }
}

/// Count findings by severity
pub fn count_by_severite(findings: &[ResultatControle], severite: Severite) -> usize {
    findings.iter().filter(|f| f.severite == severite).count()
}
