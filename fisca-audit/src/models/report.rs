//! Comparison reports between two audit sessions
//!
//! Both reports are produced once by the diff reporter and never mutated.

use super::enums::{Severite, StatutControle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Evolution of one finding in a correction report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Evolution {
    /// Absent or OK after correction
    Corrige,
    /// Strictly less severe
    Ameliore,
    /// Same severity
    Inchange,
    /// More severe
    Degrade,
}

impl Evolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Evolution::Corrige => "CORRIGE",
            Evolution::Ameliore => "AMELIORE",
            Evolution::Inchange => "INCHANGE",
            Evolution::Degrade => "DEGRADE",
        }
    }
}

/// Evolution of one anomaly in a Part-2 report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionPartie2 {
    // Declaration order is the presentation order
    NonCorrige,
    Nouveau,
    Corrige,
}

impl EvolutionPartie2 {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionPartie2::NonCorrige => "non_corrige",
            EvolutionPartie2::Nouveau => "nouveau",
            EvolutionPartie2::Corrige => "corrige",
        }
    }
}

/// Account whose closing balance changed between two balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompteModifie {
    pub compte: String,
    pub libelle: String,
    pub solde_avant: f64,
    pub solde_apres: f64,
    /// `solde_apres - solde_avant`
    pub ecart: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionItem {
    #[serde(rename = "ref")]
    pub reference: String,
    pub nom: String,
    pub statut_avant: StatutControle,
    pub severite_avant: Severite,
    pub statut_apres: StatutControle,
    pub severite_apres: Severite,
    pub evolution: Evolution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheseCorrection {
    pub bloquants_avant: usize,
    pub bloquants_apres: usize,
    pub majeurs_avant: usize,
    pub majeurs_apres: usize,
    pub score_avant: u8,
    pub score_apres: u8,
}

/// Same-lineage correction report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RapportCorrection {
    pub id: Uuid,
    pub session_avant_id: Uuid,
    pub session_apres_id: Uuid,
    pub date_generation: DateTime<Utc>,
    pub corrections: Vec<CorrectionItem>,
    pub comptes_modifies: Vec<CompteModifie>,
    pub synthese: SyntheseCorrection,
}

impl RapportCorrection {
    pub fn count(&self, evolution: Evolution) -> usize {
        self.corrections.iter().filter(|c| c.evolution == evolution).count()
    }

    pub fn item(&self, reference: &str) -> Option<&CorrectionItem> {
        self.corrections.iter().find(|c| c.reference == reference)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partie2Item {
    #[serde(rename = "ref")]
    pub reference: String,
    pub nom: String,
    #[serde(rename = "severiteV1")]
    pub severite_v1: Severite,
    #[serde(rename = "severiteV2")]
    pub severite_v2: Severite,
    pub evolution: EvolutionPartie2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesePartie2 {
    pub corriges: usize,
    pub non_corriges: usize,
    pub nouveaux: usize,
    pub bloquants_restants: usize,
    pub conforme: bool,
}

/// Compliance-grade comparison report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RapportPartie2 {
    pub id: Uuid,
    pub session_avant_id: Uuid,
    pub session_apres_id: Uuid,
    pub date_generation: DateTime<Utc>,
    pub items: Vec<Partie2Item>,
    pub comptes_modifies: Vec<CompteModifie>,
    pub synthese: SynthesePartie2,
}

impl RapportPartie2 {
    pub fn item(&self, reference: &str) -> Option<&Partie2Item> {
        self.items.iter().find(|i| i.reference == reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partie2_presentation_order() {
        let mut v = vec![
            EvolutionPartie2::Corrige,
            EvolutionPartie2::NonCorrige,
            EvolutionPartie2::Nouveau,
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                EvolutionPartie2::NonCorrige,
                EvolutionPartie2::Nouveau,
                EvolutionPartie2::Corrige
            ]
        );
    }

    #[test]
    fn test_item_field_names() {
        let item = Partie2Item {
            reference: "C".to_string(),
            nom: "Test".to_string(),
            severite_v1: Severite::Ok,
            severite_v2: Severite::Majeur,
            evolution: EvolutionPartie2::Nouveau,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["ref"], "C");
        assert_eq!(json["severiteV1"], "OK");
        assert_eq!(json["severiteV2"], "MAJEUR");
        assert_eq!(json["evolution"], "nouveau");
    }
}
