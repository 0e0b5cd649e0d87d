//! SYSCOHADA Revise chart of accounts (compact reference)
//!
//! Covers every two-digit account group of classes 1-9 plus the three-digit
//! accounts whose normal balance differs from their group or that controls
//! look up by name. Lookups resolve the most specific known prefix.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normal balance side of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensCompte {
    Debiteur,
    Crediteur,
}

/// One chart-of-accounts entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompteComptable {
    pub numero: String,
    pub libelle: String,
    pub classe: u8,
    pub sens: SensCompte,
}

/// Chart of accounts keyed by account number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanComptable {
    comptes: BTreeMap<String, CompteComptable>,
}

impl PlanComptable {
    pub fn new(comptes: Vec<CompteComptable>) -> Self {
        comptes.into_iter().collect()
    }

    /// Built-in SYSCOHADA Revise chart
    pub fn standard() -> &'static PlanComptable {
        &STANDARD_PLAN
    }

    pub fn is_empty(&self) -> bool {
        self.comptes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.comptes.len()
    }

    pub fn get(&self, numero: &str) -> Option<&CompteComptable> {
        self.comptes.get(numero)
    }

    /// Most specific chart entry for an account code
    ///
    /// Tries prefixes of length 4 down to 2.
    pub fn lookup(&self, code: &str) -> Option<&CompteComptable> {
        let code = code.trim();
        let max = code.len().min(4);
        (2..=max)
            .rev()
            .filter_map(|len| code.get(..len))
            .find_map(|prefix| self.comptes.get(prefix))
    }

    /// Closest chart entry sharing the longest prefix (down to the class)
    pub fn closest(&self, code: &str) -> Option<&CompteComptable> {
        let code = code.trim();
        (1..=code.len().min(4))
            .rev()
            .filter_map(|len| code.get(..len))
            .find_map(|prefix| {
                self.comptes
                    .range(prefix.to_string()..)
                    .next()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(_, v)| v)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompteComptable> {
        self.comptes.values()
    }
}

impl FromIterator<CompteComptable> for PlanComptable {
    fn from_iter<I: IntoIterator<Item = CompteComptable>>(iter: I) -> Self {
        Self {
            comptes: iter.into_iter().map(|c| (c.numero.clone(), c)).collect(),
        }
    }
}

use SensCompte::{Crediteur as C, Debiteur as D};

const PLAN_SYSCOHADA: &[(&str, &str, SensCompte)] = &[
    // Classe 1
    ("10", "Capital", C),
    ("101", "Capital social", C),
    ("104", "Compte de l'exploitant", C),
    ("105", "Primes liees au capital social", C),
    ("106", "Ecarts de reevaluation", C),
    ("109", "Apporteurs, capital souscrit non appele", D),
    ("11", "Reserves", C),
    ("12", "Report a nouveau", C),
    ("121", "Report a nouveau crediteur", C),
    ("129", "Report a nouveau debiteur", D),
    ("13", "Resultat net de l'exercice", C),
    ("131", "Resultat net : benefice", C),
    ("139", "Resultat net : perte", D),
    ("14", "Subventions d'investissement", C),
    ("15", "Provisions reglementees et fonds assimiles", C),
    ("16", "Emprunts et dettes assimilees", C),
    ("17", "Dettes de location-acquisition", C),
    ("18", "Dettes liees a des participations", C),
    ("19", "Provisions pour risques et charges", C),
    // Classe 2
    ("20", "Charges immobilisees", D),
    ("21", "Immobilisations incorporelles", D),
    ("22", "Terrains", D),
    ("23", "Batiments, installations techniques et agencements", D),
    ("24", "Materiel, mobilier et actifs biologiques", D),
    ("245", "Materiel de transport", D),
    ("25", "Avances et acomptes verses sur immobilisations", D),
    ("26", "Titres de participation", D),
    ("27", "Autres immobilisations financieres", D),
    ("28", "Amortissements", C),
    ("29", "Depreciations des immobilisations", C),
    // Classe 3
    ("31", "Marchandises", D),
    ("32", "Matieres premieres et fournitures liees", D),
    ("33", "Autres approvisionnements", D),
    ("34", "Produits en cours", D),
    ("35", "Services en cours", D),
    ("36", "Produits finis", D),
    ("37", "Produits intermediaires et residuels", D),
    ("38", "Stocks en cours de route", D),
    ("39", "Depreciations des stocks", C),
    // Classe 4
    ("40", "Fournisseurs et comptes rattaches", C),
    ("401", "Fournisseurs, dettes en compte", C),
    ("408", "Fournisseurs, factures non parvenues", C),
    ("409", "Fournisseurs debiteurs", D),
    ("41", "Clients et comptes rattaches", D),
    ("411", "Clients", D),
    ("419", "Clients crediteurs", C),
    ("42", "Personnel", C),
    ("421", "Personnel, avances et acomptes", D),
    ("43", "Organismes sociaux", C),
    ("44", "Etat et collectivites publiques", C),
    ("441", "Etat, impot sur les benefices", C),
    ("443", "Etat, TVA facturee", C),
    ("445", "Etat, TVA recuperable", D),
    ("449", "Etat, creances et dettes diverses", D),
    ("45", "Organismes internationaux", D),
    ("46", "Apporteurs, associes et groupe", C),
    ("47", "Debiteurs et crediteurs divers", D),
    ("471", "Debiteurs et crediteurs divers", D),
    ("476", "Charges constatees d'avance", D),
    ("477", "Produits constates d'avance", C),
    ("478", "Ecarts de conversion actif", D),
    ("479", "Ecarts de conversion passif", C),
    ("48", "Creances et dettes hors activites ordinaires", C),
    ("485", "Creances sur cessions d'immobilisations", D),
    ("49", "Depreciations et provisions pour risques a court terme", C),
    // Classe 5
    ("50", "Titres de placement", D),
    ("51", "Valeurs a encaisser", D),
    ("52", "Banques", D),
    ("53", "Etablissements financiers et assimiles", D),
    ("54", "Instruments de tresorerie", D),
    ("56", "Banques, credits de tresorerie et d'escompte", C),
    ("57", "Caisse", D),
    ("58", "Regies d'avances, accreditifs et virements internes", D),
    ("59", "Depreciations des titres de placement", C),
    // Classe 6
    ("60", "Achats et variations de stocks", D),
    ("61", "Transports", D),
    ("62", "Services exterieurs A", D),
    ("627", "Publicite, publications, relations publiques", D),
    ("63", "Services exterieurs B", D),
    ("64", "Impots et taxes", D),
    ("647", "Penalites, amendes fiscales", D),
    ("65", "Autres charges", D),
    ("66", "Charges de personnel", D),
    ("67", "Frais financiers et charges assimilees", D),
    ("68", "Dotations aux amortissements", D),
    ("69", "Dotations aux provisions", D),
    // Classe 7
    ("70", "Ventes", C),
    ("71", "Subventions d'exploitation", C),
    ("72", "Production immobilisee", C),
    ("73", "Variations des stocks de biens et services produits", C),
    ("75", "Autres produits", C),
    ("77", "Revenus financiers et assimiles", C),
    ("78", "Transferts de charges", C),
    ("79", "Reprises de provisions", C),
    // Classe 8
    ("81", "Valeurs comptables des cessions d'immobilisations", D),
    ("82", "Produits des cessions d'immobilisations", C),
    ("83", "Charges hors activites ordinaires", D),
    ("84", "Produits hors activites ordinaires", C),
    ("85", "Dotations hors activites ordinaires", D),
    ("86", "Reprises hors activites ordinaires", C),
    ("87", "Participation des travailleurs", D),
    ("88", "Subventions d'equilibre", C),
    ("89", "Impots sur le resultat", D),
    // Classe 9
    ("90", "Engagements obtenus et accordes", D),
    ("91", "Contreparties des engagements", C),
    ("92", "Comptes reflechis", D),
    ("93", "Comptes de reclassements", D),
    ("94", "Comptes de couts", D),
    ("95", "Comptes de stocks", D),
    ("96", "Ecarts sur couts preetablis", D),
    ("97", "Differences de traitement comptable", D),
    ("98", "Comptes de resultats analytiques", D),
    ("99", "Comptes de liaisons internes", D),
];

static STANDARD_PLAN: Lazy<PlanComptable> = Lazy::new(|| {
    PLAN_SYSCOHADA
        .iter()
        .map(|(numero, libelle, sens)| CompteComptable {
            numero: numero.to_string(),
            libelle: libelle.to_string(),
            classe: numero.as_bytes()[0] - b'0',
            sens: *sens,
        })
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_most_specific_prefix() {
        let plan = PlanComptable::standard();
        assert_eq!(plan.lookup("409100").unwrap().sens, SensCompte::Debiteur);
        assert_eq!(plan.lookup("401100").unwrap().numero, "401");
        assert_eq!(plan.lookup("402000").unwrap().numero, "40");
        assert!(plan.lookup("7").is_none());
        assert!(plan.lookup("000000").is_none());
    }

    #[test]
    fn test_every_group_has_a_class() {
        for compte in PlanComptable::standard().iter() {
            assert_eq!(compte.classe.to_string(), &compte.numero[..1]);
        }
    }

    #[test]
    fn test_closest_entry() {
        let plan = PlanComptable::standard();
        assert_eq!(plan.closest("7499").unwrap().numero, "70");
        assert_eq!(plan.closest("6275").unwrap().numero, "627");
        assert!(PlanComptable::default().closest("601").is_none());
    }
}
