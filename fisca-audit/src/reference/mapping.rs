//! Financial statement line mapping (SYSCOHADA liasse)
//!
//! Each statement line ("poste") lists the account prefixes feeding it, plus
//! the depreciation prefixes deducted from it on the asset side.
//!
//! Totals assign every balance line to at most one line per section. Prefixes
//! found on both sides of the balance sheet (tiers, treasury) are classified by
//! the sign of the closing balance: debit to assets, credit to liabilities.

use crate::models::BalanceEntry;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// One statement line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poste {
    pub code: String,
    pub libelle: String,
    pub comptes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amort_comptes: Vec<String>,
}

impl Poste {
    fn matches(&self, code: &str) -> bool {
        self.comptes.iter().any(|p| code.starts_with(p.as_str()))
    }

    fn matches_amort(&self, code: &str) -> bool {
        self.amort_comptes.iter().any(|p| code.starts_with(p.as_str()))
    }
}

/// Statement mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSyscohada {
    pub actif: Vec<Poste>,
    pub passif: Vec<Poste>,
    pub charges: Vec<Poste>,
    pub produits: Vec<Poste>,
}

/// Balance sheet totals computed through the mapping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TotauxBilan {
    /// Net assets (gross minus depreciation)
    pub actif: f64,
    /// Liabilities and equity
    pub passif: f64,
    /// Income statement result added to liabilities because no 13x line exists
    pub resultat_integre: Option<f64>,
}

impl TotauxBilan {
    /// Signed gap `actif - passif`
    pub fn ecart(&self) -> f64 {
        self.actif - self.passif
    }
}

impl MappingSyscohada {
    /// Built-in SYSCOHADA Revise mapping
    pub fn standard() -> &'static MappingSyscohada {
        &STANDARD_MAPPING
    }

    pub fn is_empty(&self) -> bool {
        self.actif.is_empty() && self.passif.is_empty()
    }

    /// True when a balance sheet line maps the account (gross or depreciation)
    pub fn covers_bilan(&self, code: &str) -> bool {
        let code = code.trim();
        self.actif.iter().any(|p| p.matches(code) || p.matches_amort(code))
            || self.passif.iter().any(|p| p.matches(code))
    }

    /// True when an income statement line maps the account
    pub fn covers_resultat(&self, code: &str) -> bool {
        let code = code.trim();
        self.charges.iter().chain(self.produits.iter()).any(|p| p.matches(code))
    }

    /// Income statement result (products minus charges) over mapped accounts
    ///
    /// Each account counts once even if several lines list its prefix.
    pub fn resultat_compte_resultat(&self, balance: &[BalanceEntry]) -> f64 {
        balance
            .iter()
            .filter(|e| self.covers_resultat(e.code()))
            .map(|e| -e.solde())
            .sum()
    }

    /// Balance sheet totals
    ///
    /// When the balance carries no 13x result account, the mapped income
    /// statement result is added to the liabilities so that a pre-closing
    /// balance can still be checked.
    pub fn totaux_bilan(&self, balance: &[BalanceEntry]) -> TotauxBilan {
        let mut actif = 0.0;
        let mut passif = 0.0;
        let mut has_resultat = false;

        for entry in balance {
            let code = entry.code();
            if code.starts_with("13") {
                has_resultat = true;
            }
            let solde = entry.solde();
            let in_actif = self.actif.iter().any(|p| p.matches(code));
            let in_amort = self.actif.iter().any(|p| p.matches_amort(code));
            let in_passif = self.passif.iter().any(|p| p.matches(code));

            match (in_actif || in_amort, in_passif) {
                (true, true) => {
                    if solde >= 0.0 {
                        actif += solde;
                    } else {
                        passif -= solde;
                    }
                }
                (true, false) => actif += solde,
                (false, true) => passif -= solde,
                (false, false) => {}
            }
        }

        let resultat_integre = if has_resultat {
            None
        } else {
            let resultat = self.resultat_compte_resultat(balance);
            passif += resultat;
            Some(resultat)
        };

        TotauxBilan {
            actif,
            passif,
            resultat_integre,
        }
    }
}

type PosteDef = (&'static str, &'static str, &'static [&'static str], &'static [&'static str]);

const ACTIF: &[PosteDef] = &[
    ("AQ", "Frais d'etablissement", &["201"], &["2801", "2901"]),
    ("AR", "Charges a repartir", &["202"], &["2802", "2902"]),
    ("AS", "Primes de remboursement", &["206"], &["2806", "2906"]),
    ("AD", "Frais de recherche et developpement", &["211", "212"], &["2811", "2812", "2911", "2912"]),
    ("AE", "Brevets, licences, logiciels", &["213", "214", "215"], &["2813", "2814", "2815", "2913", "2914", "2915"]),
    ("AF", "Fonds commercial et droit au bail", &["216", "217"], &["2816", "2817", "2916", "2917"]),
    ("AG", "Autres immobilisations incorporelles", &["218", "219"], &["2818", "2819", "2918", "2919"]),
    ("AJ", "Terrains", &["22"], &["282", "292"]),
    ("AK", "Batiments", &["231", "232", "233", "234"], &["2831", "2832", "2833", "2834", "2931", "2932", "2933", "2934"]),
    ("AL", "Installations et agencements", &["235", "237", "238"], &["2835", "2837", "2838", "2935", "2937", "2938"]),
    ("AM", "Materiel", &["241", "242", "243", "244"], &["2841", "2842", "2843", "2844", "2941", "2942", "2943", "2944"]),
    ("AN", "Materiel de transport", &["245"], &["2845", "2945"]),
    ("AP", "Avances et acomptes sur immobilisations", &["251", "252"], &[]),
    ("AT", "Titres de participation", &["26"], &["296"]),
    ("AU", "Autres immobilisations financieres", &["27"], &["297"]),
    ("BA", "Actif circulant HAO", &["485", "488"], &["498"]),
    ("BC", "Marchandises", &["31"], &["391"]),
    ("BD", "Matieres premieres", &["32"], &["392"]),
    ("BE", "Autres approvisionnements", &["33"], &["393"]),
    ("BF", "En-cours", &["34", "35"], &["394", "395"]),
    ("BG", "Produits fabriques", &["36", "37", "38"], &["396", "397", "398"]),
    ("BI", "Fournisseurs, avances versees", &["409"], &["490"]),
    ("BJ", "Clients", &["411", "412", "413", "414", "415", "416", "418"], &["491"]),
    ("BK", "Autres creances", &["42", "43", "44", "45", "46", "47"], &["492", "493", "494", "495", "496", "497"]),
    ("BQ", "Titres de placement", &["50"], &["590"]),
    ("BR", "Valeurs a encaisser", &["51"], &["591"]),
    ("BS", "Banques, cheques postaux, caisse", &["52", "53", "54", "57", "58"], &["592", "593", "594"]),
    ("BU", "Ecart de conversion actif", &["478"], &[]),
];

const PASSIF: &[PosteDef] = &[
    ("CA", "Capital", &["101", "102", "103", "104", "105"], &[]),
    ("CB", "Apporteurs capital non appele", &["109"], &[]),
    ("CD", "Ecarts de reevaluation", &["106"], &[]),
    ("CE", "Reserves", &["11"], &[]),
    ("CG", "Report a nouveau", &["12"], &[]),
    ("CH", "Resultat net de l'exercice", &["13"], &[]),
    ("CL", "Subventions d'investissement", &["14"], &[]),
    ("CM", "Provisions reglementees", &["15"], &[]),
    ("DA", "Emprunts et dettes financieres", &["16", "18"], &[]),
    ("DB", "Dettes de location-acquisition", &["17"], &[]),
    ("DC", "Provisions pour risques et charges", &["19"], &[]),
    ("DH", "Dettes circulantes HAO", &["481", "482", "484"], &[]),
    ("DI", "Clients, avances recues", &["419"], &[]),
    ("DJ", "Fournisseurs d'exploitation", &["401", "402", "403", "404", "405", "408"], &[]),
    ("DK", "Dettes fiscales et sociales", &["42", "43", "44"], &[]),
    ("DM", "Autres dettes", &["45", "46", "47"], &[]),
    ("DN", "Provisions pour risques a court terme", &["499"], &[]),
    ("DQ", "Banques, credits de tresorerie", &["52", "56"], &[]),
    ("DV", "Ecart de conversion passif", &["479"], &[]),
];

const CHARGES: &[PosteDef] = &[
    ("RA", "Achats de marchandises", &["601"], &[]),
    ("RB", "Variation de stocks de marchandises", &["6031"], &[]),
    ("RC", "Achats de matieres premieres", &["602"], &[]),
    ("RD", "Variation de stocks de matieres", &["6032"], &[]),
    ("RE", "Autres achats", &["604", "605", "608"], &[]),
    ("RF", "Variation de stocks d'autres approvisionnements", &["6033"], &[]),
    ("RG", "Transports", &["61"], &[]),
    ("RH", "Services exterieurs", &["62", "63"], &[]),
    ("RI", "Impots et taxes", &["64"], &[]),
    ("RJ", "Autres charges", &["65"], &[]),
    ("RK", "Charges de personnel", &["66"], &[]),
    ("RL", "Dotations aux amortissements et provisions", &["68", "69"], &[]),
    ("RN", "Frais financiers", &["67"], &[]),
    ("RQ", "Charges HAO", &["81", "83", "85"], &[]),
    ("RR", "Participation des travailleurs", &["87"], &[]),
    ("RS", "Impots sur le resultat", &["89"], &[]),
];

const PRODUITS: &[PosteDef] = &[
    ("TA", "Ventes de marchandises", &["701"], &[]),
    ("TB", "Ventes de produits fabriques", &["702", "703", "704"], &[]),
    ("TC", "Travaux, services vendus", &["705", "706"], &[]),
    ("TD", "Production stockee", &["73"], &[]),
    ("TE", "Production immobilisee", &["72"], &[]),
    ("TF", "Produits accessoires", &["707"], &[]),
    ("TG", "Subventions d'exploitation", &["71"], &[]),
    ("TH", "Autres produits", &["75"], &[]),
    ("TI", "Transferts de charges", &["78"], &[]),
    ("TJ", "Reprises de provisions", &["79"], &[]),
    ("TK", "Revenus financiers", &["77"], &[]),
    ("TN", "Produits HAO", &["82", "84", "86", "88"], &[]),
];

fn build(defs: &[PosteDef]) -> Vec<Poste> {
    defs.iter()
        .map(|(code, libelle, comptes, amort)| Poste {
            code: code.to_string(),
            libelle: libelle.to_string(),
            comptes: comptes.iter().map(|c| c.to_string()).collect(),
            amort_comptes: amort.iter().map(|c| c.to_string()).collect(),
        })
        .collect()
}

static STANDARD_MAPPING: Lazy<MappingSyscohada> = Lazy::new(|| MappingSyscohada {
    actif: build(ACTIF),
    passif: build(PASSIF),
    charges: build(CHARGES),
    produits: build(PRODUITS),
});

#[cfg(test)]
mod tests {
    use super::*;

    fn line(compte: &str, sd: f64, sc: f64) -> BalanceEntry {
        BalanceEntry::new(compte, "", sd, sc, sd, sc)
    }

    #[test]
    fn test_balanced_closed_balance() {
        let balance = vec![
            line("101000", 0.0, 1000.0),
            line("131000", 0.0, 200.0),
            line("241000", 800.0, 0.0),
            line("284100", 0.0, 100.0),
            line("521000", 500.0, 0.0),
        ];
        let totaux = MappingSyscohada::standard().totaux_bilan(&balance);
        assert_eq!(totaux.actif, 1200.0);
        assert_eq!(totaux.passif, 1200.0);
        assert_eq!(totaux.resultat_integre, None);
    }

    #[test]
    fn test_pre_closing_balance_integrates_result() {
        let balance = vec![
            line("101000", 0.0, 1000.0),
            line("521000", 1300.0, 0.0),
            line("601000", 200.0, 0.0),
            line("701000", 0.0, 500.0),
        ];
        let totaux = MappingSyscohada::standard().totaux_bilan(&balance);
        assert_eq!(totaux.resultat_integre, Some(300.0));
        assert_eq!(totaux.ecart(), 0.0);
    }

    #[test]
    fn test_two_sided_prefix_classified_by_sign() {
        let balance = vec![line("521000", 0.0, 400.0), line("411000", 400.0, 0.0)];
        let totaux = MappingSyscohada::standard().totaux_bilan(&balance);
        assert_eq!(totaux.actif, 400.0);
        // Bank overdraft lands on the liabilities side
        assert_eq!(totaux.passif, 400.0);
    }

    #[test]
    fn test_coverage() {
        let mapping = MappingSyscohada::standard();
        assert!(mapping.covers_bilan("284100"));
        assert!(mapping.covers_bilan("401000"));
        assert!(!mapping.covers_bilan("601000"));
        assert!(mapping.covers_resultat("601000"));
        assert!(MappingSyscohada::default().is_empty());
    }
}
