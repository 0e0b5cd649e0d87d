//! Diff reporter
//!
//! Compares two audit sessions of the same balance lineage and the two
//! balances they ran on. Both reports key findings by control reference;
//! when a reference produced several findings, the most severe one stands
//! for it.

use crate::models::{
    count_by_severite, BalanceEntry, CompteModifie, CorrectionItem, Evolution, EvolutionPartie2,
    Partie2Item, RapportCorrection, RapportPartie2, ResultatControle, SessionAudit, Severite,
    StatutControle, SyntheseCorrection, SynthesePartie2,
};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Findings keyed by reference, keeping the most severe per reference
///
/// Ties keep the first finding in evaluation order.
pub fn index_by_reference<'a, F>(findings: &'a [ResultatControle], keep: F) -> BTreeMap<&'a str, &'a ResultatControle>
where
    F: Fn(&ResultatControle) -> bool,
{
    let mut index: BTreeMap<&str, &ResultatControle> = BTreeMap::new();
    for finding in findings.iter().filter(|f| keep(f)) {
        index
            .entry(finding.reference.as_str())
            .and_modify(|current| {
                if finding.severite > current.severite {
                    *current = finding;
                }
            })
            .or_insert(finding);
    }
    index
}

/// Accounts whose closing balance moved by more than `tolerance`
///
/// An account present on one side only counts as zero on the other. Lines
/// sharing an account code are summed. Sorted by account code.
pub fn compute_account_deltas(
    avant: &[BalanceEntry],
    apres: &[BalanceEntry],
    tolerance: f64,
) -> Vec<CompteModifie> {
    let mut comptes: BTreeMap<&str, (String, f64, f64)> = BTreeMap::new();
    for line in avant {
        let entry = comptes
            .entry(line.code())
            .or_insert_with(|| (line.intitule.clone(), 0.0, 0.0));
        entry.1 += line.solde();
    }
    for line in apres {
        let entry = comptes
            .entry(line.code())
            .or_insert_with(|| (line.intitule.clone(), 0.0, 0.0));
        if entry.0.is_empty() {
            entry.0 = line.intitule.clone();
        }
        entry.2 += line.solde();
    }

    comptes
        .into_iter()
        .filter_map(|(compte, (libelle, solde_avant, solde_apres))| {
            let ecart = solde_apres - solde_avant;
            (ecart.abs() > tolerance).then(|| CompteModifie {
                compte: compte.to_string(),
                libelle,
                solde_avant,
                solde_apres,
                ecart,
            })
        })
        .collect()
}

/// Before/after evolution of every non-OK finding of the earlier session
pub fn generate_correction_report(
    avant: &SessionAudit,
    apres: &SessionAudit,
    balance_avant: &[BalanceEntry],
    balance_apres: &[BalanceEntry],
    tolerance: f64,
) -> RapportCorrection {
    let before = index_by_reference(&avant.resultats, |f| f.statut != StatutControle::Ok);
    let after = index_by_reference(&apres.resultats, |_| true);

    let corrections: Vec<CorrectionItem> = before
        .into_iter()
        .map(|(reference, previous)| {
            let current = after.get(reference).copied();
            let (statut_apres, severite_apres) = current
                .map(|f| (f.statut, f.severite))
                .unwrap_or((StatutControle::Ok, Severite::Ok));
            let evolution = if statut_apres == StatutControle::Ok {
                Evolution::Corrige
            } else {
                match severite_apres.cmp(&previous.severite) {
                    Ordering::Less => Evolution::Ameliore,
                    Ordering::Equal => Evolution::Inchange,
                    Ordering::Greater => Evolution::Degrade,
                }
            };
            CorrectionItem {
                reference: reference.to_string(),
                nom: previous.nom.clone(),
                statut_avant: previous.statut,
                severite_avant: previous.severite,
                statut_apres,
                severite_apres,
                evolution,
            }
        })
        .collect();

    let synthese = SyntheseCorrection {
        bloquants_avant: count_by_severite(&avant.resultats, Severite::Bloquant),
        bloquants_apres: count_by_severite(&apres.resultats, Severite::Bloquant),
        majeurs_avant: count_by_severite(&avant.resultats, Severite::Majeur),
        majeurs_apres: count_by_severite(&apres.resultats, Severite::Majeur),
        score_avant: avant.resume.score_global,
        score_apres: apres.resume.score_global,
    };

    debug!(
        avant = %avant.id,
        apres = %apres.id,
        corrections = corrections.len(),
        "Correction report generated"
    );

    RapportCorrection {
        id: Uuid::new_v4(),
        session_avant_id: avant.id,
        session_apres_id: apres.id,
        date_generation: Utc::now(),
        corrections,
        comptes_modifies: compute_account_deltas(balance_avant, balance_apres, tolerance),
        synthese,
    }
}

/// Compliance report over anomalies only
///
/// Items come grouped `non_corrige`, `nouveau`, `corrige`, each group
/// ordered by reference. The balance is `conforme` when no anomaly left
/// after correction, persisting or new, is BLOQUANT.
pub fn generate_partie2_report(
    avant: &SessionAudit,
    apres: &SessionAudit,
    balance_avant: &[BalanceEntry],
    balance_apres: &[BalanceEntry],
    tolerance: f64,
) -> RapportPartie2 {
    let before = index_by_reference(&avant.resultats, ResultatControle::is_anomalie);
    let after = index_by_reference(&apres.resultats, ResultatControle::is_anomalie);

    let mut items: Vec<Partie2Item> = before
        .iter()
        .map(|(reference, previous)| match after.get(reference) {
            Some(current) => Partie2Item {
                reference: reference.to_string(),
                nom: previous.nom.clone(),
                severite_v1: previous.severite,
                severite_v2: current.severite,
                evolution: EvolutionPartie2::NonCorrige,
            },
            None => Partie2Item {
                reference: reference.to_string(),
                nom: previous.nom.clone(),
                severite_v1: previous.severite,
                severite_v2: Severite::Ok,
                evolution: EvolutionPartie2::Corrige,
            },
        })
        .chain(
            after
                .iter()
                .filter(|(reference, _)| !before.contains_key(*reference))
                .map(|(reference, current)| Partie2Item {
                    reference: reference.to_string(),
                    nom: current.nom.clone(),
                    severite_v1: Severite::Ok,
                    severite_v2: current.severite,
                    evolution: EvolutionPartie2::Nouveau,
                }),
        )
        .collect();
    // Stable: references stay sorted inside each group
    items.sort_by_key(|item| item.evolution);

    let count = |evolution: EvolutionPartie2| items.iter().filter(|i| i.evolution == evolution).count();
    let bloquants_restants = items
        .iter()
        .filter(|i| i.evolution != EvolutionPartie2::Corrige && i.severite_v2 == Severite::Bloquant)
        .count();
    let synthese = SynthesePartie2 {
        corriges: count(EvolutionPartie2::Corrige),
        non_corriges: count(EvolutionPartie2::NonCorrige),
        nouveaux: count(EvolutionPartie2::Nouveau),
        bloquants_restants,
        conforme: bloquants_restants == 0,
    };

    debug!(
        avant = %avant.id,
        apres = %apres.id,
        items = items.len(),
        conforme = synthese.conforme,
        "Part-2 report generated"
    );

    RapportPartie2 {
        id: Uuid::new_v4(),
        session_avant_id: avant.id,
        session_apres_id: apres.id,
        date_generation: Utc::now(),
        items,
        comptes_modifies: compute_account_deltas(balance_avant, balance_apres, tolerance),
        synthese,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Niveau, PhaseAudit};

    fn finding(reference: &str, severite: Severite) -> ResultatControle {
        if severite == Severite::Ok {
            ResultatControle::ok(reference, "Test", Niveau::Fondamental, "ok")
        } else {
            ResultatControle::anomalie(reference, "Test", Niveau::Fondamental, severite, "ko")
        }
    }

    fn session(findings: Vec<ResultatControle>) -> SessionAudit {
        let mut s = SessionAudit::new("bal", "2024", PhaseAudit::Phase1);
        s.resultats = findings;
        s.refresh_resume(49);
        s
    }

    #[test]
    fn test_most_severe_finding_represents_reference() {
        let findings = vec![
            finding("F-001", Severite::Mineur),
            finding("F-001", Severite::Bloquant),
            finding("F-001", Severite::Majeur),
        ];
        let index = index_by_reference(&findings, |_| true);
        assert_eq!(index.len(), 1);
        assert_eq!(index["F-001"].severite, Severite::Bloquant);
    }

    #[test]
    fn test_correction_evolutions() {
        let avant = session(vec![
            finding("A", Severite::Majeur),
            finding("B", Severite::Majeur),
            finding("C", Severite::Mineur),
            finding("D", Severite::Mineur),
            finding("E", Severite::Ok),
        ]);
        let apres = session(vec![
            finding("A", Severite::Ok),
            finding("B", Severite::Mineur),
            finding("C", Severite::Mineur),
            finding("D", Severite::Bloquant),
        ]);
        let rapport = generate_correction_report(&avant, &apres, &[], &[], 0.01);
        assert_eq!(rapport.corrections.len(), 4);
        assert_eq!(rapport.item("A").unwrap().evolution, Evolution::Corrige);
        assert_eq!(rapport.item("B").unwrap().evolution, Evolution::Ameliore);
        assert_eq!(rapport.item("C").unwrap().evolution, Evolution::Inchange);
        assert_eq!(rapport.item("D").unwrap().evolution, Evolution::Degrade);
        assert!(rapport.item("E").is_none());
        assert_eq!(rapport.synthese.majeurs_avant, 2);
        assert_eq!(rapport.synthese.bloquants_apres, 1);
    }

    #[test]
    fn test_reference_absent_after_is_corrected() {
        let avant = session(vec![finding("A", Severite::Bloquant)]);
        let apres = session(vec![]);
        let rapport = generate_correction_report(&avant, &apres, &[], &[], 0.01);
        let item = rapport.item("A").unwrap();
        assert_eq!(item.evolution, Evolution::Corrige);
        assert_eq!(item.severite_apres, Severite::Ok);
    }

    #[test]
    fn test_partie2_grouping_and_conformity() {
        let avant = session(vec![
            finding("C", Severite::Bloquant),
            finding("B", Severite::Majeur),
            finding("A", Severite::Mineur),
        ]);
        let apres = session(vec![
            finding("B", Severite::Bloquant),
            finding("D", Severite::Info),
            finding("C", Severite::Ok),
        ]);
        let rapport = generate_partie2_report(&avant, &apres, &[], &[], 0.01);
        let order: Vec<(&str, EvolutionPartie2)> =
            rapport.items.iter().map(|i| (i.reference.as_str(), i.evolution)).collect();
        assert_eq!(
            order,
            vec![
                ("B", EvolutionPartie2::NonCorrige),
                ("D", EvolutionPartie2::Nouveau),
                ("A", EvolutionPartie2::Corrige),
                ("C", EvolutionPartie2::Corrige),
            ]
        );
        assert_eq!(rapport.item("D").unwrap().severite_v1, Severite::Ok);
        assert_eq!(rapport.item("C").unwrap().severite_v2, Severite::Ok);
        assert_eq!(rapport.synthese.bloquants_restants, 1);
        assert!(!rapport.synthese.conforme);
    }

    #[test]
    fn test_account_deltas_union() {
        let avant = vec![
            BalanceEntry::new("601000", "Achats", 8_000_000.0, 0.0, 8_000_000.0, 0.0),
            BalanceEntry::new("471000", "Attente", 300.0, 0.0, 300.0, 0.0),
            BalanceEntry::new("521000", "Banque", 100.0, 0.0, 100.0, 0.0),
        ];
        let apres = vec![
            BalanceEntry::new("601000", "Achats", 8_500_000.0, 0.0, 8_500_000.0, 0.0),
            BalanceEntry::new("521000", "Banque", 100.005, 0.0, 100.005, 0.0),
            BalanceEntry::new("401000", "Fournisseurs", 0.0, 50.0, 0.0, 50.0),
        ];
        let deltas = compute_account_deltas(&avant, &apres, 0.01);
        let comptes: Vec<&str> = deltas.iter().map(|d| d.compte.as_str()).collect();
        assert_eq!(comptes, vec!["401000", "471000", "601000"]);
        assert_eq!(deltas[0].solde_avant, 0.0);
        assert_eq!(deltas[0].ecart, -50.0);
        assert_eq!(deltas[1].solde_apres, 0.0);
        assert_eq!(deltas[2].ecart, 500_000.0);
    }
}
