//! Level 5: year-over-year comparison N / N-1
//!
//! Every control reports `NON_APPLICABLE` when no prior-year balance is
//! supplied.

use super::helpers::{fmt_montant, fmt_pct, one, Findings};
use super::level3::total_actif_brut;
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, BalanceExt, DetailsControle, Niveau, Severite};
use std::collections::{BTreeSet, HashMap, HashSet};

const N: Niveau = Niveau::Comparaison;

const NN001: ControlMeta = ControlMeta::new("NN-001", "RAN = Resultat N-1", N);
const NN003: ControlMeta = ControlMeta::new("NN-003", "Permanence des methodes", N);
const NN004: ControlMeta = ControlMeta::new("NN-004", "Capital inchange", N);
const NN005: ControlMeta = ControlMeta::new("NN-005", "Variations anormales", N);
const NN006: ControlMeta = ControlMeta::new("NN-006", "Variation total bilan", N);
const NN007: ControlMeta = ControlMeta::new("NN-007", "Comptes gestion disparus", N);
const NN008: ControlMeta = ControlMeta::new("NN-008", "Coherence immobilisations N/N-1", N);
const COMP001: ControlMeta = ControlMeta::new("COMP-001", "RAN: Cloture N-1 = Ouverture N", N);
const COMP002: ControlMeta = ControlMeta::new("COMP-002", "Comptes N-1 absents en N", N);
const COMP003: ControlMeta = ControlMeta::new("COMP-003", "Affectation resultat N-1", N);
const COMP007: ControlMeta = ControlMeta::new("COMP-007", "Nouveaux comptes en N", N);

const POSTES_VARIATION: &[&str] = &["2", "3", "40", "41", "5", "6", "7"];
/// Prior-year amount below which a variation is not meaningful
const SEUIL_POSTE_SIGNIFICATIF: f64 = 1000.0;
/// Balance-sheet account balance considered significant for continuity
const SEUIL_COMPTE_SIGNIFICATIF: f64 = 100.0;
const SEUIL_ECART_OUVERTURE: f64 = 100.0;

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(NN001, "Verifie le report a nouveau", Severite::Majeur, nn001),
        ControlDefinition::new(NN003, "Verifie la stabilite de la structure", Severite::Mineur, nn003),
        ControlDefinition::new(NN004, "Signale les variations de capital", Severite::Info, nn004),
        ControlDefinition::new(NN005, "Detecte les variations anormales par poste", Severite::Mineur, nn005),
        ControlDefinition::new(NN006, "Detecte une variation forte du total bilan", Severite::Info, nn006),
        ControlDefinition::new(NN007, "Detecte les comptes de gestion absents en N", Severite::Mineur, nn007),
        ControlDefinition::new(NN008, "Verifie les mouvements d'immobilisations", Severite::Mineur, nn008),
        ControlDefinition::new(COMP001, "Verifie la continuite des soldes de bilan", Severite::Bloquant, comp001),
        ControlDefinition::new(COMP002, "Detecte les comptes de bilan N-1 absents en N", Severite::Majeur, comp002),
        ControlDefinition::new(COMP003, "Verifie que le resultat N-1 est affecte", Severite::Majeur, comp003),
        ControlDefinition::new(COMP007, "Signale les nouveaux comptes de bilan en N", Severite::Info, comp007),
    ]
}

fn is_bilan(entry: &BalanceEntry) -> bool {
    matches!(entry.classe(), Some(1..=5))
}

fn abs_sum<'a>(lines: impl Iterator<Item = &'a BalanceEntry>) -> f64 {
    lines.map(|e| e.solde().abs()).sum()
}

fn signe(pct: f64) -> &'static str {
    if pct > 0.0 {
        "+"
    } else {
        ""
    }
}

fn nn001(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN001.non_applicable("Balance N-1 absente"));
    };
    let ran = ctx.balance_n.solde_crediteur(&["12"]);
    let resultat_n1 = n1.solde_crediteur(&["13"]);
    let ecart = ran - resultat_n1;

    if ecart.abs() > ctx.config.rounding_tolerance {
        return one(
            NN001
                .anomalie(
                    Severite::Majeur,
                    format!(
                        "RAN ({}) != Resultat N-1 ({})",
                        fmt_montant(ran),
                        fmt_montant(resultat_n1)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .ecart(ecart)
                        .montant("ran", ran)
                        .montant("resultatN1", resultat_n1),
                )
                .with_suggestion("Le report a nouveau doit etre egal au resultat de l'exercice precedent"),
        );
    }
    one(NN001.ok("Report a nouveau correct"))
}

fn nn003(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN003.non_applicable("Balance N-1 absente"));
    };
    let prefixes = |b: &[BalanceEntry]| -> BTreeSet<String> {
        b.iter()
            .map(|e| e.code().chars().take(3).collect::<String>())
            .collect()
    };
    let prefixes_n = prefixes(&ctx.balance_n);
    let prefixes_n1 = prefixes(n1);
    let nouveaux: Vec<&String> = prefixes_n.difference(&prefixes_n1).collect();
    let supprimes: Vec<&String> = prefixes_n1.difference(&prefixes_n).collect();

    if nouveaux.len() > 10 || supprimes.len() > 10 {
        let comptes = nouveaux
            .iter()
            .take(5)
            .map(|p| format!("+{}", p))
            .chain(supprimes.iter().take(5).map(|p| format!("-{}", p)));
        return one(
            NN003
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "Changements importants de structure: {} nouveaux prefixes, {} supprimes",
                        nouveaux.len(),
                        supprimes.len()
                    ),
                )
                .with_details(DetailsControle::new().comptes(comptes))
                .with_suggestion("Verifier le respect du principe de permanence des methodes"),
        );
    }
    one(NN003.ok("Structure comptable stable entre N et N-1"))
}

fn nn004(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN004.non_applicable("Balance N-1 absente"));
    };
    let capital_n = ctx.balance_n.solde_crediteur(&["101"]);
    let capital_n1 = n1.solde_crediteur(&["101"]);

    if (capital_n - capital_n1).abs() > ctx.config.rounding_tolerance {
        return one(
            NN004
                .anomalie(
                    Severite::Info,
                    format!(
                        "Capital modifie: {} -> {}",
                        fmt_montant(capital_n1),
                        fmt_montant(capital_n)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("capitalN", capital_n)
                        .montant("capitalN1", capital_n1),
                )
                .with_suggestion("Verifier qu'une operation sur le capital justifie cette variation"),
        );
    }
    one(NN004.ok(format!("Capital stable: {}", fmt_montant(capital_n))))
}

fn nn005(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN005.non_applicable("Balance N-1 absente"));
    };
    let seuil = ctx.config.variation_threshold_pct;
    let variations: Vec<String> = POSTES_VARIATION
        .iter()
        .filter_map(|p| {
            let montant_n = abs_sum(ctx.balance_n.lines_with_prefix(p));
            let montant_n1 = abs_sum(n1.lines_with_prefix(p));
            if montant_n1 <= SEUIL_POSTE_SIGNIFICATIF {
                return None;
            }
            let pct = (montant_n - montant_n1) * 100.0 / montant_n1;
            (pct.abs() > seuil).then(|| {
                format!(
                    "{}x: {}{:.0}% ({} -> {})",
                    p,
                    signe(pct),
                    pct,
                    fmt_montant(montant_n1),
                    fmt_montant(montant_n)
                )
            })
        })
        .collect();

    if variations.is_empty() {
        return one(NN005.ok("Pas de variation anormale detectee"));
    }
    one(
        NN005
            .anomalie(
                Severite::Mineur,
                format!(
                    "{} poste(s) avec variation > {}",
                    variations.len(),
                    fmt_pct(seuil)
                ),
            )
            .with_details(DetailsControle::new().comptes(variations))
            .with_suggestion("Justifier les variations significatives entre exercices"),
    )
}

fn nn006(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN006.non_applicable("Balance N-1 absente"));
    };
    let total_n = total_actif_brut(&ctx.balance_n);
    let total_n1 = total_actif_brut(n1);

    if total_n1 > 0.0 {
        let pct = (total_n - total_n1) * 100.0 / total_n1;
        if pct.abs() > ctx.config.bilan_variation_threshold_pct {
            return one(
                NN006
                    .anomalie(
                        Severite::Info,
                        format!("Total bilan varie de {}{}", signe(pct), fmt_pct(pct)),
                    )
                    .with_details(
                        DetailsControle::new()
                            .montant("totalBilanN", total_n)
                            .montant("totalBilanN1", total_n1)
                            .montant("variationPct", pct),
                    ),
            );
        }
    }
    one(NN006.ok("Variation du total bilan dans les limites"))
}

fn nn007(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN007.non_applicable("Balance N-1 absente"));
    };
    let comptes_n: HashMap<&str, &BalanceEntry> =
        ctx.balance_n.iter().map(|e| (e.code(), e)).collect();

    let disparus: Vec<String> = n1
        .iter()
        .filter(|e| matches!(e.classe(), Some(6 | 7)) && e.solde().abs() > SEUIL_POSTE_SIGNIFICATIF)
        .filter(|e| match comptes_n.get(e.code()) {
            None => true,
            Some(n) => n.debit == 0.0 && n.credit == 0.0,
        })
        .map(|e| {
            format!(
                "{} ({}): {} en N-1",
                e.code(),
                e.intitule,
                fmt_montant(e.solde().abs())
            )
        })
        .collect();

    if disparus.is_empty() {
        return one(NN007.ok("Continuite des comptes de gestion"));
    }
    one(
        NN007
            .anomalie(
                Severite::Mineur,
                format!(
                    "{} compte(s) de gestion significatif(s) en N-1 absent(s) ou a zero en N",
                    disparus.len()
                ),
            )
            .with_details(DetailsControle::new().comptes(disparus.into_iter().take(10))),
    )
}

fn nn008(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(NN008.non_applicable("Balance N-1 absente"));
    };
    let brut = |b: &[BalanceEntry]| -> f64 {
        b.iter()
            .filter(|e| e.has_prefix("2") && !e.has_any_prefix(&["28", "29"]))
            .map(|e| e.solde().max(0.0))
            .sum()
    };
    let immob_n = brut(&ctx.balance_n);
    let immob_n1 = brut(n1);
    let variation = immob_n - immob_n1;

    if variation < -SEUIL_POSTE_SIGNIFICATIF {
        let cessions = abs_sum(ctx.balance_n.iter().filter(|e| e.has_any_prefix(&["81", "654"])));
        if cessions == 0.0 {
            return one(
                NN008
                    .anomalie(
                        Severite::Mineur,
                        format!(
                            "Diminution immobilisations ({}) sans cession comptabilisee",
                            fmt_montant(variation)
                        ),
                    )
                    .with_details(
                        DetailsControle::new()
                            .montant("immobN", immob_n)
                            .montant("immobN1", immob_n1)
                            .montant("variation", variation),
                    )
                    .with_suggestion("Verifier les mouvements d'immobilisations"),
            );
        }
    }
    one(NN008.ok("Immobilisations coherentes entre exercices"))
}

fn comp001(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(COMP001.non_applicable("Balance N-1 absente"));
    };
    let clotures_n1: HashMap<&str, f64> = n1
        .iter()
        .filter(|e| is_bilan(e))
        .map(|e| (e.code(), e.solde()))
        .collect();

    let mut total_ecart = 0.0;
    let mut nb_ecarts = 0usize;
    let mut comptes = Vec::new();
    for entry in ctx.balance_n.iter().filter(|e| is_bilan(e)) {
        let cloture_n1 = clotures_n1.get(entry.code()).copied().unwrap_or(0.0);
        let ouverture_n = entry.solde_ouverture();
        let ecart = (ouverture_n - cloture_n1).abs();
        if ecart > ctx.config.rounding_tolerance {
            total_ecart += ecart;
            nb_ecarts += 1;
            if comptes.len() < 10 {
                comptes.push(format!(
                    "{}: cloture N-1={} vs ouverture N={}",
                    entry.code(),
                    fmt_montant(cloture_n1),
                    fmt_montant(ouverture_n)
                ));
            }
        }
    }

    if total_ecart > SEUIL_ECART_OUVERTURE {
        return one(
            COMP001
                .anomalie(
                    Severite::Bloquant,
                    format!(
                        "Ecart total de {} sur les soldes de bilan entre N-1 et N",
                        fmt_montant(total_ecart)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("ecartTotal", total_ecart)
                        .montant("comptesAvecEcart", nb_ecarts as f64)
                        .comptes(comptes)
                        .attendu("Soldes de cloture N-1 = soldes d'ouverture N pour les classes 1 a 5"),
                )
                .with_suggestion("Rapprocher les deux balances compte par compte et verifier les reports a nouveau")
                .with_reference_reglementaire("Art. 40 Acte Uniforme OHADA - Continuite des exercices"),
        );
    }
    one(COMP001.ok("Soldes de bilan coherents entre N-1 et N"))
}

fn comp002(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(COMP002.non_applicable("Balance N-1 absente"));
    };
    let comptes_n: HashSet<&str> = ctx.balance_n.iter().map(|e| e.code()).collect();
    let absents: Vec<String> = n1
        .iter()
        .filter(|e| is_bilan(e) && e.solde().abs() > SEUIL_COMPTE_SIGNIFICATIF)
        .filter(|e| !comptes_n.contains(e.code()))
        .map(|e| format!("{} ({}): {}", e.code(), e.intitule, fmt_montant(e.solde())))
        .collect();

    if absents.is_empty() {
        return one(COMP002.ok("Tous les comptes N-1 sont presents en N"));
    }
    one(
        COMP002
            .anomalie(
                Severite::Majeur,
                format!(
                    "{} compte(s) de bilan significatif(s) en N-1 absent(s) en N",
                    absents.len()
                ),
            )
            .with_details(
                DetailsControle::new()
                    .montant("comptesAbsents", absents.len() as f64)
                    .comptes(absents.into_iter().take(15))
                    .attendu("Tous les comptes de bilan N-1 doivent etre reportes en N"),
            )
            .with_suggestion("Ajouter les reports a nouveau manquants dans la balance N"),
    )
}

fn comp003(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(COMP003.non_applicable("Balance N-1 absente"));
    };
    let resultat_n1 = n1.solde_crediteur(&["13"]);
    if resultat_n1.abs() < ctx.config.rounding_tolerance {
        return one(COMP003.ok("Pas de resultat N-1 a affecter"));
    }

    // 13x still carrying the prior result at opening means no appropriation
    let ouverture_13: f64 = -ctx
        .balance_n
        .lines_with_prefix("13")
        .map(|e| e.solde_ouverture())
        .sum::<f64>();
    if ouverture_13.abs() > ctx.config.rounding_tolerance {
        return one(
            COMP003
                .anomalie(
                    Severite::Majeur,
                    format!(
                        "Resultat N-1 ({}) non affecte: compte 13x non solde a l'ouverture ({})",
                        fmt_montant(resultat_n1),
                        fmt_montant(ouverture_13)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("resultatN1", resultat_n1)
                        .montant("compte13Ouverture", ouverture_13)
                        .montant("ran", ctx.balance_n.solde_crediteur(&["12"]))
                        .montant("reserves", ctx.balance_n.solde_crediteur(&["11"])),
                )
                .with_suggestion("Passer l'ecriture d'affectation du resultat: 13x vers 12x, 11x ou 46x")
                .with_reference_reglementaire("Art. 36 Acte Uniforme OHADA - Affectation du resultat"),
        );
    }
    one(COMP003.ok("Resultat N-1 correctement affecte"))
}

fn comp007(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(COMP007.non_applicable("Balance N-1 absente"));
    };
    let comptes_n1: HashSet<&str> = n1.iter().map(|e| e.code()).collect();
    let nouveaux: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| is_bilan(e) && e.solde().abs() > SEUIL_COMPTE_SIGNIFICATIF)
        .filter(|e| !comptes_n1.contains(e.code()))
        .map(|e| format!("{} ({}): {}", e.code(), e.intitule, fmt_montant(e.solde())))
        .collect();

    if nouveaux.is_empty() {
        return one(COMP007.ok("Pas de nouveau compte de bilan significatif"));
    }
    one(
        COMP007
            .anomalie(
                Severite::Info,
                format!(
                    "{} nouveau(x) compte(s) de bilan en N non present(s) en N-1",
                    nouveaux.len()
                ),
            )
            .with_details(
                DetailsControle::new()
                    .montant("comptesNouveaux", nouveaux.len() as f64)
                    .comptes(nouveaux.into_iter().take(15)),
            )
            .with_suggestion("Verifier que ces nouveaux comptes correspondent a des operations reelles"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatutControle;

    fn solde(compte: &str, solde: f64) -> BalanceEntry {
        BalanceEntry::new(compte, "", 0.0, 0.0, solde.max(0.0), (-solde).max(0.0))
    }

    fn ctx(n: Vec<BalanceEntry>, n1: Vec<BalanceEntry>) -> AuditContext {
        AuditContext::builder(n).balance_n1(n1).exercice("2024").build()
    }

    #[test]
    fn test_all_controls_not_applicable_without_n1() {
        let context = AuditContext::builder(vec![solde("601000", 10.0)]).build();
        for def in definitions() {
            let findings = def.evaluate(&context).unwrap();
            assert_eq!(findings.len(), 1);
            assert_eq!(findings[0].statut, StatutControle::NonApplicable, "{}", def.reference);
        }
    }

    #[test]
    fn test_carried_forward_matches_prior_result() {
        let context = ctx(vec![solde("121000", -400.0)], vec![solde("131000", -400.0)]);
        assert!(nn001(&context).unwrap()[0].is_ok());
        let context = ctx(vec![solde("121000", -300.0)], vec![solde("131000", -400.0)]);
        let f = &nn001(&context).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
        assert_eq!(f.details.as_ref().unwrap().ecart, Some(-100.0));
    }

    #[test]
    fn test_group_variation_uses_configured_threshold() {
        let context = ctx(vec![solde("601000", 1800.0)], vec![solde("601000", 1000.5)]);
        let f = &nn005(&context).unwrap()[0];
        assert_eq!(f.severite, Severite::Mineur);

        let mut context = context;
        context.config.variation_threshold_pct = 90.0;
        assert!(nn005(&context).unwrap()[0].is_ok());
    }

    #[test]
    fn test_vanished_management_accounts() {
        let context = ctx(vec![solde("601000", 10.0)], vec![solde("622000", 5000.0)]);
        assert_eq!(nn007(&context).unwrap()[0].severite, Severite::Mineur);
    }

    #[test]
    fn test_opening_balances_continuity() {
        let n1 = vec![solde("521000", 1000.0)];
        let ok = vec![BalanceEntry::new("521000", "", 500.0, 200.0, 1300.0, 0.0)];
        assert!(comp001(&ctx(ok, n1.clone())).unwrap()[0].is_ok());

        let ko = vec![BalanceEntry::new("521000", "", 500.0, 200.0, 1800.0, 0.0)];
        assert!(comp001(&ctx(ko, n1)).unwrap()[0].is_bloquant());
    }

    #[test]
    fn test_missing_and_new_balance_sheet_accounts() {
        let context = ctx(vec![solde("411200", 500.0)], vec![solde("411100", 500.0), solde("411300", 50.0)]);
        let f = &comp002(&context).unwrap()[0];
        assert_eq!(f.comptes().len(), 1);
        assert!(f.comptes()[0].starts_with("411100"));
        assert_eq!(comp007(&context).unwrap()[0].severite, Severite::Info);
    }
}
