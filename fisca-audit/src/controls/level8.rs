//! Level 8: continuity against archived exercises
//!
//! Every control reports `NON_APPLICABLE` when no prior archive exists.
//! Archives of the exercise under audit (or later ones) are ignored.

use super::helpers::{fmt_montant, one, Findings};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{ArchiveAudit, BalanceEntry, BalanceExt, DetailsControle, Niveau, Severite};
use std::collections::{BTreeSet, HashMap};

const N: Niveau = Niveau::Archives;

const AR001: ControlMeta = ControlMeta::new("AR-001", "Balance N-1 = Archive N-1", N);
const AR002: ControlMeta = ControlMeta::new("AR-002", "Continuite du capital", N);
const AR003: ControlMeta = ControlMeta::new("AR-003", "Tendance des resultats", N);
const AR004: ControlMeta = ControlMeta::new("AR-004", "Rupture de serie", N);
const AR005: ControlMeta = ControlMeta::new("AR-005", "Reports a nouveau successifs", N);
const AR006: ControlMeta = ControlMeta::new("AR-006", "Methodes comptables stables", N);
const AR007: ControlMeta = ControlMeta::new("AR-007", "Ajustements retrospectifs", N);
const AR008: ControlMeta = ControlMeta::new("AR-008", "Ouverture N = Cloture archivee", N);

const AUCUNE_ARCHIVE: &str = "Aucune archive disponible";
const PERMANENCE: &str = "Art. 8 Acte Uniforme OHADA - Permanence des methodes";

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(AR001, "Coherence balance N-1 vs archive", Severite::Bloquant, ar001),
        ControlDefinition::new(AR002, "Stabilite du capital sur les exercices", Severite::Mineur, ar002),
        ControlDefinition::new(AR003, "Analyse tendance multi-exercices", Severite::Info, ar003),
        ControlDefinition::new(AR004, "Detecte les exercices manquants", Severite::Mineur, ar004),
        ControlDefinition::new(AR005, "Coherence des RAN successifs", Severite::Majeur, ar005),
        ControlDefinition::new(AR006, "Permanence des methodes", Severite::Info, ar006),
        ControlDefinition::new(AR007, "Detecte les ajustements retrospectifs", Severite::Majeur, ar007),
        ControlDefinition::new(AR008, "Soldes d'ouverture vs derniere archive", Severite::Majeur, ar008),
    ]
}

/// Archives of exercises before the audited one, oldest first
fn archives_anterieures(ctx: &AuditContext) -> Vec<&ArchiveAudit> {
    let exercice = ctx.exercice.trim();
    let annee = ctx.annee();
    ctx.archives_triees()
        .into_iter()
        .filter(|a| a.exercice.trim() != exercice)
        .filter(|a| match (a.annee(), annee) {
            (Some(archivee), Some(courante)) => archivee < courante,
            _ => true,
        })
        .collect()
}

fn archive_n1<'a>(ctx: &'a AuditContext, archives: &[&'a ArchiveAudit]) -> Option<&'a ArchiveAudit> {
    let annee_n1 = ctx.annee()? - 1;
    archives.iter().copied().find(|a| a.annee() == Some(annee_n1))
}

fn ar001(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR001.non_applicable(AUCUNE_ARCHIVE));
    }
    let Some(n1) = ctx.n1() else {
        return one(AR001.non_applicable("Balance N-1 absente"));
    };
    if ctx.annee().is_none() {
        return one(AR001.non_applicable("Exercice non defini"));
    }
    let Some(archive) = archive_n1(ctx, &archives) else {
        return one(AR001.non_applicable("Pas d'archive pour l'exercice N-1"));
    };

    let snapshot = &archive.snapshot;
    if !snapshot.is_intact() {
        return one(
            AR001
                .anomalie(
                    Severite::Bloquant,
                    format!("Archive {} alteree: empreinte ou totaux incoherents", archive.exercice),
                )
                .with_details(DetailsControle::new().description(format!("Empreinte archivee: {}", snapshot.hash)))
                .with_suggestion("Restaurer l'archive officielle de l'exercice N-1")
                .with_reference_reglementaire("Art. 24 Acte Uniforme OHADA - Conservation des documents comptables"),
        );
    }

    let total_debit = n1.total_debit();
    let total_credit = n1.total_credit();
    let ecart_debit = (total_debit - snapshot.total_debit).abs();
    let ecart_credit = (total_credit - snapshot.total_credit).abs();
    let tol = ctx.config.rounding_tolerance;

    if ecart_debit > tol || ecart_credit > tol {
        return one(
            AR001
                .anomalie(
                    Severite::Bloquant,
                    format!(
                        "Balance N-1 differente de l'archive: ecarts D={}, C={}",
                        fmt_montant(ecart_debit),
                        fmt_montant(ecart_credit)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("totalN1Debit", total_debit)
                        .montant("archiveDebit", snapshot.total_debit)
                        .montant("totalN1Credit", total_credit)
                        .montant("archiveCredit", snapshot.total_credit),
                )
                .with_suggestion(
                    "Utiliser la balance N-1 issue de l'archive officielle ou re-archiver la version definitive",
                )
                .with_reference_reglementaire("Art. 8 Acte Uniforme OHADA - Permanence des methodes et continuite"),
        );
    }
    one(AR001.ok("Balance N-1 conforme a l'archive"))
}

fn ar002(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR002.non_applicable(AUCUNE_ARCHIVE));
    }
    let capital_n = ctx.balance_n.solde_crediteur(&["101"]);
    let variations: Vec<String> = archives
        .iter()
        .filter_map(|a| {
            let capital = a.snapshot.lignes.solde_crediteur(&["101"]);
            ((capital - capital_n).abs() > ctx.config.rounding_tolerance).then(|| {
                format!(
                    "{}: {} -> N: {}",
                    a.exercice,
                    fmt_montant(capital),
                    fmt_montant(capital_n)
                )
            })
        })
        .collect();

    if variations.is_empty() {
        return one(AR002.ok("Capital stable sur les exercices archives"));
    }
    one(
        AR002
            .anomalie(Severite::Mineur, "Variation(s) de capital detectee(s) sur les archives")
            .with_details(
                DetailsControle::new()
                    .montant("variationsDetectees", variations.len() as f64)
                    .montant("capitalActuel", capital_n)
                    .comptes(variations),
            )
            .with_suggestion("Justifier chaque variation de capital par le PV d'AG correspondant")
            .with_reference_reglementaire(PERMANENCE),
    )
}

fn ar003(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR003.non_applicable(AUCUNE_ARCHIVE));
    }
    let mut resultats: Vec<(String, f64)> = archives
        .iter()
        .map(|a| (a.exercice.clone(), a.snapshot.lignes.solde_crediteur(&["13"])))
        .collect();
    resultats.push((ctx.exercice.clone(), ctx.balance_n.solde_crediteur(&["13"])));

    let derniers = &resultats[resultats.len().saturating_sub(3)..];
    if derniers.len() == 3 && derniers.iter().all(|(_, r)| *r < 0.0) {
        let cumul: f64 = derniers.iter().map(|(_, r)| r.abs()).sum();
        return one(
            AR003
                .anomalie(Severite::Info, "Deficits consecutifs sur 3 exercices")
                .with_details(
                    DetailsControle::new()
                        .comptes(derniers.iter().map(|(e, r)| format!("{}: {}", e, fmt_montant(*r))))
                        .montant("totalDeficitsCumules", cumul),
                )
                .with_suggestion("Evaluer la continuite d'exploitation et la situation des capitaux propres")
                .with_reference_reglementaire("Art. 8 Acte Uniforme OHADA / Art. 664 AUSCGIE"),
        );
    }
    one(AR003.ok(format!("Tendance analysee sur {} exercice(s)", resultats.len())))
}

fn ar004(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR004.non_applicable(AUCUNE_ARCHIVE));
    }
    let mut annees: Vec<i32> = archives.iter().filter_map(|a| a.annee()).collect();
    annees.extend(ctx.annee());
    annees.dedup();
    if annees.len() < 2 {
        return one(AR004.non_applicable("Moins de 2 exercices dates"));
    }

    let ruptures: Vec<String> = annees
        .windows(2)
        .filter(|w| w[1] - w[0] > 1)
        .map(|w| format!("Exercices manquants entre {} et {}", w[0], w[1]))
        .collect();

    if ruptures.is_empty() {
        return one(AR004.ok("Serie d'exercices continue"));
    }
    one(
        AR004
            .anomalie(Severite::Mineur, "Rupture(s) dans la serie des exercices archives")
            .with_details(
                DetailsControle::new()
                    .montant("rupturesDetectees", ruptures.len() as f64)
                    .montant("exercicesArchives", archives.len() as f64)
                    .comptes(ruptures),
            )
            .with_suggestion("Archiver les exercices manquants pour reconstituer la serie complete")
            .with_reference_reglementaire("Art. 24 Acte Uniforme OHADA - Conservation des documents comptables"),
    )
}

fn ar005(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR005.non_applicable(AUCUNE_ARCHIVE));
    }
    // Pairs of consecutive years only; gaps are reported by AR-004
    let incoherences: Vec<String> = archives
        .windows(2)
        .filter(|w| matches!((w[0].annee(), w[1].annee()), (Some(a), Some(b)) if b - a == 1))
        .filter_map(|w| {
            let resultat = w[0].snapshot.lignes.solde_crediteur(&["13"]);
            let ran = w[1].snapshot.lignes.solde_crediteur(&["12"]);
            ((ran - resultat).abs() > ctx.config.rounding_tolerance).then(|| {
                format!(
                    "{}: RAN({}) != Res {}({})",
                    w[1].exercice,
                    fmt_montant(ran),
                    w[0].exercice,
                    fmt_montant(resultat)
                )
            })
        })
        .collect();

    if incoherences.is_empty() {
        return one(AR005.ok("Reports a nouveau coherents"));
    }
    one(
        AR005
            .anomalie(
                Severite::Majeur,
                format!("{} incoherence(s) de report a nouveau", incoherences.len()),
            )
            .with_details(
                DetailsControle::new()
                    .montant("incoherences", incoherences.len() as f64)
                    .montant("exercicesVerifies", archives.len() as f64)
                    .comptes(incoherences),
            )
            .with_suggestion("Reconstituer la chaine des reports a nouveau: dividendes, reserves ou erreurs")
            .with_reference_reglementaire(PERMANENCE),
    )
}

fn ar006(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    let Some(derniere) = archives.last() else {
        return one(AR006.non_applicable(AUCUNE_ARCHIVE));
    };
    let prefixes = |b: &[BalanceEntry]| -> BTreeSet<String> {
        b.iter().map(|e| e.code().chars().take(2).collect()).collect()
    };
    let prefixes_n = prefixes(&ctx.balance_n);
    let prefixes_archive = prefixes(&derniere.snapshot.lignes);
    let nouveaux: Vec<&String> = prefixes_n.difference(&prefixes_archive).collect();
    let supprimes: Vec<&String> = prefixes_archive.difference(&prefixes_n).collect();

    if nouveaux.len() > 5 || supprimes.len() > 5 {
        return one(
            AR006
                .anomalie(
                    Severite::Info,
                    format!(
                        "Changements de structure: +{} prefixes, -{} prefixes",
                        nouveaux.len(),
                        supprimes.len()
                    ),
                )
                .with_details(
                    DetailsControle::new().comptes(
                        nouveaux
                            .iter()
                            .map(|p| format!("+{}", p))
                            .chain(supprimes.iter().map(|p| format!("-{}", p))),
                    ),
                )
                .with_suggestion("Documenter les changements de nomenclature dans l'annexe")
                .with_reference_reglementaire(PERMANENCE),
        );
    }
    one(AR006.ok("Methodes comptables stables"))
}

fn ar007(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    if archives.is_empty() {
        return one(AR007.non_applicable(AUCUNE_ARCHIVE));
    }
    let Some(archive) = archive_n1(ctx, &archives) else {
        return one(AR007.non_applicable("Pas d'archive pour l'exercice N-1"));
    };
    let ran = ctx.balance_n.solde_crediteur(&["12"]);
    let resultat = archive.snapshot.lignes.solde_crediteur(&["13"]);
    let ajustement = ran - resultat;

    if ajustement.abs() > ctx.config.rounding_tolerance {
        return one(
            AR007
                .anomalie(
                    Severite::Majeur,
                    format!(
                        "Ajustement retrospectif detecte: {} (RAN - Resultat archive)",
                        fmt_montant(ajustement)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .ecart(ajustement)
                        .montant("ranN", ran)
                        .montant("resultatArchive", resultat),
                )
                .with_suggestion("Documenter l'ajustement retrospectif dans l'annexe: nature, motif et impact")
                .with_reference_reglementaire("Art. 8 Acte Uniforme OHADA - Changements de methodes"),
        );
    }
    one(AR007.ok("Pas d'ajustement retrospectif"))
}

fn ar008(ctx: &AuditContext) -> Findings {
    let archives = archives_anterieures(ctx);
    let Some(derniere) = archives.last() else {
        return one(AR008.non_applicable(AUCUNE_ARCHIVE));
    };
    let tol = ctx.config.rounding_tolerance;
    let is_bilan = |e: &&BalanceEntry| matches!(e.classe(), Some(1..=5));

    let clotures: HashMap<&str, f64> = derniere
        .snapshot
        .lignes
        .iter()
        .filter(is_bilan)
        .map(|e| (e.code(), e.solde()))
        .collect();
    let ouvertures: HashMap<&str, f64> = ctx
        .balance_n
        .iter()
        .filter(is_bilan)
        .map(|e| (e.code(), e.solde_ouverture()))
        .collect();

    let comptes: BTreeSet<&str> = clotures.keys().chain(ouvertures.keys()).copied().collect();
    let mut ecart_total = 0.0;
    let mut ecarts = Vec::new();
    for compte in comptes {
        let cloture = clotures.get(compte).copied().unwrap_or(0.0);
        let ouverture = ouvertures.get(compte).copied().unwrap_or(0.0);
        let ecart = ouverture - cloture;
        if ecart.abs() > tol {
            ecart_total += ecart.abs();
            ecarts.push(format!(
                "{}: cloture {}={} vs ouverture N={}",
                compte,
                derniere.exercice,
                fmt_montant(cloture),
                fmt_montant(ouverture)
            ));
        }
    }

    if ecarts.is_empty() {
        return one(AR008.ok(format!(
            "Soldes d'ouverture conformes a l'archive {}",
            derniere.exercice
        )));
    }
    one(
        AR008
            .anomalie(
                Severite::Majeur,
                format!(
                    "{} compte(s) de bilan dont l'ouverture differe de la cloture archivee {}",
                    ecarts.len(),
                    derniere.exercice
                ),
            )
            .with_details(
                DetailsControle::new()
                    .montant("ecartTotal", ecart_total)
                    .montant("comptesAvecEcart", ecarts.len() as f64)
                    .comptes(ecarts.into_iter().take(15))
                    .attendu("Solde d'ouverture N = solde de cloture de la derniere archive"),
            )
            .with_suggestion("Reprendre les a-nouveaux a partir de la balance archivee")
            .with_reference_reglementaire("Art. 40 Acte Uniforme OHADA - Continuite des exercices"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseAudit, SessionAudit, StatutControle};

    fn solde(compte: &str, solde: f64) -> BalanceEntry {
        BalanceEntry::new(compte, "", 0.0, 0.0, solde.max(0.0), (-solde).max(0.0))
    }

    fn archive(exercice: &str, lignes: Vec<BalanceEntry>) -> ArchiveAudit {
        let session = SessionAudit::new(format!("bal-{}", exercice), exercice, PhaseAudit::Phase1);
        ArchiveAudit::from_session(session, lignes)
    }

    fn ctx(n: Vec<BalanceEntry>, archives: Vec<ArchiveAudit>) -> AuditContext {
        AuditContext::builder(n).exercice("2024").archives(archives).build()
    }

    #[test]
    fn test_all_controls_not_applicable_without_archives() {
        let context = ctx(vec![solde("101000", -100.0)], vec![]);
        for def in definitions() {
            let findings = def.evaluate(&context).unwrap();
            assert_eq!(findings[0].statut, StatutControle::NonApplicable, "{}", def.reference);
        }
    }

    #[test]
    fn test_current_exercise_archive_is_ignored() {
        let context = ctx(vec![solde("101000", -100.0)], vec![archive("2024", vec![solde("101000", -50.0)])]);
        assert_eq!(ar002(&context).unwrap()[0].statut, StatutControle::NonApplicable);
    }

    #[test]
    fn test_n1_totals_against_archive() {
        let lignes = vec![BalanceEntry::new("521000", "", 100.0, 0.0, 100.0, 0.0)];
        let mut context = ctx(vec![solde("521000", 100.0)], vec![archive("2023", lignes.clone())]);
        context.balance_n1 = Some(lignes);
        assert!(ar001(&context).unwrap()[0].is_ok());

        context.balance_n1 = Some(vec![BalanceEntry::new("521000", "", 150.0, 0.0, 150.0, 0.0)]);
        assert!(ar001(&context).unwrap()[0].is_bloquant());

        context.archives[0].snapshot.total_debit = 999.0;
        let f = &ar001(&context).unwrap()[0];
        assert!(f.is_bloquant());
        assert!(f.message.contains("alteree"));
    }

    #[test]
    fn test_gap_in_archived_series() {
        let context = ctx(
            vec![solde("101000", -100.0)],
            vec![archive("2020", vec![]), archive("2023", vec![])],
        );
        let f = &ar004(&context).unwrap()[0];
        assert_eq!(f.severite, Severite::Mineur);
        assert_eq!(f.comptes(), &["Exercices manquants entre 2020 et 2023".to_string()]);
    }

    #[test]
    fn test_successive_carried_forward() {
        let context = ctx(
            vec![],
            vec![
                archive("2022", vec![solde("131000", -300.0)]),
                archive("2023", vec![solde("121000", -200.0)]),
            ],
        );
        assert_eq!(ar005(&context).unwrap()[0].severite, Severite::Majeur);
    }

    #[test]
    fn test_opening_balances_against_latest_archive() {
        let archives = vec![archive("2023", vec![solde("521000", 400.0), solde("101000", -400.0)])];
        let n = vec![
            BalanceEntry::new("521000", "", 100.0, 0.0, 500.0, 0.0),
            BalanceEntry::new("101000", "", 0.0, 0.0, 0.0, 400.0),
        ];
        assert!(ar008(&ctx(n, archives.clone())).unwrap()[0].is_ok());

        let n = vec![BalanceEntry::new("521000", "", 0.0, 0.0, 500.0, 0.0)];
        let f = &ar008(&ctx(n, archives)).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
        assert_eq!(f.comptes().len(), 2);
    }
}
