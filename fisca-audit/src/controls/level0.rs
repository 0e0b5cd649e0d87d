//! Level 0: structural controls on the imported balance
//!
//! File-level integrity: readable, well-formed codes and amounts, no
//! duplicates, no total lines, optional prior-year balance coherent with N.

use super::helpers::{fmt_pct, one, Findings};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{DetailsControle, Niveau, Severite};
use std::collections::{BTreeSet, HashMap};

const N: Niveau = Niveau::Structurel;

const S001: ControlMeta = ControlMeta::new("S-001", "Fichier lisible", N);
const S003: ControlMeta = ControlMeta::new("S-003", "Numeros de compte valides", N);
const S004: ControlMeta = ControlMeta::new("S-004", "Montants numeriques", N);
const S005: ControlMeta = ControlMeta::new("S-005", "Nombre minimum de lignes", N);
const S006: ControlMeta = ControlMeta::new("S-006", "Pas de doublons", N);
const S007: ControlMeta = ControlMeta::new("S-007", "Encodage correct", N);
const S008: ControlMeta = ControlMeta::new("S-008", "Lignes de totalisation", N);
const S009: ControlMeta = ControlMeta::new("S-009", "Balance N-1 disponible", N);
const S010: ControlMeta = ControlMeta::new("S-010", "Coherence N / N-1", N);
const S011: ControlMeta = ControlMeta::new("S-011", "Solde unique par ligne", N);

/// Minimum share of well-formed account codes before the file is rejected
const SEUIL_COMPTES_VALIDES_PCT: f64 = 80.0;
const MIN_LIGNES: usize = 10;

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(S001, "Verifie que la balance contient des lignes", Severite::Bloquant, s001),
        ControlDefinition::new(S003, "Verifie le format des numeros de compte", Severite::Bloquant, s003),
        ControlDefinition::new(S004, "Verifie que les montants sont des nombres finis", Severite::Bloquant, s004),
        ControlDefinition::new(S005, "Verifie que la balance contient au moins 10 comptes", Severite::Bloquant, s005),
        ControlDefinition::new(S006, "Detecte les comptes en doublon", Severite::Bloquant, s006),
        ControlDefinition::new(S007, "Detecte les libelles mal encodes", Severite::Mineur, s007),
        ControlDefinition::new(S008, "Detecte les lignes de total ou sous-total", Severite::Mineur, s008),
        ControlDefinition::new(S009, "Verifie la presence de la balance N-1", Severite::Mineur, s009),
        ControlDefinition::new(S010, "Compare la structure des balances N et N-1", Severite::Majeur, s010),
        ControlDefinition::new(S011, "Detecte les lignes a solde debiteur et crediteur", Severite::Majeur, s011),
    ]
}

fn is_code_valide(code: &str) -> bool {
    (2..=12).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit())
}

fn s001(ctx: &AuditContext) -> Findings {
    if ctx.balance_n.is_empty() {
        return one(
            S001.anomalie(Severite::Bloquant, "La balance ne contient aucune ligne")
                .with_suggestion("Reimporter un fichier balance contenant des donnees comptables"),
        );
    }
    one(S001.ok(format!("Balance lisible: {} lignes", ctx.balance_n.len())))
}

fn s003(ctx: &AuditContext) -> Findings {
    let total = ctx.balance_n.len();
    if total == 0 {
        return one(S003.non_applicable("Aucune ligne a verifier"));
    }

    let invalides: Vec<String> = ctx
        .balance_n
        .iter()
        .map(|e| e.code())
        .filter(|c| !is_code_valide(c))
        .map(|c| if c.is_empty() { "(vide)".to_string() } else { c.to_string() })
        .collect();

    let pct_valide = ((total - invalides.len()) as f64 / total as f64) * 100.0;
    if pct_valide < SEUIL_COMPTES_VALIDES_PCT {
        return one(
            S003.anomalie(
                Severite::Bloquant,
                format!(
                    "Seulement {} de comptes valides (seuil: {})",
                    fmt_pct(pct_valide),
                    fmt_pct(SEUIL_COMPTES_VALIDES_PCT)
                ),
            )
            .with_details(DetailsControle::new().comptes(invalides.into_iter().take(20)))
            .with_suggestion("Verifier le format des numeros de compte (2 a 12 chiffres)"),
        );
    }
    if !invalides.is_empty() {
        return one(
            S003.anomalie(
                Severite::Mineur,
                format!("{} compte(s) avec format non standard", invalides.len()),
            )
            .with_details(DetailsControle::new().comptes(invalides.into_iter().take(10)))
            .with_suggestion("Corriger les numeros de compte non standard (format attendu: 2 a 12 chiffres)"),
        );
    }
    one(S003.ok(format!("Tous les {} comptes ont un format valide", total)))
}

fn s004(ctx: &AuditContext) -> Findings {
    let non_numeriques: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| {
            ![e.debit, e.credit, e.solde_debit, e.solde_credit]
                .iter()
                .all(|v| v.is_finite())
        })
        .map(|e| e.code().to_string())
        .collect();

    if !non_numeriques.is_empty() {
        return one(
            S004.anomalie(
                Severite::Bloquant,
                format!("{} ligne(s) avec montants non numeriques", non_numeriques.len()),
            )
            .with_details(DetailsControle::new().comptes(non_numeriques.into_iter().take(10)))
            .with_suggestion("Verifier que les colonnes de montants contiennent uniquement des nombres"),
        );
    }
    one(S004.ok("Tous les montants sont numeriques"))
}

fn s005(ctx: &AuditContext) -> Findings {
    let count = ctx.balance_n.len();
    if count < MIN_LIGNES {
        return one(
            S005.anomalie(
                Severite::Bloquant,
                format!("Seulement {} comptes (minimum requis: {})", count, MIN_LIGNES),
            )
            .with_suggestion("Une balance standard contient au minimum 10 comptes"),
        );
    }
    one(S005.ok(format!("{} comptes dans la balance", count)))
}

fn s006(ctx: &AuditContext) -> Findings {
    let mut vus: HashMap<&str, usize> = HashMap::new();
    let mut doublons = Vec::new();
    for entry in &ctx.balance_n {
        let count = vus.entry(entry.code()).or_insert(0);
        *count += 1;
        if *count == 2 {
            doublons.push(entry.code().to_string());
        }
    }

    if !doublons.is_empty() {
        return one(
            S006.anomalie(
                Severite::Bloquant,
                format!("{} compte(s) en doublon detecte(s)", doublons.len()),
            )
            .with_details(DetailsControle::new().comptes(doublons.into_iter().take(10)))
            .with_suggestion("Fusionner ou supprimer les doublons avant audit"),
        );
    }
    one(S006.ok("Aucun doublon de compte detecte"))
}

const MOTIFS_ENCODAGE: &[&str] = &["Ã©", "Ã¨", "Ã ", "ï¿½", "\u{FFFD}", "\\u00"];

fn s007(ctx: &AuditContext) -> Findings {
    let suspects: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| MOTIFS_ENCODAGE.iter().any(|m| e.intitule.contains(m)))
        .map(|e| format!("{} ({})", e.code(), e.intitule))
        .collect();

    if !suspects.is_empty() {
        return one(
            S007.anomalie(
                Severite::Mineur,
                format!("{} libelle(s) avec probleme d'encodage", suspects.len()),
            )
            .with_details(DetailsControle::new().comptes(suspects.into_iter().take(10)))
            .with_suggestion("Reexporter la balance en UTF-8"),
        );
    }
    one(S007.ok("Encodage des libelles correct"))
}

fn is_ligne_total(intitule: &str) -> bool {
    let label = intitule.trim().to_uppercase();
    const TOTAUX: &[&str] = &["TOTAL", "SOUS-TOTAL", "SOUS TOTAL", "SOUSTOTAL", "S/TOTAL", "STOTAL"];
    if TOTAUX.iter().any(|t| label.starts_with(t)) {
        return true;
    }
    ["CLASSE", "SECTION"].iter().any(|mot| {
        label
            .strip_prefix(mot)
            .map(|rest| rest.trim_start().starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

fn s008(ctx: &AuditContext) -> Findings {
    let totaux: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| is_ligne_total(&e.intitule))
        .map(|e| format!("{} ({})", e.code(), e.intitule.trim()))
        .collect();

    if !totaux.is_empty() {
        return one(
            S008.anomalie(
                Severite::Mineur,
                format!("{} ligne(s) de totalisation detectee(s)", totaux.len()),
            )
            .with_details(
                DetailsControle::new()
                    .comptes(totaux.into_iter().take(10))
                    .description("Les lignes de total faussent les sommes par classe et l'equilibre"),
            )
            .with_suggestion("Supprimer les lignes de total et sous-total avant import"),
        );
    }
    one(S008.ok("Aucune ligne de totalisation"))
}

fn s009(ctx: &AuditContext) -> Findings {
    match ctx.n1() {
        Some(n1) => one(S009.ok(format!("Balance N-1 disponible: {} lignes", n1.len()))),
        None => one(
            S009.anomalie(Severite::Mineur, "Balance N-1 non fournie")
                .with_suggestion("Importer la balance N-1 pour activer les controles de comparaison"),
        ),
    }
}

fn s010(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(S010.non_applicable("Balance N-1 non disponible"));
    };

    let comptes_n: BTreeSet<&str> = ctx.balance_n.iter().map(|e| e.code()).collect();
    let comptes_n1: BTreeSet<&str> = n1.iter().map(|e| e.code()).collect();
    let communs = comptes_n.intersection(&comptes_n1).count();
    let nouveaux: Vec<&str> = comptes_n.difference(&comptes_n1).copied().collect();
    let disparus: Vec<&str> = comptes_n1.difference(&comptes_n).copied().collect();

    let denominateur = comptes_n.len() + comptes_n1.len();
    let taux_commun = if denominateur > 0 {
        (communs as f64 * 2.0 / denominateur as f64) * 100.0
    } else {
        0.0
    };

    let details = DetailsControle::new()
        .montant("comptesCommuns", communs as f64)
        .montant("nouveaux", nouveaux.len() as f64)
        .montant("disparus", disparus.len() as f64)
        .montant("tauxCommun", (taux_commun * 10.0).round() / 10.0);

    if taux_commun < 50.0 {
        return one(
            S010.anomalie(
                Severite::Majeur,
                format!(
                    "Seulement {} de comptes communs entre N et N-1",
                    fmt_pct(taux_commun)
                ),
            )
            .with_details(details.description(
                "La structure des balances differe fortement: verifier qu'il s'agit bien de la meme entite",
            ))
            .with_suggestion("Verifier que la balance N-1 correspond a la meme entreprise et au meme plan de comptes"),
        );
    }
    if nouveaux.len() > 10 || disparus.len() > 10 {
        let comptes = nouveaux.iter().chain(disparus.iter()).take(10).map(|c| c.to_string());
        return one(
            S010.anomalie(
                Severite::Mineur,
                format!(
                    "{} nouveau(x) compte(s) et {} compte(s) disparu(s) entre N-1 et N",
                    nouveaux.len(),
                    disparus.len()
                ),
            )
            .with_details(details.comptes(comptes)),
        );
    }
    one(S010.ok(format!("Structure coherente: {} de comptes communs", fmt_pct(taux_commun))))
}

fn s011(ctx: &AuditContext) -> Findings {
    let doubles: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| e.solde_debit != 0.0 && e.solde_credit != 0.0)
        .map(|e| e.code().to_string())
        .collect();

    if !doubles.is_empty() {
        return one(
            S011.anomalie(
                Severite::Majeur,
                format!(
                    "{} ligne(s) avec solde debiteur et crediteur simultanes",
                    doubles.len()
                ),
            )
            .with_details(DetailsControle::new().comptes(doubles.into_iter().take(10)))
            .with_suggestion("Compenser les soldes: une ligne de balance ne porte qu'un solde net"),
        );
    }
    one(S011.ok("Chaque ligne porte un solde unique"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BalanceEntry, StatutControle};

    fn ctx(lines: Vec<BalanceEntry>) -> AuditContext {
        AuditContext::builder(lines).exercice("2024").build()
    }

    fn line(compte: &str, intitule: &str) -> BalanceEntry {
        BalanceEntry::new(compte, intitule, 10.0, 0.0, 10.0, 0.0)
    }

    #[test]
    fn test_empty_balance_is_blocking() {
        let findings = s001(&ctx(Vec::new())).unwrap();
        assert_eq!(findings[0].severite, Severite::Bloquant);
        assert_eq!(s003(&ctx(Vec::new())).unwrap()[0].statut, StatutControle::NonApplicable);
    }

    #[test]
    fn test_code_format_thresholds() {
        let mut lines: Vec<_> = (0..9).map(|i| line(&format!("60100{}", i), "Achat")).collect();
        lines.push(line("ABC", "Mauvais"));
        let f = &s003(&ctx(lines.clone())).unwrap()[0];
        assert_eq!(f.severite, Severite::Mineur);

        lines.extend((0..3).map(|i| line(&format!("X{}", i), "Mauvais")));
        let f = &s003(&ctx(lines)).unwrap()[0];
        assert_eq!(f.severite, Severite::Bloquant);
    }

    #[test]
    fn test_non_finite_amounts() {
        let mut bad = line("601000", "Achat");
        bad.credit = f64::NAN;
        let f = &s004(&ctx(vec![bad])).unwrap()[0];
        assert_eq!(f.severite, Severite::Bloquant);
    }

    #[test]
    fn test_duplicates_on_trimmed_codes() {
        let f = &s006(&ctx(vec![line("601000", "A"), line(" 601000 ", "B")])).unwrap()[0];
        assert_eq!(f.severite, Severite::Bloquant);
        assert_eq!(f.comptes(), &["601000".to_string()]);
    }

    #[test]
    fn test_total_line_detection() {
        assert!(is_ligne_total("Total classe 6"));
        assert!(is_ligne_total("sous-total charges"));
        assert!(is_ligne_total("CLASSE 4"));
        assert!(!is_ligne_total("Classement archives"));
        assert!(!is_ligne_total("Achats de marchandises"));
    }

    #[test]
    fn test_encoding_detection() {
        let f = &s007(&ctx(vec![line("601000", "Achats march\u{c3}\u{a9}"), line("602000", "OK")]))
            .unwrap()[0];
        assert_eq!(f.statut, StatutControle::Anomalie);
        let f = &s007(&ctx(vec![line("601000", "Achats")])).unwrap()[0];
        assert!(f.is_ok());
    }

    #[test]
    fn test_n1_coherence_requires_n1() {
        let f = &s010(&ctx(vec![line("601000", "A")])).unwrap()[0];
        assert_eq!(f.statut, StatutControle::NonApplicable);

        let context = AuditContext::builder(vec![line("601000", "A")])
            .balance_n1(vec![line("701000", "B")])
            .build();
        let f = &s010(&context).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
    }

    #[test]
    fn test_double_closing_balance() {
        let both = BalanceEntry::new("411000", "Client", 0.0, 0.0, 100.0, 20.0);
        let f = &s011(&ctx(vec![both])).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
    }
}
