//! Level 1: fundamental equilibria
//!
//! Debit/credit equality uses `config.tolerance`; aggregate comparisons
//! (results, balance sheet, carried-forward result) use
//! `config.rounding_tolerance`.

use super::helpers::{fmt_montant, fmt_pct, one, Findings};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, BalanceExt, DetailsControle, EcritureCorrective, Niveau, Severite};
use std::collections::BTreeSet;

const N: Niveau = Niveau::Fondamental;

const F001: ControlMeta = ControlMeta::new("F-001", "Equilibre general N", N);
const F002: ControlMeta = ControlMeta::new("F-002", "Equilibre general N-1", N);
const F003: ControlMeta = ControlMeta::new("F-003", "Resultat coherent", N);
const F004: ControlMeta = ControlMeta::new("F-004", "Total bilan equilibre", N);
const F005: ControlMeta = ControlMeta::new("F-005", "Classes essentielles presentes", N);
const F006: ControlMeta = ControlMeta::new("F-006", "Compte capital present", N);
const F007: ControlMeta = ControlMeta::new("F-007", "Compte resultat present", N);
const F008: ControlMeta = ControlMeta::new("F-008", "Report a nouveau coherent", N);
const F009: ControlMeta = ControlMeta::new("F-009", "Nombre de comptes suffisant", N);
const F010: ControlMeta = ControlMeta::new("F-010", "Comptes a solde nul", N);
const F011: ControlMeta = ControlMeta::new("F-011", "Comptes collectifs", N);

const CLASSES_ESSENTIELLES: [u8; 6] = [1, 2, 4, 5, 6, 7];
const COMPTES_COLLECTIFS: [&str; 2] = ["401", "411"];
const MIN_COMPTES_COMPLETS: usize = 50;

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(F001, "Verifie que total debits = total credits", Severite::Bloquant, f001),
        ControlDefinition::new(F002, "Verifie l'equilibre de la balance N-1", Severite::Bloquant, f002),
        ControlDefinition::new(F003, "Verifie coherence produits-charges vs compte 13x", Severite::Bloquant, f003),
        ControlDefinition::new(F004, "Verifie actif = passif", Severite::Bloquant, f004),
        ControlDefinition::new(F005, "Verifie la presence des classes 1-7", Severite::Majeur, f005),
        ControlDefinition::new(F006, "Verifie la presence du capital social", Severite::Majeur, f006),
        ControlDefinition::new(F007, "Verifie la presence du compte de resultat", Severite::Mineur, f007),
        ControlDefinition::new(F008, "Verifie RAN vs resultat N-1", Severite::Majeur, f008),
        ControlDefinition::new(F009, "Verifie au moins 50 comptes", Severite::Mineur, f009),
        ControlDefinition::new(F010, "Signale les comptes a solde nul", Severite::Info, f010),
        ControlDefinition::new(F011, "Verifie le detail des comptes collectifs", Severite::Mineur, f011),
    ]
}

/// Result computed from management accounts: class 7 credit minus class 6 debit
pub(crate) fn resultat_calcule(balance: &[BalanceEntry]) -> (f64, f64, f64) {
    let produits: f64 = balance
        .lines_with_prefix("7")
        .map(|e| e.credit - e.debit)
        .sum();
    let charges: f64 = balance
        .lines_with_prefix("6")
        .map(|e| e.debit - e.credit)
        .sum();
    (produits - charges, produits, charges)
}

/// Movements-based credit balance of accounts under `prefix`
pub(crate) fn mouvement_crediteur(balance: &[BalanceEntry], prefix: &str) -> f64 {
    balance
        .lines_with_prefix(prefix)
        .map(|e| e.credit - e.debit)
        .sum()
}

fn f001(ctx: &AuditContext) -> Findings {
    let total_d = ctx.balance_n.total_debit();
    let total_c = ctx.balance_n.total_credit();
    let ecart = (total_d - total_c).abs();

    if ecart > ctx.config.tolerance {
        let date = ctx.evaluated_at.date_naive().to_string();
        let ecriture = if total_d > total_c {
            EcritureCorrective::new("OD", date).credit("471000", "Compte d'attente", ecart)
        } else {
            EcritureCorrective::new("OD", date).debit("471000", "Compte d'attente", ecart)
        };
        return one(
            F001.anomalie(Severite::Bloquant, format!("Desequilibre de {}", fmt_montant(ecart)))
                .with_details(
                    DetailsControle::new()
                        .ecart(ecart)
                        .montant("totalDebit", total_d)
                        .montant("totalCredit", total_c),
                )
                .with_suggestion("La somme des debits doit etre egale a la somme des credits")
                .with_ecriture(ecriture.commentaire("Ecriture d'equilibrage provisoire"))
                .with_reference_reglementaire("Art. 19 Acte Uniforme OHADA relatif au droit comptable"),
        );
    }
    one(F001.ok(format!(
        "Balance equilibree (D={}, C={})",
        fmt_montant(total_d),
        fmt_montant(total_c)
    )))
}

fn f002(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(F002.non_applicable("Balance N-1 absente"));
    };
    let total_d = n1.total_debit();
    let total_c = n1.total_credit();
    let ecart = (total_d - total_c).abs();

    if ecart > ctx.config.tolerance {
        return one(
            F002.anomalie(Severite::Bloquant, format!("Desequilibre N-1 de {}", fmt_montant(ecart)))
                .with_details(
                    DetailsControle::new()
                        .ecart(ecart)
                        .montant("totalDebitN1", total_d)
                        .montant("totalCreditN1", total_c),
                ),
        );
    }
    one(F002.ok("Balance N-1 equilibree"))
}

fn f003(ctx: &AuditContext) -> Findings {
    let (calcule, produits, charges) = resultat_calcule(&ctx.balance_n);

    if !ctx.balance_n.has_account_prefix("13") {
        return one(
            F003.anomalie(
                Severite::Mineur,
                format!("Resultat calcule: {} mais pas de compte 13x", fmt_montant(calcule)),
            )
            .with_details(DetailsControle::new().montant("resultatCalcule", calcule)),
        );
    }

    let comptabilise = mouvement_crediteur(&ctx.balance_n, "13");
    let ecart = (calcule - comptabilise).abs();
    if ecart > ctx.config.rounding_tolerance {
        return one(
            F003.anomalie(
                Severite::Bloquant,
                format!(
                    "Ecart de {} entre resultat calcule et compte 13x",
                    fmt_montant(ecart)
                ),
            )
            .with_details(
                DetailsControle::new()
                    .ecart(ecart)
                    .montant("resultatCalcule", calcule)
                    .montant("resultatComptabilise", comptabilise)
                    .montant("produits", produits)
                    .montant("charges", charges),
            )
            .with_suggestion("Le resultat (produits-charges) doit correspondre au solde du compte 13x")
            .with_reference_reglementaire("Art. 34 Acte Uniforme OHADA"),
        );
    }
    one(F003.ok(format!("Resultat coherent: {}", fmt_montant(calcule))))
}

fn f004(ctx: &AuditContext) -> Findings {
    let (actif, passif) = ctx
        .balance_n
        .iter()
        .filter(|e| matches!(e.classe(), Some(1..=5)))
        .map(|e| e.solde())
        .fold((0.0, 0.0), |(a, p), s| if s > 0.0 { (a + s, p) } else { (a, p - s) });
    let ecart = (actif - passif).abs();

    if ecart > ctx.config.rounding_tolerance {
        return one(
            F004.anomalie(
                Severite::Bloquant,
                format!(
                    "Desequilibre bilan: Actif={}, Passif={} (ecart: {})",
                    fmt_montant(actif),
                    fmt_montant(passif),
                    fmt_montant(ecart)
                ),
            )
            .with_details(
                DetailsControle::new()
                    .ecart(ecart)
                    .montant("totalActif", actif)
                    .montant("totalPassif", passif),
            )
            .with_suggestion("Le total de l'actif doit etre egal au total du passif")
            .with_reference_reglementaire("Art. 29 Acte Uniforme OHADA"),
        );
    }
    one(F004.ok(format!("Bilan equilibre: {}", fmt_montant(actif))))
}

fn f005(ctx: &AuditContext) -> Findings {
    let presentes: BTreeSet<u8> = ctx.balance_n.iter().filter_map(|e| e.classe()).collect();
    let manquantes: Vec<String> = CLASSES_ESSENTIELLES
        .iter()
        .filter(|c| !presentes.contains(c))
        .map(|c| c.to_string())
        .collect();

    if !manquantes.is_empty() {
        return one(
            F005.anomalie(Severite::Majeur, format!("Classes manquantes: {}", manquantes.join(", ")))
                .with_details(DetailsControle::new().comptes(manquantes))
                .with_suggestion("Une balance complete doit contenir les classes 1, 2, 4, 5, 6 et 7"),
        );
    }
    let liste: Vec<String> = presentes.iter().map(|c| c.to_string()).collect();
    one(F005.ok(format!(
        "Toutes les classes essentielles presentes ({})",
        liste.join(", ")
    )))
}

fn f006(ctx: &AuditContext) -> Findings {
    if !ctx.balance_n.has_account_prefix("101") {
        return one(
            F006.anomalie(Severite::Majeur, "Aucun compte de capital social (101x) trouve")
                .with_suggestion("Le capital social est obligatoire pour toute societe"),
        );
    }
    let montant = mouvement_crediteur(&ctx.balance_n, "101");
    one(F006.ok(format!("Capital social: {}", fmt_montant(montant))))
}

fn f007(ctx: &AuditContext) -> Findings {
    if !ctx.balance_n.has_account_prefix("13") {
        return one(
            F007.anomalie(Severite::Mineur, "Aucun compte de resultat (13x) trouve")
                .with_suggestion("Le resultat de l'exercice doit apparaitre dans la balance"),
        );
    }
    let montant = mouvement_crediteur(&ctx.balance_n, "13");
    one(F007.ok(format!("Resultat: {}", fmt_montant(montant))))
}

fn f008(ctx: &AuditContext) -> Findings {
    let Some(n1) = ctx.n1() else {
        return one(F008.non_applicable("Balance N-1 absente"));
    };
    let has_ran = ctx.balance_n.has_account_prefix("12");
    let has_resultat_n1 = n1.has_account_prefix("13");

    if !has_ran && has_resultat_n1 {
        return one(
            F008.anomalie(
                Severite::Majeur,
                "Pas de report a nouveau (12x) alors que la balance N-1 a un resultat",
            )
            .with_suggestion("Le resultat N-1 doit etre reporte au compte 12x en N"),
        );
    }
    if !has_ran {
        return one(F008.non_applicable("Pas de RAN ni de resultat N-1"));
    }

    let ran = mouvement_crediteur(&ctx.balance_n, "12");
    let resultat_n1 = mouvement_crediteur(n1, "13");
    let ecart = (ran - resultat_n1).abs();
    if ecart > ctx.config.rounding_tolerance {
        return one(
            F008.anomalie(
                Severite::Majeur,
                format!(
                    "Report a nouveau ({}) != Resultat N-1 ({})",
                    fmt_montant(ran),
                    fmt_montant(resultat_n1)
                ),
            )
            .with_details(
                DetailsControle::new()
                    .ecart(ecart)
                    .montant("reportANouveau", ran)
                    .montant("resultatN1", resultat_n1),
            )
            .with_suggestion("Le report a nouveau doit correspondre au resultat de l'exercice precedent"),
        );
    }
    one(F008.ok(format!("Report a nouveau coherent: {}", fmt_montant(ran))))
}

fn f009(ctx: &AuditContext) -> Findings {
    let count = ctx.balance_n.len();
    if count < MIN_COMPTES_COMPLETS {
        return one(
            F009.anomalie(
                Severite::Mineur,
                format!(
                    "Seulement {} comptes (une balance complete comporte generalement 50+)",
                    count
                ),
            )
            .with_details(DetailsControle::new().montant("nombreComptes", count as f64))
            .with_suggestion("Une balance trop courte peut indiquer un import partiel"),
        );
    }
    one(F009.ok(format!("{} comptes dans la balance", count)))
}

fn f010(ctx: &AuditContext) -> Findings {
    let nuls: Vec<&BalanceEntry> = ctx.balance_n.iter().filter(|e| e.is_zero()).collect();
    if nuls.is_empty() {
        return one(F010.ok("Aucun compte a solde nul"));
    }
    let pct = nuls.len() as f64 * 100.0 / ctx.balance_n.len() as f64;
    one(
        F010.anomalie(
            Severite::Info,
            format!("{} compte(s) a solde nul ({})", nuls.len(), fmt_pct(pct)),
        )
        .with_details(DetailsControle::new().comptes(nuls.iter().take(10).map(|e| e.code().to_string())))
        .with_suggestion("Les comptes a solde nul peuvent etre nettoyes"),
    )
}

fn f011(ctx: &AuditContext) -> Findings {
    let non_detailles: Vec<&str> = COMPTES_COLLECTIFS
        .iter()
        .copied()
        .filter(|prefix| {
            let exact = ctx.balance_n.iter().any(|e| e.code() == *prefix);
            let detail = ctx
                .balance_n
                .iter()
                .any(|e| e.has_prefix(prefix) && e.code().len() > prefix.len());
            exact && !detail
        })
        .collect();

    if !non_detailles.is_empty() {
        return one(
            F011.anomalie(
                Severite::Mineur,
                format!("Comptes collectifs non detailles: {}", non_detailles.join(", ")),
            )
            .with_details(DetailsControle::new().comptes(non_detailles.iter().map(|c| c.to_string())))
            .with_suggestion("Les comptes collectifs (401, 411) doivent etre ventiles en sous-comptes"),
        );
    }
    one(F011.ok("Comptes collectifs correctement detailles"))
}
