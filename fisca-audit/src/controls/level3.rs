//! Level 3: balance direction and amount plausibility
//!
//! `SS-` controls check that each group carries its normal balance side,
//! `MA-` controls flag implausible amounts.

use super::helpers::{comptes_sens_inverse, controle_sens, fmt_montant, fmt_pct, one, Findings, SensAttendu};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, BalanceExt, DetailsControle, EcritureCorrective, Niveau, Severite};

const N: Niveau = Niveau::SensMontants;

const SS001: ControlMeta = ControlMeta::new("SS-001", "Sens immobilisations", N);
const SS002: ControlMeta = ControlMeta::new("SS-002", "Sens stocks", N);
const SS003: ControlMeta = ControlMeta::new("SS-003", "Sens charges", N);
const SS004: ControlMeta = ControlMeta::new("SS-004", "Sens produits", N);
const SS005: ControlMeta = ControlMeta::new("SS-005", "Clients crediteurs", N);
const SS006: ControlMeta = ControlMeta::new("SS-006", "Fournisseurs debiteurs", N);
const SS007: ControlMeta = ControlMeta::new("SS-007", "Banques creditrices", N);
const SS008: ControlMeta = ControlMeta::new("SS-008", "Sens amortissements", N);
const SS009: ControlMeta = ControlMeta::new("SS-009", "Sens provisions", N);
const SS010: ControlMeta = ControlMeta::new("SS-010", "Capital negatif", N);
const MA001: ControlMeta = ControlMeta::new("MA-001", "Concentration montants", N);
const MA002: ControlMeta = ControlMeta::new("MA-002", "Centimes suspects", N);
const MA003: ControlMeta = ControlMeta::new("MA-003", "Montants negatifs", N);
const MA004: ControlMeta = ControlMeta::new("MA-004", "Deficit vs capital", N);
const MA005: ControlMeta = ControlMeta::new("MA-005", "Capitaux propres negatifs", N);
const MA006: ControlMeta = ControlMeta::new("MA-006", "Tresorerie nette", N);

const PREFIXES_CAPITAUX_PROPRES: &[&str] = &["10", "11", "12", "13", "14"];

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(SS001, "Verifie le sens debiteur des immobilisations", Severite::Mineur, ss001),
        ControlDefinition::new(SS002, "Verifie le sens debiteur des stocks", Severite::Mineur, ss002),
        ControlDefinition::new(SS003, "Verifie le sens debiteur des charges", Severite::Mineur, ss003),
        ControlDefinition::new(SS004, "Verifie le sens crediteur des produits", Severite::Mineur, ss004),
        ControlDefinition::new(SS005, "Detecte les clients a solde crediteur", Severite::Mineur, ss005),
        ControlDefinition::new(SS006, "Detecte les fournisseurs a solde debiteur", Severite::Mineur, ss006),
        ControlDefinition::new(SS007, "Detecte les banques a solde crediteur", Severite::Mineur, ss007),
        ControlDefinition::new(SS008, "Verifie le sens crediteur des amortissements", Severite::Mineur, ss008),
        ControlDefinition::new(SS009, "Verifie le sens crediteur des provisions", Severite::Mineur, ss009),
        ControlDefinition::new(SS010, "Detecte un capital social negatif", Severite::Majeur, ss010),
        ControlDefinition::new(MA001, "Detecte les comptes > 50% du bilan", Severite::Mineur, ma001),
        ControlDefinition::new(MA002, "Detecte les montants en .01 ou .99", Severite::Info, ma002),
        ControlDefinition::new(MA003, "Detecte les montants negatifs en D/C", Severite::Mineur, ma003),
        ControlDefinition::new(MA004, "Verifie deficit < 50% capital", Severite::Info, ma004),
        ControlDefinition::new(MA005, "Detecte des capitaux propres negatifs", Severite::Majeur, ma005),
        ControlDefinition::new(MA006, "Verifie la tresorerie nette", Severite::Info, ma006),
    ]
}

/// Total assets: debit balances of classes 1-5
pub(crate) fn total_actif_brut(balance: &[BalanceEntry]) -> f64 {
    balance
        .iter()
        .filter(|e| matches!(e.classe(), Some(1..=5)))
        .map(|e| e.solde().max(0.0))
        .sum()
}

fn ss001(ctx: &AuditContext) -> Findings {
    let tol = ctx.config.rounding_tolerance;
    one(controle_sens(&SS001, &ctx.balance_n, "2", &["28", "29"], SensAttendu::Debiteur, tol, "Immobilisations"))
}

fn ss002(ctx: &AuditContext) -> Findings {
    let tol = ctx.config.rounding_tolerance;
    one(controle_sens(&SS002, &ctx.balance_n, "3", &["39"], SensAttendu::Debiteur, tol, "Stocks"))
}

fn ss003(ctx: &AuditContext) -> Findings {
    // 603 (variation des stocks) carries either side
    let tol = ctx.config.rounding_tolerance;
    one(controle_sens(&SS003, &ctx.balance_n, "6", &["603"], SensAttendu::Debiteur, tol, "Charges"))
}

fn ss004(ctx: &AuditContext) -> Findings {
    // 73 (production stockee) carries either side
    let tol = ctx.config.rounding_tolerance;
    one(controle_sens(&SS004, &ctx.balance_n, "7", &["73"], SensAttendu::Crediteur, tol, "Produits"))
}

fn ss008(ctx: &AuditContext) -> Findings {
    let tol = ctx.config.rounding_tolerance;
    one(controle_sens(&SS008, &ctx.balance_n, "28", &[], SensAttendu::Crediteur, tol, "Amortissements"))
}

/// Accounts under `prefix` on the wrong side, with the total to reclassify
fn a_reclasser(ctx: &AuditContext, prefix: &str, sens: SensAttendu) -> (Vec<String>, f64) {
    let inverses = comptes_sens_inverse(&ctx.balance_n, prefix, &[], sens, ctx.config.rounding_tolerance);
    let montant = inverses.iter().map(|e| e.solde().abs()).sum();
    let comptes = inverses
        .iter()
        .map(|e| format!("{}: {}", e.code(), fmt_montant(e.solde())))
        .collect();
    (comptes, montant)
}

fn ss005(ctx: &AuditContext) -> Findings {
    let (crediteurs, montant) = a_reclasser(ctx, "411", SensAttendu::Debiteur);
    if crediteurs.is_empty() {
        return one(SS005.ok("Tous les clients sont debiteurs"));
    }
    let ecriture = EcritureCorrective::new("OD", ctx.evaluated_at.date_naive().to_string())
        .debit("411000", "Clients - reclassement", montant)
        .credit("419000", "Clients crediteurs (passif)", montant)
        .commentaire("Reclassement clients crediteurs au passif");
    one(
        SS005
            .anomalie(
                Severite::Mineur,
                format!("{} client(s) crediteur(s) pour {}", crediteurs.len(), fmt_montant(montant)),
            )
            .with_details(
                DetailsControle::new()
                    .comptes(crediteurs)
                    .montant("montantReclassement", montant),
            )
            .with_suggestion("Reclasser au passif (avances recues) ou verifier les avoirs non imputes")
            .with_ecriture(ecriture),
    )
}

fn ss006(ctx: &AuditContext) -> Findings {
    let (debiteurs, montant) = a_reclasser(ctx, "401", SensAttendu::Crediteur);
    if debiteurs.is_empty() {
        return one(SS006.ok("Tous les fournisseurs sont crediteurs"));
    }
    let ecriture = EcritureCorrective::new("OD", ctx.evaluated_at.date_naive().to_string())
        .debit("409000", "Fournisseurs debiteurs (actif)", montant)
        .credit("401000", "Fournisseurs - reclassement", montant)
        .commentaire("Reclassement fournisseurs debiteurs a l'actif");
    one(
        SS006
            .anomalie(
                Severite::Mineur,
                format!("{} fournisseur(s) debiteur(s) pour {}", debiteurs.len(), fmt_montant(montant)),
            )
            .with_details(
                DetailsControle::new()
                    .comptes(debiteurs)
                    .montant("montantReclassement", montant),
            )
            .with_suggestion("Reclasser a l'actif (avances versees) ou verifier les avoirs")
            .with_ecriture(ecriture),
    )
}

fn ss007(ctx: &AuditContext) -> Findings {
    let (creditrices, montant) = a_reclasser(ctx, "52", SensAttendu::Debiteur);
    if creditrices.is_empty() {
        return one(SS007.ok("Toutes les banques sont debitrices"));
    }
    one(
        SS007
            .anomalie(
                Severite::Mineur,
                format!(
                    "{} banque(s) creditrice(s) pour {} (decouvert)",
                    creditrices.len(),
                    fmt_montant(montant)
                ),
            )
            .with_details(
                DetailsControle::new()
                    .comptes(creditrices)
                    .montant("montantReclassement", montant),
            )
            .with_suggestion("Reclasser en tresorerie-passif (concours bancaires)"),
    )
}

fn ss009(ctx: &AuditContext) -> Findings {
    let tol = ctx.config.rounding_tolerance;
    let inverses: Vec<String> = ["29", "39", "49"]
        .iter()
        .flat_map(|p| comptes_sens_inverse(&ctx.balance_n, p, &[], SensAttendu::Crediteur, tol))
        .map(|e| format!("{}: {}", e.code(), fmt_montant(e.solde())))
        .collect();

    if inverses.is_empty() {
        return one(SS009.ok("Toutes les provisions ont un sens normal"));
    }
    one(
        SS009
            .anomalie(Severite::Mineur, format!("{} provision(s) a sens inverse", inverses.len()))
            .with_details(DetailsControle::new().comptes(inverses.into_iter().take(10))),
    )
}

fn ss010(ctx: &AuditContext) -> Findings {
    let capital = ctx.balance_n.solde_crediteur(&["101"]);
    if capital < 0.0 {
        return one(
            SS010
                .anomalie(Severite::Majeur, format!("Capital social negatif: {}", fmt_montant(capital)))
                .with_details(DetailsControle::new().montant("capitalSocial", capital))
                .with_suggestion("Un capital negatif est anormal et doit etre corrige"),
        );
    }
    one(SS010.ok(format!("Capital social positif: {}", fmt_montant(capital))))
}

fn ma001(ctx: &AuditContext) -> Findings {
    let total = total_actif_brut(&ctx.balance_n);
    if total == 0.0 {
        return one(MA001.ok("Bilan nul"));
    }
    let concentres: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| matches!(e.classe(), Some(1..=5)) && e.solde().abs() > total * 0.5)
        .map(|e| {
            let montant = e.solde().abs();
            format!("{}: {} ({})", e.code(), fmt_montant(montant), fmt_pct(montant * 100.0 / total))
        })
        .collect();

    if concentres.is_empty() {
        return one(MA001.ok("Pas de concentration excessive"));
    }
    one(
        MA001
            .anomalie(
                Severite::Mineur,
                format!("{} compte(s) representant plus de 50% du total bilan", concentres.len()),
            )
            .with_details(DetailsControle::new().comptes(concentres).montant("totalBilan", total))
            .with_suggestion("Forte concentration - verifier la repartition des postes"),
    )
}

fn ma002(ctx: &AuditContext) -> Findings {
    let suspects: Vec<String> = ctx
        .balance_n
        .iter()
        .flat_map(|e| [e.debit, e.credit].into_iter().map(move |m| (e, m)))
        .filter(|(_, m)| *m > 0.0)
        .filter(|(_, m)| {
            let cents = ((m % 1.0) * 100.0).round() as i64;
            cents == 1 || cents == 99
        })
        .map(|(e, m)| format!("{}: {}", e.code(), fmt_montant(m)))
        .collect();

    if suspects.len() > 3 {
        return one(
            MA002
                .anomalie(
                    Severite::Info,
                    format!("{} montant(s) avec centimes suspects (.01 ou .99)", suspects.len()),
                )
                .with_details(DetailsControle::new().comptes(suspects.into_iter().take(10)))
                .with_suggestion("Montants en .01 ou .99 peuvent indiquer des erreurs d'arrondi"),
        );
    }
    one(MA002.ok("Pas de centimes suspects"))
}

fn ma003(ctx: &AuditContext) -> Findings {
    let negatifs: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| e.debit < 0.0 || e.credit < 0.0)
        .map(|e| format!("{}: D={}, C={}", e.code(), fmt_montant(e.debit), fmt_montant(e.credit)))
        .collect();

    if negatifs.is_empty() {
        return one(MA003.ok("Aucun montant negatif"));
    }
    one(
        MA003
            .anomalie(
                Severite::Mineur,
                format!("{} ligne(s) avec montants negatifs en debit/credit", negatifs.len()),
            )
            .with_details(DetailsControle::new().comptes(negatifs.into_iter().take(10)))
            .with_suggestion("Les montants en debit et credit doivent etre positifs (utiliser le sens oppose)"),
    )
}

fn ma004(ctx: &AuditContext) -> Findings {
    let capital = ctx.balance_n.solde_crediteur(&["101"]);
    let resultat = ctx.balance_n.solde_crediteur(&["13"]);
    if capital > 0.0 && resultat < 0.0 && resultat.abs() > capital * 0.5 {
        return one(
            MA004
                .anomalie(
                    Severite::Info,
                    format!(
                        "Deficit ({}) depasse 50% du capital ({})",
                        fmt_montant(resultat),
                        fmt_montant(capital)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("resultat", resultat)
                        .montant("capital", capital)
                        .montant("ratio", resultat.abs() * 100.0 / capital),
                )
                .with_suggestion("Un deficit important peut signaler une situation de continuite d'exploitation delicate"),
        );
    }
    one(MA004.ok("Deficit dans les limites acceptables"))
}

fn ma005(ctx: &AuditContext) -> Findings {
    let capitaux_propres = ctx.balance_n.solde_crediteur(PREFIXES_CAPITAUX_PROPRES);
    if capitaux_propres < 0.0 {
        return one(
            MA005
                .anomalie(
                    Severite::Majeur,
                    format!("Capitaux propres negatifs: {}", fmt_montant(capitaux_propres)),
                )
                .with_details(DetailsControle::new().montant("capitauxPropres", capitaux_propres))
                .with_suggestion("Situation d'alerte - obligation legale de regulariser sous 2 ans")
                .with_reference_reglementaire("Art. 664 AUSCGIE"),
        );
    }
    one(MA005.ok(format!("Capitaux propres positifs: {}", fmt_montant(capitaux_propres))))
}

fn ma006(ctx: &AuditContext) -> Findings {
    let (treso_actif, treso_passif) = ctx
        .balance_n
        .lines_with_prefix("5")
        .map(|e| e.solde())
        .fold((0.0, 0.0), |(a, p), s| (a + s.max(0.0), p + (-s).max(0.0)));
    let treso_nette = treso_actif - treso_passif;
    let total = total_actif_brut(&ctx.balance_n);

    if total > 0.0 && treso_nette < 0.0 && treso_nette.abs() > total * 0.3 {
        return one(
            MA006
                .anomalie(
                    Severite::Info,
                    format!(
                        "Tresorerie nette tres negative: {} ({} du bilan)",
                        fmt_montant(treso_nette),
                        fmt_pct(treso_nette.abs() * 100.0 / total)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("tresoNette", treso_nette)
                        .montant("tresoActif", treso_actif)
                        .montant("tresoPassif", treso_passif),
                )
                .with_suggestion("Risque de tension de tresorerie importante"),
        );
    }
    one(MA006.ok(format!("Tresorerie nette: {}", fmt_montant(treso_nette))))
}
