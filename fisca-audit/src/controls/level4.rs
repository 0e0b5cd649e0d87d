//! Level 4: consistency between related accounts
//!
//! Equality checks (`IC-026`, `IC-027`) report both operands with their
//! liasse labels and the signed gap `A - B`.

use super::helpers::{fmt_montant, fmt_pct, one, Findings};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, BalanceExt, DetailsControle, Niveau, ResultatControle, Severite};

const N: Niveau = Niveau::InterComptes;

const IC001: ControlMeta = ControlMeta::new("IC-001", "Amortissements <= valeur brute", N);
const IC002: ControlMeta = ControlMeta::new("IC-002", "Immobilisation sans amortissement", N);
const IC003: ControlMeta = ControlMeta::new("IC-003", "Amortissement sans immobilisation", N);
const IC005: ControlMeta = ControlMeta::new("IC-005", "Depreciations <= valeur brute", N);
const IC010: ControlMeta = ControlMeta::new("IC-010", "CA vs creances clients", N);
const IC011: ControlMeta = ControlMeta::new("IC-011", "Achats vs dettes fournisseurs", N);
const IC012: ControlMeta = ControlMeta::new("IC-012", "Interets vs emprunts", N);
const IC013: ControlMeta = ControlMeta::new("IC-013", "Dotations vs immobilisations", N);
const IC014: ControlMeta = ControlMeta::new("IC-014", "Impot vs resultat", N);
const IC015: ControlMeta = ControlMeta::new("IC-015", "TVA collectee vs CA", N);
const IC026: ControlMeta = ControlMeta::new("IC-026", "BZ = DZ", N);
const IC027: ControlMeta = ControlMeta::new("IC-027", "XI = CJ", N);

const PREFIXES_NON_BRUTS: &[&str] = &["28", "29"];

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(IC001, "Verifie amortissements 28x <= valeur brute 2x", Severite::Bloquant, ic001),
        ControlDefinition::new(IC002, "Detecte les immobilisations amortissables sans 28x", Severite::Mineur, ic002),
        ControlDefinition::new(IC003, "Detecte les amortissements orphelins", Severite::Majeur, ic003),
        ControlDefinition::new(IC005, "Verifie depreciations 29x/39x/49x <= valeur brute", Severite::Bloquant, ic005),
        ControlDefinition::new(IC010, "Verifie la presence de creances clients si CA", Severite::Info, ic010),
        ControlDefinition::new(IC011, "Verifie la presence de dettes fournisseurs si achats", Severite::Info, ic011),
        ControlDefinition::new(IC012, "Verifie la presence d'emprunts si charges financieres", Severite::Info, ic012),
        ControlDefinition::new(IC013, "Verifie les dotations aux amortissements", Severite::Mineur, ic013),
        ControlDefinition::new(IC014, "Verifie la presence de l'impot si benefice", Severite::Mineur, ic014),
        ControlDefinition::new(IC015, "Verifie le ratio TVA collectee / CA", Severite::Mineur, ic015),
        ControlDefinition::new(IC026, "Total actif (BZ) = total passif (DZ) selon le mapping", Severite::Majeur, ic026),
        ControlDefinition::new(IC027, "Resultat compte de resultat (XI) = resultat bilan (CJ)", Severite::Majeur, ic027),
    ]
}

/// Sum of absolute closing balances
fn abs_sum<'a>(lines: impl Iterator<Item = &'a BalanceEntry>) -> f64 {
    lines.map(|e| e.solde().abs()).sum()
}

/// Gross value of fixed assets under `prefix` (depreciation excluded)
fn valeur_brute(balance: &[BalanceEntry], prefix: &str) -> f64 {
    abs_sum(
        balance
            .iter()
            .filter(|e| e.has_prefix(prefix) && !e.has_any_prefix(PREFIXES_NON_BRUTS)),
    )
}

/// Equality check between two liasse amounts
fn controle_egalite(
    meta: &ControlMeta,
    (label_a, valeur_a): (&str, f64),
    (label_b, valeur_b): (&str, f64),
    tolerance: f64,
) -> ResultatControle {
    let ecart = valeur_a - valeur_b;
    let details = DetailsControle::new()
        .montant(label_a, valeur_a)
        .montant(label_b, valeur_b)
        .ecart(ecart);

    if ecart.abs() <= tolerance {
        return meta.ok(format!(
            "{} = {} ({})",
            label_a,
            label_b,
            fmt_montant(valeur_a)
        ));
    }
    meta.anomalie(
        Severite::Majeur,
        format!(
            "{} ({}) != {} ({}), ecart {}",
            label_a,
            fmt_montant(valeur_a),
            label_b,
            fmt_montant(valeur_b),
            fmt_montant(ecart)
        ),
    )
    .with_details(
        details
            .attendu(format!("{} = {}", label_a, label_b))
            .constate(format!("Ecart de {}", fmt_montant(ecart))),
    )
}

fn ic001(ctx: &AuditContext) -> Findings {
    let mut anomalies = Vec::new();
    let mut total_brut = 0.0;
    let mut total_amort = 0.0;
    for i in 0..=9 {
        let brut_prefix = format!("2{}", i);
        let amort_prefix = format!("28{}", i);
        let brut = valeur_brute(&ctx.balance_n, &brut_prefix);
        let amort = abs_sum(ctx.balance_n.lines_with_prefix(&amort_prefix));
        total_brut += brut;
        total_amort += amort;
        let has_brut = ctx
            .balance_n
            .iter()
            .any(|e| e.has_prefix(&brut_prefix) && !e.has_any_prefix(PREFIXES_NON_BRUTS));
        if has_brut && amort > 0.0 && amort > brut + ctx.config.rounding_tolerance {
            anomalies.push(format!(
                "Classe 2{}: Amort({}) > Brut({})",
                i,
                fmt_montant(amort),
                fmt_montant(brut)
            ));
        }
    }

    if anomalies.is_empty() {
        return one(IC001.ok("Amortissements coherents avec les valeurs brutes"));
    }
    one(
        IC001
            .anomalie(Severite::Bloquant, "Amortissements depassant la valeur brute")
            .with_details(
                DetailsControle::new()
                    .montant("totalValeurBrute", total_brut)
                    .montant("totalAmortissements", total_amort)
                    .montant("categoriesAnormales", anomalies.len() as f64)
                    .comptes(anomalies)
                    .attendu("Amortissements cumules (28x) <= valeur brute (2x) pour chaque categorie")
                    .impact_fiscal("Charges deduites en trop: resultat fiscal sous-estime"),
            )
            .with_suggestion("Solder les amortissements des immobilisations cedees et verifier les plans d'amortissement")
            .with_reference_reglementaire("Art. 45 Acte Uniforme OHADA - Amortissements"),
    )
}

fn ic002(ctx: &AuditContext) -> Findings {
    let sans_amort: Vec<String> = ["21", "23", "24"]
        .iter()
        .filter(|prefix| {
            ctx.balance_n
                .iter()
                .any(|e| e.has_prefix(prefix) && !e.has_any_prefix(PREFIXES_NON_BRUTS) && e.solde() > 0.0)
        })
        .filter_map(|prefix| {
            let amort_prefix = format!("28{}", &prefix[1..]);
            (!ctx.balance_n.has_account_prefix(&amort_prefix))
                .then(|| format!("{}x (pas d'amortissement {}x)", prefix, amort_prefix))
        })
        .collect();

    if sans_amort.is_empty() {
        return one(IC002.ok("Toutes les immobilisations ont des amortissements"));
    }
    one(
        IC002
            .anomalie(Severite::Mineur, "Immobilisations sans amortissement correspondant")
            .with_details(
                DetailsControle::new()
                    .montant("categoriesSansAmort", sans_amort.len() as f64)
                    .comptes(sans_amort),
            )
            .with_suggestion("Comptabiliser les dotations aux amortissements manquantes")
            .with_reference_reglementaire("Art. 44-46 Acte Uniforme OHADA - Amortissements obligatoires"),
    )
}

fn ic003(ctx: &AuditContext) -> Findings {
    let orphelins: Vec<String> = ctx
        .balance_n
        .lines_with_prefix("28")
        .filter(|a| a.solde().abs() > 0.0)
        .filter(|a| {
            // 2845 depreciates 245: the gross group keeps the third digit
            let Some(groupe) = a.code().get(2..3) else {
                return false;
            };
            let brut_prefix = format!("2{}", groupe);
            !ctx.balance_n
                .iter()
                .any(|e| e.has_prefix(&brut_prefix) && !e.has_any_prefix(PREFIXES_NON_BRUTS))
        })
        .map(|a| format!("{}: {}", a.code(), fmt_montant(a.solde().abs())))
        .collect();

    if orphelins.is_empty() {
        return one(IC003.ok("Tous les amortissements ont une immobilisation"));
    }
    one(
        IC003
            .anomalie(
                Severite::Majeur,
                format!("{} amortissement(s) sans immobilisation correspondante", orphelins.len()),
            )
            .with_details(
                DetailsControle::new()
                    .montant("amortissementsOrphelins", orphelins.len() as f64)
                    .comptes(orphelins.into_iter().take(10)),
            )
            .with_suggestion("Solder les amortissements orphelins ou passer l'ecriture de sortie d'immobilisation")
            .with_reference_reglementaire("Art. 45 Acte Uniforme OHADA"),
    )
}

fn ic005(ctx: &AuditContext) -> Findings {
    const CONTROLES: [(&str, &str, &str); 3] = [
        ("29", "2", "Immobilisations"),
        ("39", "3", "Stocks"),
        ("49", "4", "Tiers"),
    ];
    let exclus = ["28", "29", "39", "49"];
    let problemes: Vec<String> = CONTROLES
        .iter()
        .filter_map(|(deprec, brut, label)| {
            let val_brut = abs_sum(
                ctx.balance_n
                    .iter()
                    .filter(|e| e.has_prefix(brut) && !e.has_any_prefix(&exclus)),
            );
            let val_deprec = abs_sum(ctx.balance_n.lines_with_prefix(deprec));
            (val_brut > 0.0 && val_deprec > val_brut + ctx.config.rounding_tolerance).then(|| {
                format!(
                    "{}: Deprec({}) > Brut({})",
                    label,
                    fmt_montant(val_deprec),
                    fmt_montant(val_brut)
                )
            })
        })
        .collect();

    if problemes.is_empty() {
        return one(IC005.ok("Depreciations coherentes"));
    }
    one(
        IC005
            .anomalie(Severite::Bloquant, "Depreciations depassant la valeur brute")
            .with_details(
                DetailsControle::new()
                    .montant("categoriesAnormales", problemes.len() as f64)
                    .comptes(problemes),
            )
            .with_suggestion("Solder les depreciations des actifs sortis et verifier les taux appliques")
            .with_reference_reglementaire("Art. 46 Acte Uniforme OHADA - Depreciations"),
    )
}

/// `INFO` when an activity amount exists without its counterpart accounts
fn controle_contrepartie(
    meta: &ControlMeta,
    balance: &[BalanceEntry],
    activite: (&[&str], &str),
    contrepartie: (&str, &str),
    suggestion: &str,
) -> ResultatControle {
    let (prefixes, label) = activite;
    let montant = abs_sum(balance.iter().filter(|e| e.has_any_prefix(prefixes)));
    let contre = abs_sum(balance.lines_with_prefix(contrepartie.0));
    if montant > 0.0 && contre == 0.0 {
        return meta
            .anomalie(
                Severite::Info,
                format!(
                    "{} de {} sans {} ({}x)",
                    label,
                    fmt_montant(montant),
                    contrepartie.1,
                    contrepartie.0
                ),
            )
            .with_details(DetailsControle::new().montant(label, montant))
            .with_suggestion(suggestion);
    }
    meta.ok(format!("{} et {} coherents", label, contrepartie.1))
}

fn ic010(ctx: &AuditContext) -> Findings {
    one(controle_contrepartie(
        &IC010,
        &ctx.balance_n,
        (&["70"], "CA"),
        ("411", "creances clients"),
        "Verifier si l'activite est exclusivement au comptant",
    ))
}

fn ic011(ctx: &AuditContext) -> Findings {
    one(controle_contrepartie(
        &IC011,
        &ctx.balance_n,
        (&["601", "602"], "Achats"),
        ("401", "dettes fournisseurs"),
        "Verifier la completude des dettes fournisseurs (factures non parvenues)",
    ))
}

fn ic012(ctx: &AuditContext) -> Findings {
    one(controle_contrepartie(
        &IC012,
        &ctx.balance_n,
        (&["67"], "Charges financieres"),
        ("16", "emprunts"),
        "Verifier l'origine des charges financieres (decouverts, comptes courants, emprunts rembourses)",
    ))
}

fn ic013(ctx: &AuditContext) -> Findings {
    let dotations = abs_sum(
        ctx.balance_n
            .iter()
            .filter(|e| e.has_any_prefix(&["681", "682"])),
    );
    let immob: f64 = ctx
        .balance_n
        .iter()
        .filter(|e| e.has_prefix("2") && !e.has_any_prefix(PREFIXES_NON_BRUTS))
        .map(|e| e.solde().max(0.0))
        .sum();

    if immob > 0.0 && dotations == 0.0 {
        return one(
            IC013
                .anomalie(
                    Severite::Mineur,
                    format!("Immobilisations ({}) sans dotations (681/682)", fmt_montant(immob)),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("immobilisations", immob)
                        .montant("dotations", 0.0),
                )
                .with_suggestion("Comptabiliser les dotations aux amortissements de l'exercice")
                .with_reference_reglementaire("Art. 44-46 Acte Uniforme OHADA - Amortissements obligatoires"),
        );
    }
    if immob > 0.0 && dotations > immob * 0.5 {
        return one(
            IC013
                .anomalie(
                    Severite::Info,
                    format!(
                        "Dotations ({}) > 50% des immobilisations ({})",
                        fmt_montant(dotations),
                        fmt_montant(immob)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("immobilisations", immob)
                        .montant("dotations", dotations),
                )
                .with_suggestion("Verifier les durees et taux d'amortissement appliques"),
        );
    }
    one(IC013.ok("Dotations et immobilisations coherentes"))
}

fn ic014(ctx: &AuditContext) -> Findings {
    let resultat = ctx.balance_n.solde_crediteur(&["13"]);
    let impot = abs_sum(ctx.balance_n.lines_with_prefix("89"));
    if resultat > 0.0 && impot == 0.0 {
        return one(
            IC014
                .anomalie(
                    Severite::Mineur,
                    format!("Resultat beneficiaire ({}) sans impot (89x)", fmt_montant(resultat)),
                )
                .with_details(DetailsControle::new().montant("resultat", resultat))
                .with_suggestion("Calculer et comptabiliser l'impot sur les societes ou le minimum forfaitaire")
                .with_reference_reglementaire("CGI - Impot sur les societes"),
        );
    }
    one(IC014.ok("Coherence resultat / impot"))
}

fn ic015(ctx: &AuditContext) -> Findings {
    let ca = abs_sum(ctx.balance_n.lines_with_prefix("70"));
    let tva = abs_sum(ctx.balance_n.lines_with_prefix("443"));
    if ca > 0.0 && tva == 0.0 {
        return one(
            IC015
                .anomalie(Severite::Mineur, format!("CA de {} sans TVA collectee (443x)", fmt_montant(ca)))
                .with_details(
                    DetailsControle::new()
                        .montant("ca", ca)
                        .montant("tvaCollectee", 0.0),
                )
                .with_suggestion("Verifier le regime de TVA applicable et comptabiliser la TVA collectee")
                .with_reference_reglementaire("CGI - Regime de TVA"),
        );
    }
    if ca > 0.0 {
        let ratio = tva * 100.0 / ca;
        if !(10.0..=25.0).contains(&ratio) {
            return one(
                IC015
                    .anomalie(Severite::Info, format!("Ratio TVA/CA atypique: {}", fmt_pct(ratio)))
                    .with_details(
                        DetailsControle::new()
                            .montant("ca", ca)
                            .montant("tvaCollectee", tva)
                            .montant("ratioPct", ratio.round()),
                    )
                    .with_suggestion("Verifier le taux de TVA applique et les operations exonerees")
                    .with_reference_reglementaire("CGI - Taux de TVA"),
            );
        }
    }
    one(IC015.ok("TVA collectee coherente avec le CA"))
}

fn ic026(ctx: &AuditContext) -> Findings {
    if ctx.mapping.is_empty() {
        return one(IC026.non_applicable("Mapping SYSCOHADA non charge"));
    }
    let totaux = ctx.mapping.totaux_bilan(&ctx.balance_n);
    let mut finding = controle_egalite(
        &IC026,
        ("Total Actif (BZ)", totaux.actif),
        ("Total Passif (DZ)", totaux.passif),
        ctx.config.rounding_tolerance,
    );
    if let (Some(resultat), Some(details)) = (totaux.resultat_integre, finding.details.as_mut()) {
        details.description = Some(format!(
            "Resultat du compte de resultat ({}) integre au passif: pas de compte 13x",
            fmt_montant(resultat)
        ));
    }
    one(finding)
}

fn ic027(ctx: &AuditContext) -> Findings {
    if ctx.mapping.is_empty() {
        return one(IC027.non_applicable("Mapping SYSCOHADA non charge"));
    }
    if !ctx.balance_n.has_account_prefix("13") {
        return one(IC027.non_applicable("Pas de compte de resultat 13x (balance avant affectation)"));
    }
    let resultat_cdr = ctx.mapping.resultat_compte_resultat(&ctx.balance_n);
    let resultat_bilan = ctx.balance_n.solde_crediteur(&["13"]);
    one(controle_egalite(
        &IC027,
        ("Resultat CdR (XI)", resultat_cdr),
        ("Resultat Bilan (CJ)", resultat_bilan),
        ctx.config.rounding_tolerance,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatutControle;

    fn ctx(lines: Vec<BalanceEntry>) -> AuditContext {
        AuditContext::builder(lines).exercice("2024").build()
    }

    fn solde(compte: &str, solde: f64) -> BalanceEntry {
        BalanceEntry::new(compte, "", 0.0, 0.0, solde.max(0.0), (-solde).max(0.0))
    }

    #[test]
    fn test_depreciation_above_gross_is_blocking() {
        let lines = vec![solde("245000", 1000.0), solde("284500", -1200.0)];
        assert!(ic001(&ctx(lines)).unwrap()[0].is_bloquant());
        let lines = vec![solde("245000", 1000.0), solde("284500", -800.0)];
        assert!(ic001(&ctx(lines)).unwrap()[0].is_ok());
    }

    #[test]
    fn test_orphan_depreciation() {
        let f = &ic003(&ctx(vec![solde("284500", -300.0)])).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
        assert!(ic003(&ctx(vec![solde("241000", 500.0), solde("284100", -300.0)])).unwrap()[0].is_ok());
    }

    #[test]
    fn test_profit_without_tax() {
        let f = &ic014(&ctx(vec![solde("131000", -500.0)])).unwrap()[0];
        assert_eq!(f.severite, Severite::Mineur);
        assert!(ic014(&ctx(vec![solde("131000", -500.0), solde("891000", 100.0)])).unwrap()[0].is_ok());
    }

    #[test]
    fn test_vat_ratio() {
        assert_eq!(ic015(&ctx(vec![solde("701000", -1000.0)])).unwrap()[0].severite, Severite::Mineur);
        let f = &ic015(&ctx(vec![solde("701000", -1000.0), solde("443100", -50.0)])).unwrap()[0];
        assert_eq!(f.severite, Severite::Info);
        assert!(ic015(&ctx(vec![solde("701000", -1000.0), solde("443100", -180.0)])).unwrap()[0].is_ok());
    }

    #[test]
    fn test_balance_sheet_equality_reports_both_operands() {
        let lines = vec![solde("101000", -1000.0), solde("521000", 1500.0)];
        let f = &ic026(&ctx(lines)).unwrap()[0];
        assert_eq!(f.severite, Severite::Majeur);
        let details = f.details.as_ref().unwrap();
        assert_eq!(details.montants["Total Actif (BZ)"], 1500.0);
        assert_eq!(details.montants["Total Passif (DZ)"], 1000.0);
        assert_eq!(details.ecart, Some(500.0));
    }

    #[test]
    fn test_result_equality_requires_result_account() {
        let f = &ic027(&ctx(vec![solde("701000", -100.0)])).unwrap()[0];
        assert_eq!(f.statut, StatutControle::NonApplicable);

        let lines = vec![solde("701000", -100.0), solde("601000", 60.0), solde("131000", -40.0)];
        assert!(ic027(&ctx(lines)).unwrap()[0].is_ok());
    }
}
