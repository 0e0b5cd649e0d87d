//! Level 7: fiscal controls (Phase 3)
//!
//! Rates and ceilings come from `AuditConfig::fiscal`. Reintegrations are
//! proposed as single-line memo entries in the `FISCAL` journal; they feed
//! the tax return reconciliation, not the ledger.

use super::helpers::{fmt_montant, fmt_pct, one, Findings};
use super::level1::mouvement_crediteur;
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, BalanceExt, DetailsControle, EcritureCorrective, Niveau, Severite};

const N: Niveau = Niveau::Fiscal;

const FI001: ControlMeta = ControlMeta::new("FI-001", "Resultat fiscal", N);
const FI002: ControlMeta = ControlMeta::new("FI-002", "Amort. vehicules tourisme", N);
const FI003: ControlMeta = ControlMeta::new("FI-003", "Charges somptuaires", N);
const FI004: ControlMeta = ControlMeta::new("FI-004", "Amendes et penalites", N);
const FI005: ControlMeta = ControlMeta::new("FI-005", "Dons et liberalites", N);
const FI006: ControlMeta = ControlMeta::new("FI-006", "Provisions non deductibles", N);
const FI007: ControlMeta = ControlMeta::new("FI-007", "IS calcule vs comptabilise", N);
const FI008: ControlMeta = ControlMeta::new("FI-008", "Minimum forfaitaire (IMF)", N);
const FI009: ControlMeta = ControlMeta::new("FI-009", "TVA a reverser", N);
const FI015: ControlMeta = ControlMeta::new("FI-015", "Taux effectif d'imposition", N);

const JOURNAL_FISCAL: &str = "FISCAL";
const COMPTE_REINTEGRATION: &str = "REINTEG";
/// Depreciation rate applied to the vehicle value above the ceiling
const TAUX_AMORT_VEHICULES: f64 = 0.20;
const PLAFOND_RECEPTIONS_CA: f64 = 0.01;
const PLAFOND_DONS_CA: f64 = 0.001;
/// Relative gap between booked and estimated tax before it is reported
const ECART_IS_TOLERE: f64 = 0.3;

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(FI001, "Verifie le resultat fiscal", Severite::Info, fi001),
        ControlDefinition::new(FI002, "Plafond amortissement vehicules", Severite::Mineur, fi002),
        ControlDefinition::new(FI003, "Detecte les charges somptuaires", Severite::Mineur, fi003),
        ControlDefinition::new(FI004, "Signale les charges non deductibles", Severite::Mineur, fi004),
        ControlDefinition::new(FI005, "Plafond de deductibilite des dons", Severite::Mineur, fi005),
        ControlDefinition::new(FI006, "Verifie la deductibilite des provisions", Severite::Mineur, fi006),
        ControlDefinition::new(FI007, "Coherence de l'impot sur les societes", Severite::Majeur, fi007),
        ControlDefinition::new(FI008, "IS superieur ou egal a l'IMF", Severite::Mineur, fi008),
        ControlDefinition::new(FI009, "Coherence TVA collectee/deductible/due", Severite::Mineur, fi009),
        ControlDefinition::new(FI015, "Analyse du taux effectif d'IS", Severite::Info, fi015),
    ]
}

fn abs_sum<'a>(lines: impl Iterator<Item = &'a BalanceEntry>) -> f64 {
    lines.map(|e| e.solde().abs()).sum()
}

fn chiffre_affaires(balance: &[BalanceEntry]) -> f64 {
    balance.solde_crediteur(&["70"])
}

fn impot_comptabilise(balance: &[BalanceEntry]) -> f64 {
    balance.solde_prefixes(&["89"])
}

fn reintegration(ctx: &AuditContext, libelle: &str, montant: f64, commentaire: &str) -> EcritureCorrective {
    EcritureCorrective::new(JOURNAL_FISCAL, ctx.evaluated_at.date_naive().to_string())
        .debit(COMPTE_REINTEGRATION, libelle, montant)
        .commentaire(commentaire)
}

fn fi001(ctx: &AuditContext) -> Findings {
    let resultat = mouvement_crediteur(&ctx.balance_n, "13");
    if resultat < 0.0 {
        return one(
            FI001
                .anomalie(Severite::Info, format!("Resultat deficitaire: {}", fmt_montant(resultat)))
                .with_details(
                    DetailsControle::new()
                        .montant("resultatNet", resultat)
                        .attendu("Resultat beneficiaire ou deficit justifie")
                        .constate(format!("Resultat deficitaire de {} FCFA", fmt_montant(resultat)))
                        .impact_fiscal("Deficit reportable sur 5 exercices. IMF reste du meme si deficit."),
                )
                .with_suggestion("Constituer le dossier de report deficitaire et s'assurer du paiement de l'IMF")
                .with_reference_reglementaire("Art. 7 CGI - Report deficitaire sur 5 exercices"),
        );
    }
    one(FI001.ok(format!("Resultat: {}", fmt_montant(resultat))))
}

fn fi002(ctx: &AuditContext) -> Findings {
    let plafond = ctx.config.fiscal.plafond_vehicules;
    let valeur = abs_sum(ctx.balance_n.lines_with_prefix("245"));
    if valeur <= plafond {
        return one(FI002.ok("Vehicules de tourisme dans les limites"));
    }

    let exces = valeur - plafond;
    let a_reintegrer = (exces * TAUX_AMORT_VEHICULES).round();
    one(
        FI002
            .anomalie(
                Severite::Mineur,
                format!(
                    "Vehicules de tourisme: {} (plafond fiscal: {})",
                    fmt_montant(valeur),
                    fmt_montant(plafond)
                ),
            )
            .with_details(
                DetailsControle::new()
                    .montant("valeurVehicules", valeur)
                    .montant("plafond", plafond)
                    .montant("excesAReintegrer", exces)
                    .attendu(format!("Valeur vehicules de tourisme <= {} FCFA", fmt_montant(plafond)))
                    .constate(format!("Valeur: {}, exces: {}", fmt_montant(valeur), fmt_montant(exces)))
                    .impact_fiscal(format!(
                        "Reintegration estimee de {} FCFA (amortissement sur base excedentaire)",
                        fmt_montant(a_reintegrer)
                    )),
            )
            .with_suggestion(format!(
                "Reintegrer la fraction d'amortissement calculee sur l'exces de {} FCFA",
                fmt_montant(exces)
            ))
            .with_ecriture(reintegration(
                ctx,
                "Reintegration amort. vehicules au-dela du plafond",
                a_reintegrer,
                "Reintegration fiscale estimee (taux 20% sur base excedentaire)",
            ))
            .with_reference_reglementaire("Art. 8-1 CGI CEMAC - Plafond amortissement vehicules tourisme"),
    )
}

fn fi003(ctx: &AuditContext) -> Findings {
    let receptions = abs_sum(ctx.balance_n.lines_with_prefix("627"));
    let ca = chiffre_affaires(&ctx.balance_n);
    let plafond = ca * PLAFOND_RECEPTIONS_CA;

    if ca > 0.0 && receptions > plafond {
        let ratio = receptions * 100.0 / ca;
        let excedent = receptions - plafond;
        return one(
            FI003
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "Receptions et cadeaux ({}) > 1% du CA ({})",
                        fmt_montant(receptions),
                        fmt_montant(ca)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("receptions", receptions)
                        .montant("ca", ca)
                        .montant("ratioPct", (ratio * 10.0).round() / 10.0)
                        .montant("excedentAReintegrer", excedent)
                        .attendu("Charges de receptions et cadeaux < 1% du CA")
                        .constate(format!("Ratio: {}, excedent: {}", fmt_pct(ratio), fmt_montant(excedent)))
                        .impact_fiscal(format!(
                            "Reintegration de {} FCFA dans le resultat fiscal",
                            fmt_montant(excedent)
                        )),
                )
                .with_suggestion("Reintegrer l'excedent dans le tableau de passage au resultat fiscal")
                .with_ecriture(reintegration(
                    ctx,
                    "Reintegration charges somptuaires excedentaires",
                    excedent,
                    "Excedent charges somptuaires au-dela de 1% du CA",
                ))
                .with_reference_reglementaire("CGI - Charges somptuaires"),
        );
    }
    one(FI003.ok("Charges somptuaires dans les limites"))
}

fn fi004(ctx: &AuditContext) -> Findings {
    let amendes = abs_sum(
        ctx.balance_n
            .iter()
            .filter(|e| e.has_any_prefix(&["6471", "6478"])),
    );
    if amendes > 0.0 {
        return one(
            FI004
                .anomalie(
                    Severite::Mineur,
                    format!("Amendes et penalites: {} (non deductibles)", fmt_montant(amendes)),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("amendes", amendes)
                        .attendu("Aucune amende ou penalite, ou reintegration fiscale effectuee")
                        .constate(format!("Amendes et penalites: {} FCFA", fmt_montant(amendes)))
                        .impact_fiscal(format!(
                            "Reintegration obligatoire de {} FCFA (100% non deductible)",
                            fmt_montant(amendes)
                        )),
                )
                .with_suggestion("Reintegrer la totalite des amendes dans le resultat fiscal")
                .with_ecriture(reintegration(
                    ctx,
                    "Reintegration amendes et penalites",
                    amendes,
                    "Amendes et penalites - 100% non deductibles",
                ))
                .with_reference_reglementaire("Art. 8-d CGI - Charges non deductibles"),
        );
    }
    one(FI004.ok("Aucune amende ou penalite comptabilisee"))
}

fn fi005(ctx: &AuditContext) -> Findings {
    let dons = abs_sum(ctx.balance_n.lines_with_prefix("6234"));
    let ca = chiffre_affaires(&ctx.balance_n);
    let plafond = ca * PLAFOND_DONS_CA;

    if plafond > 0.0 && dons > plafond {
        let exces = dons - plafond;
        return one(
            FI005
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "Dons ({}) > plafond 1 pour mille du CA ({})",
                        fmt_montant(dons),
                        fmt_montant(plafond)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("dons", dons)
                        .montant("plafond", plafond)
                        .montant("ca", ca)
                        .montant("excesAReintegrer", exces)
                        .impact_fiscal(format!(
                            "Reintegration de {} FCFA dans le resultat fiscal",
                            fmt_montant(exces)
                        )),
                )
                .with_suggestion("Reintegrer l'excedent dans le tableau de passage au resultat fiscal")
                .with_reference_reglementaire("Art. 8-e CGI - Plafond dons et liberalites"),
        );
    }
    one(FI005.ok("Dons dans les limites du plafond"))
}

fn fi006(ctx: &AuditContext) -> Findings {
    let provisions = abs_sum(ctx.balance_n.iter().filter(|e| e.has_any_prefix(&["691", "697"])));
    if provisions > 0.0 {
        return one(
            FI006
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "Dotations aux provisions: {} - verifier la deductibilite",
                        fmt_montant(provisions)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("dotationsProvisions", provisions)
                        .attendu("Provisions individuellement justifiees et deductibles")
                        .impact_fiscal("Provisions non deductibles a reintegrer dans le resultat fiscal"),
                )
                .with_suggestion("Examiner chaque provision et reintegrer celles qui ne sont pas deductibles")
                .with_reference_reglementaire("CGI - Deductibilite des provisions"),
        );
    }
    one(FI006.ok("Pas de dotation aux provisions"))
}

fn fi007(ctx: &AuditContext) -> Findings {
    let resultat = mouvement_crediteur(&ctx.balance_n, "13");
    if resultat <= 0.0 {
        return one(FI007.ok("Pas d'IS attendu sur un resultat nul ou deficitaire"));
    }
    let taux = ctx.config.fiscal.taux_is;
    let is_comptabilise = impot_comptabilise(&ctx.balance_n);
    let is_estime = resultat * taux;

    if is_comptabilise <= 0.0 {
        return one(
            FI007
                .anomalie(
                    Severite::Majeur,
                    format!(
                        "Resultat beneficiaire ({}) sans IS comptabilise (89x)",
                        fmt_montant(resultat)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("resultat", resultat)
                        .montant("isEstime", is_estime)
                        .attendu(format!(
                            "IS comptabilise de {} (taux {})",
                            fmt_montant(is_estime),
                            fmt_pct(taux * 100.0)
                        ))
                        .constate("Aucun IS comptabilise (89x = 0)")
                        .impact_fiscal(format!(
                            "Dette fiscale potentielle de {} FCFA + penalites",
                            fmt_montant(is_estime)
                        )),
                )
                .with_suggestion(format!(
                    "Comptabiliser l'impot sur les societes, estime a {} FCFA",
                    fmt_montant(is_estime)
                )),
        );
    }

    let ecart = (is_estime - is_comptabilise).abs();
    if ecart > is_estime * ECART_IS_TOLERE {
        return one(
            FI007
                .anomalie(
                    Severite::Majeur,
                    format!(
                        "IS comptabilise ({}) significativement different de l'estime ({} @ {})",
                        fmt_montant(is_comptabilise),
                        fmt_montant(is_estime),
                        fmt_pct(taux * 100.0)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .ecart(ecart)
                        .montant("isComptabilise", is_comptabilise)
                        .montant("isEstime", is_estime)
                        .montant("resultat", resultat)
                        .montant("tauxIS", taux * 100.0)
                        .impact_fiscal("IS mal calcule: risque de complement d'impot et de penalites"),
                )
                .with_suggestion(
                    "Verifier le calcul de l'IS: reintegrations extracomptables, deductions et reports deficitaires",
                ),
        );
    }
    one(FI007.ok("IS coherent avec le resultat"))
}

fn fi008(ctx: &AuditContext) -> Findings {
    let ca = chiffre_affaires(&ctx.balance_n);
    if ca <= 0.0 {
        return one(FI008.non_applicable("Pas de chiffre d'affaires (70x)"));
    }
    let fiscal = &ctx.config.fiscal;
    let imf = (ca * fiscal.taux_imf).clamp(fiscal.imf_minimum, fiscal.imf_maximum);
    let is_comptabilise = impot_comptabilise(&ctx.balance_n);

    if is_comptabilise < imf {
        let complement = imf - is_comptabilise;
        return one(
            FI008
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "IS ({}) < IMF ({}) = {} du CA (min {}, max {})",
                        fmt_montant(is_comptabilise),
                        fmt_montant(imf),
                        fmt_pct(fiscal.taux_imf * 100.0),
                        fmt_montant(fiscal.imf_minimum),
                        fmt_montant(fiscal.imf_maximum)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("isComptabilise", is_comptabilise)
                        .montant("imf", imf)
                        .montant("ca", ca)
                        .montant("complement", complement)
                        .impact_fiscal(format!(
                            "Complement d'IS de {} FCFA a payer au titre de l'IMF",
                            fmt_montant(complement)
                        )),
                )
                .with_suggestion(format!(
                    "Ajuster l'IS au montant de l'IMF: complement de {} FCFA",
                    fmt_montant(complement)
                ))
                .with_reference_reglementaire("CGI - Minimum forfaitaire d'imposition"),
        );
    }
    one(FI008.ok(format!("IMF respecte ({})", fmt_montant(imf))))
}

fn fi009(ctx: &AuditContext) -> Findings {
    let collectee = abs_sum(ctx.balance_n.lines_with_prefix("443"));
    let deductible = abs_sum(ctx.balance_n.lines_with_prefix("445"));
    let due = abs_sum(ctx.balance_n.lines_with_prefix("444"));
    let solde_theorique = collectee - deductible;

    if collectee > 0.0 && deductible > 0.0 && solde_theorique > 0.0 && due == 0.0 {
        let ecriture = EcritureCorrective::new("OD", ctx.evaluated_at.date_naive().to_string())
            .debit("443000", "TVA collectee - apurement", solde_theorique)
            .credit("444000", "Etat - TVA due", solde_theorique)
            .commentaire("Centralisation TVA: transfert solde TVA collectee vers TVA due");
        return one(
            FI009
                .anomalie(
                    Severite::Mineur,
                    format!(
                        "TVA due theorique ({}) non comptabilisee (444x)",
                        fmt_montant(solde_theorique)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("tvaCollectee", collectee)
                        .montant("tvaDeductible", deductible)
                        .montant("soldeTheorique", solde_theorique)
                        .attendu("TVA due (444x) = TVA collectee (443x) - TVA deductible (445x)"),
                )
                .with_suggestion("Comptabiliser la TVA due au compte 444x")
                .with_ecriture(ecriture)
                .with_reference_reglementaire("CGI - Declarations et paiement de la TVA"),
        );
    }
    one(FI009.ok("TVA a reverser coherente"))
}

fn fi015(ctx: &AuditContext) -> Findings {
    let resultat = mouvement_crediteur(&ctx.balance_n, "13");
    let is_comptabilise = impot_comptabilise(&ctx.balance_n);
    if resultat <= 0.0 || is_comptabilise <= 0.0 {
        return one(FI015.non_applicable("Pas de resultat beneficiaire impose"));
    }

    let taux_effectif = is_comptabilise * 100.0 / resultat;
    let taux_normal = ctx.config.fiscal.taux_is * 100.0;
    let qualificatif = if taux_effectif > taux_normal * 1.5 {
        Some("eleve")
    } else if taux_effectif < taux_normal * 0.3 && is_comptabilise > 100_000.0 {
        Some("faible")
    } else {
        None
    };

    match qualificatif {
        Some(q) => one(
            FI015
                .anomalie(
                    Severite::Info,
                    format!(
                        "Taux effectif d'imposition {}: {} (taux normal: {})",
                        q,
                        fmt_pct(taux_effectif),
                        fmt_pct(taux_normal)
                    ),
                )
                .with_details(
                    DetailsControle::new()
                        .montant("resultat", resultat)
                        .montant("isComptabilise", is_comptabilise)
                        .montant("tauxEffectif", (taux_effectif * 10.0).round() / 10.0)
                        .montant("tauxNormal", taux_normal),
                )
                .with_suggestion("Documenter les reintegrations, exonerations ou reports expliquant l'ecart"),
        ),
        None => one(FI015.ok(format!("Taux effectif d'imposition: {}", fmt_pct(taux_effectif)))),
    }
}
