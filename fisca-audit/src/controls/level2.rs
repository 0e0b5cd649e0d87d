//! Level 2: conformity to the SYSCOHADA Revise chart and statement mapping

use super::helpers::{fmt_montant, fmt_pct, one, Findings};
use super::{ControlDefinition, ControlMeta};
use crate::context::AuditContext;
use crate::models::{BalanceEntry, DetailsControle, Niveau, Severite};
use crate::reference::SensCompte;
use std::collections::BTreeMap;

const N: Niveau = Niveau::Conformite;

const C001: ControlMeta = ControlMeta::new("C-001", "Comptes OHADA valides", N);
const C002: ControlMeta = ControlMeta::new("C-002", "Classes valides (1-9)", N);
const C003: ControlMeta = ControlMeta::new("C-003", "Longueur comptes standard", N);
const C004: ControlMeta = ControlMeta::new("C-004", "Comptes obsoletes SYSCOA", N);
const C005: ControlMeta = ControlMeta::new("C-005", "Comptes TAFIRE supprimes", N);
const C006: ControlMeta = ControlMeta::new("C-006", "Mapping etats financiers", N);
const C007: ControlMeta = ControlMeta::new("C-007", "Comptes a 2 chiffres", N);
const C008: ControlMeta = ControlMeta::new("C-008", "Comptes speciaux classe 8", N);
const C010: ControlMeta = ControlMeta::new("C-010", "Sens comptes OHADA", N);

/// Prefixes of the former SYSCOA chart dropped by the 2017 revision
const COMPTES_OBSOLETES: &[(&str, &str)] = &[
    ("195", "Provisions pour impots (remplace par 441x)"),
    ("196", "Provisions pour pensions (remplace par 198x)"),
    ("471", "Compte d'attente (remplace par 47x specifiques)"),
    ("694", "TAFIRE - supprime dans SYSCOHADA Revise"),
];

const COMPTES_TAFIRE: &[&str] = &["694", "884", "894"];

pub fn definitions() -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(C001, "Verifie que chaque compte existe dans le plan SYSCOHADA", Severite::Majeur, c001),
        ControlDefinition::new(C002, "Verifie que la classe de chaque compte est valide", Severite::Bloquant, c002),
        ControlDefinition::new(C003, "Verifie la longueur standard des numeros de compte", Severite::Info, c003),
        ControlDefinition::new(C004, "Detecte les comptes de l'ancien SYSCOA", Severite::Majeur, c004),
        ControlDefinition::new(C005, "Detecte les comptes TAFIRE supprimes", Severite::Majeur, c005),
        ControlDefinition::new(C006, "Verifie que les comptes de bilan sont mappables", Severite::Majeur, c006),
        ControlDefinition::new(C007, "Detecte les comptes a 2 chiffres portant un solde", Severite::Mineur, c007),
        ControlDefinition::new(C008, "Signale les operations HAO (classe 8)", Severite::Info, c008),
        ControlDefinition::new(C010, "Verifie le sens des soldes selon le plan", Severite::Mineur, c010),
    ]
}

fn c001(ctx: &AuditContext) -> Findings {
    if ctx.plan_comptable.is_empty() {
        return one(C001.non_applicable("Plan comptable non charge"));
    }

    let mut non_conformes = Vec::new();
    let mut avec_suggestion = 0usize;
    for entry in &ctx.balance_n {
        let code = entry.code();
        if ctx.plan_comptable.lookup(code).is_some() {
            continue;
        }
        match ctx.plan_comptable.closest(code) {
            Some(proche) => {
                avec_suggestion += 1;
                non_conformes.push(format!("{} -> {} - {}", code, proche.numero, proche.libelle));
            }
            None => non_conformes.push(code.to_string()),
        }
    }

    if non_conformes.is_empty() {
        return one(C001.ok("Tous les comptes sont conformes au plan OHADA"));
    }

    let total = ctx.balance_n.len();
    let pct = non_conformes.len() as f64 * 100.0 / total as f64;
    one(
        C001.anomalie(
            Severite::Majeur,
            format!(
                "{} compte(s) non conforme(s) au plan OHADA ({})",
                non_conformes.len(),
                fmt_pct(pct)
            ),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesNonConformes", non_conformes.len() as f64)
                .montant("totalComptes", total as f64)
                .montant("suggestionsDisponibles", avec_suggestion as f64)
                .comptes(non_conformes.into_iter().take(15))
                .description("Ces numeros de compte ne figurent pas dans le referentiel SYSCOHADA Revise 2017")
                .attendu("Tous les comptes conformes au plan SYSCOHADA Revise 2017")
                .impact_fiscal("Risque de rejet de la liasse: comptes non reconnus dans les etats financiers OHADA"),
        )
        .with_suggestion("Reclasser ces comptes selon le plan SYSCOHADA Revise 2017 en utilisant les correspondances proposees")
        .with_reference_reglementaire("Art. 14 Acte Uniforme OHADA - Plan de comptes SYSCOHADA"),
    )
}

fn c002(ctx: &AuditContext) -> Findings {
    let invalides: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| !matches!(e.classe(), Some(1..=9)))
        .map(|e| e.code().to_string())
        .collect();

    if invalides.is_empty() {
        return one(C002.ok("Toutes les classes sont valides"));
    }
    one(
        C002.anomalie(
            Severite::Bloquant,
            format!("{} compte(s) avec classe invalide", invalides.len()),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesInvalides", invalides.len() as f64)
                .comptes(invalides.into_iter().take(10))
                .attendu("Tous les comptes commencant par un chiffre de classe valide (1 a 9)")
                .impact_fiscal("Liasse non generable: comptes impossibles a classer"),
        )
        .with_suggestion("Corriger les numeros de compte pour qu'ils commencent par un chiffre de 1 a 9")
        .with_reference_reglementaire("Art. 14 Acte Uniforme OHADA - Nomenclature des comptes"),
    )
}

fn c003(ctx: &AuditContext) -> Findings {
    let courts: Vec<&str> = ctx.balance_n.iter().map(|e| e.code()).filter(|c| c.len() < 4).collect();
    let longs: Vec<&str> = ctx.balance_n.iter().map(|e| e.code()).filter(|c| c.len() > 8).collect();

    if courts.is_empty() && longs.is_empty() {
        return one(C003.ok("Longueurs de comptes conformes"));
    }

    let mut distribution: BTreeMap<usize, usize> = BTreeMap::new();
    for entry in &ctx.balance_n {
        *distribution.entry(entry.code().len()).or_default() += 1;
    }
    let details = distribution.iter().fold(
        DetailsControle::new()
            .montant("comptesCourts", courts.len() as f64)
            .montant("comptesLongs", longs.len() as f64),
        |d, (len, count)| d.montant(&format!("longueur{}", len), *count as f64),
    );
    let comptes = courts
        .iter()
        .take(5)
        .map(|c| format!("Court: {}", c))
        .chain(longs.iter().take(5).map(|c| format!("Long: {}", c)));

    one(
        C003.anomalie(
            Severite::Info,
            format!(
                "{} compte(s) court(s) (<4), {} compte(s) long(s) (>8)",
                courts.len(),
                longs.len()
            ),
        )
        .with_details(
            details
                .comptes(comptes)
                .attendu("Numeros de compte de 4 a 8 chiffres"),
        )
        .with_suggestion("Ventiler les comptes courts en sous-comptes detailles"),
    )
}

fn c004(ctx: &AuditContext) -> Findings {
    let trouves: Vec<String> = ctx
        .balance_n
        .iter()
        .flat_map(|e| {
            COMPTES_OBSOLETES
                .iter()
                .filter(move |(prefix, _)| e.has_prefix(prefix))
                .map(move |(_, desc)| format!("{}: {}", e.code(), desc))
        })
        .collect();

    if trouves.is_empty() {
        return one(C004.ok("Aucun compte obsolete detecte"));
    }
    one(
        C004.anomalie(
            Severite::Majeur,
            format!("{} compte(s) obsolete(s) de l'ancien SYSCOA", trouves.len()),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesObsoletes", trouves.len() as f64)
                .comptes(trouves)
                .attendu("Utilisation exclusive des comptes du plan SYSCOHADA Revise 2017")
                .impact_fiscal("Rejet probable de la liasse: comptes supprimes depuis la reforme 2017"),
        )
        .with_suggestion("Migrer vers les comptes du SYSCOHADA Revise 2017 avec la table de correspondance officielle")
        .with_reference_reglementaire("SYSCOHADA Revise 2017 - Guide de migration"),
    )
}

fn c005(ctx: &AuditContext) -> Findings {
    let tafire: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| e.has_any_prefix(COMPTES_TAFIRE))
        .map(|e| format!("{}: {}", e.code(), e.intitule))
        .collect();

    if tafire.is_empty() {
        return one(C005.ok("Aucun compte TAFIRE obsolete"));
    }
    one(
        C005.anomalie(
            Severite::Majeur,
            format!("{} compte(s) TAFIRE detecte(s) (supprime dans le revise)", tafire.len()),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesTafire", tafire.len() as f64)
                .comptes(tafire)
                .description("Le TAFIRE a ete remplace par le Tableau des Flux de Tresorerie (TFT)"),
        )
        .with_suggestion("Supprimer ces comptes et utiliser la methode du TFT")
        .with_reference_reglementaire("SYSCOHADA Revise 2017 - Suppression du TAFIRE"),
    )
}

fn c006(ctx: &AuditContext) -> Findings {
    let type_liasse = ctx.type_liasse;
    if type_liasse.is_sectoriel() {
        return one(C006.ok(format!(
            "Controle adapte au type {} - mapping sectoriel utilise",
            type_liasse
        )));
    }
    if ctx.mapping.is_empty() {
        return one(C006.non_applicable("Mapping SYSCOHADA non charge"));
    }

    let bilan: Vec<&BalanceEntry> = ctx
        .balance_n
        .iter()
        .filter(|e| matches!(e.classe(), Some(1..=5)))
        .collect();
    let non_mappes: Vec<String> = bilan
        .iter()
        .filter(|e| !ctx.mapping.covers_bilan(e.code()))
        .map(|e| e.code().to_string())
        .collect();

    if non_mappes.is_empty() {
        return one(C006.ok(format!(
            "Tous les comptes de bilan sont mappables ({})",
            type_liasse
        )));
    }

    let severite = if non_mappes.len() > 5 { Severite::Majeur } else { Severite::Mineur };
    let mut finding = C006
        .anomalie(
            severite,
            format!(
                "{} compte(s) de bilan non mappe(s) vers les etats financiers ({})",
                non_mappes.len(),
                type_liasse
            ),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesNonMappes", non_mappes.len() as f64)
                .montant("totalComptesBilan", bilan.len() as f64)
                .comptes(non_mappes.into_iter().take(15))
                .attendu(format!("Tous les comptes de bilan (classes 1-5) mappes vers les postes {}", type_liasse)),
        );
    if severite == Severite::Majeur {
        finding = finding
            .with_suggestion(format!(
                "Ajouter les comptes manquants au referentiel de mapping {}",
                type_liasse
            ))
            .with_reference_reglementaire("Art. 29 Acte Uniforme OHADA - Presentation du bilan");
    }
    one(finding)
}

fn c007(ctx: &AuditContext) -> Findings {
    let deux_chiffres: Vec<String> = ctx
        .balance_n
        .iter()
        .filter(|e| e.code().len() == 2)
        .map(|e| format!("{}: {}", e.code(), e.intitule))
        .collect();

    if deux_chiffres.is_empty() {
        return one(C007.ok("Aucun compte a 2 chiffres seulement"));
    }
    one(
        C007.anomalie(
            Severite::Mineur,
            format!("{} compte(s) a 2 chiffres (niveau insuffisant)", deux_chiffres.len()),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesDeuxChiffres", deux_chiffres.len() as f64)
                .comptes(deux_chiffres)
                .attendu("Comptes detailles a 4 chiffres minimum portant les soldes"),
        )
        .with_suggestion("Ventiler ces comptes en sous-comptes detailles (minimum 4 chiffres)")
        .with_reference_reglementaire("Plan SYSCOHADA Revise 2017 - Hierarchie des comptes"),
    )
}

fn c008(ctx: &AuditContext) -> Findings {
    let classe8: Vec<&BalanceEntry> = ctx.balance_n.iter().filter(|e| e.has_prefix("8")).collect();
    if classe8.is_empty() {
        return one(C008.ok("Aucun compte HAO (classe 8)"));
    }

    let mut ventilation: BTreeMap<&str, f64> = BTreeMap::new();
    for entry in &classe8 {
        let groupe = entry.code().get(..2).unwrap_or("8");
        *ventilation.entry(groupe).or_default() += (entry.debit - entry.credit).abs();
    }
    let total: f64 = ventilation.values().sum();
    let details = ventilation.iter().fold(
        DetailsControle::new()
            .montant("totalHAO", total)
            .montant("nombreComptes", classe8.len() as f64),
        |d, (groupe, montant)| d.montant(&format!("compte{}x", groupe), *montant),
    );

    one(
        C008.anomalie(
            Severite::Info,
            format!(
                "{} compte(s) HAO (classe 8) pour {}",
                classe8.len(),
                fmt_montant(total)
            ),
        )
        .with_details(
            details
                .comptes(classe8.iter().take(10).map(|e| format!("{}: {}", e.code(), e.intitule)))
                .description("Les operations HAO doivent etre exceptionnelles et documentees dans l'annexe"),
        )
        .with_suggestion("Justifier chaque operation HAO dans les notes annexes")
        .with_reference_reglementaire("Art. 48 Acte Uniforme OHADA - Operations HAO"),
    )
}

fn c010(ctx: &AuditContext) -> Findings {
    if ctx.plan_comptable.is_empty() {
        return one(C010.non_applicable("Plan comptable non charge"));
    }

    let mut inversions = Vec::new();
    let mut total_inverse = 0.0;
    for entry in &ctx.balance_n {
        let solde = entry.solde();
        if solde.abs() < 0.01 {
            continue;
        }
        let Some(compte) = ctx.plan_comptable.lookup(entry.code()) else {
            continue;
        };
        let inverse = match compte.sens {
            SensCompte::Debiteur => solde < 0.0,
            SensCompte::Crediteur => solde > 0.0,
        };
        if inverse {
            let (reel, attendu) = if solde > 0.0 { ("debiteur", "crediteur") } else { ("crediteur", "debiteur") };
            inversions.push(format!(
                "{} ({}): solde {} au lieu de {}",
                entry.code(),
                compte.libelle,
                reel,
                attendu
            ));
            total_inverse += solde.abs();
        }
    }

    if inversions.is_empty() {
        return one(C010.ok("Sens des soldes conforme au plan SYSCOHADA"));
    }
    let severite = if inversions.len() > 5 { Severite::Mineur } else { Severite::Info };
    one(
        C010.anomalie(
            severite,
            format!(
                "{} compte(s) avec solde inverse par rapport au sens OHADA attendu",
                inversions.len()
            ),
        )
        .with_details(
            DetailsControle::new()
                .montant("comptesInverses", inversions.len() as f64)
                .montant("totalMontantInverse", total_inverse)
                .comptes(inversions.into_iter().take(15)),
        )
        .with_suggestion("Verifier chaque solde inverse et effectuer les reclassements necessaires")
        .with_reference_reglementaire("Plan SYSCOHADA Revise 2017 - Sens des comptes"),
    )
}
