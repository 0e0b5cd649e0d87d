//! Diff reporter and score tests
//!
//! Scenario-level checks of the correction and Part-2 reports, plus the
//! monotonicity of the global score.

mod helpers;

use fisca_audit::diff::{compute_account_deltas, generate_correction_report, generate_partie2_report};
use fisca_audit::models::{Evolution, EvolutionPartie2, ResumeAudit, Severite};
use fisca_audit::{AuditRunner, NoopObserver};
use helpers::{balance, context, finding, line, session_with};

/// TC-DIFF-001: Blocking anomalies removed or passing after correction
#[test]
fn tc_diff_001_conformance_scenario() {
    // Given: A and B blocking before; A absent and B passing after
    let avant = session_with(vec![finding("A", Severite::Bloquant), finding("B", Severite::Bloquant)]);
    let apres = session_with(vec![finding("B", Severite::Ok)]);

    // When: Generating both reports
    let correction = generate_correction_report(&avant, &apres, &[], &[], 0.01);
    let partie2 = generate_partie2_report(&avant, &apres, &[], &[], 0.01);

    // Then: Both corrected, balance compliant
    assert_eq!(correction.item("A").unwrap().evolution, Evolution::Corrige);
    assert_eq!(correction.item("B").unwrap().evolution, Evolution::Corrige);
    assert!(partie2.synthese.conforme);
    assert_eq!(partie2.synthese.bloquants_restants, 0);
    assert_eq!(partie2.synthese.corriges, 2);

    let json = serde_json::to_value(&partie2).unwrap();
    assert_eq!(json["synthese"]["bloquantsRestants"], 0);
    assert_eq!(json["synthese"]["conforme"], true);
}

/// TC-DIFF-002: A new non-blocking anomaly keeps conformance
#[test]
fn tc_diff_002_new_anomaly_scenario() {
    let avant = session_with(vec![finding("A", Severite::Ok)]);
    let apres = session_with(vec![finding("A", Severite::Ok), finding("C", Severite::Majeur)]);

    let rapport = generate_partie2_report(&avant, &apres, &[], &[], 0.01);

    assert_eq!(rapport.items.len(), 1);
    let item = &rapport.items[0];
    assert_eq!(item.reference, "C");
    assert_eq!(item.evolution, EvolutionPartie2::Nouveau);
    assert_eq!(item.severite_v1, Severite::Ok);
    assert_eq!(item.severite_v2, Severite::Majeur);
    assert!(rapport.synthese.conforme);
    assert_eq!(rapport.synthese.nouveaux, 1);
}

/// TC-DIFF-005: A new blocking anomaly breaks conformance
#[test]
fn tc_diff_005_new_blocking_anomaly_scenario() {
    let avant = session_with(vec![finding("A", Severite::Ok)]);
    let apres = session_with(vec![finding("A", Severite::Ok), finding("C", Severite::Bloquant)]);

    let rapport = generate_partie2_report(&avant, &apres, &[], &[], 0.01);

    assert_eq!(rapport.items.len(), 1);
    assert_eq!(rapport.items[0].evolution, EvolutionPartie2::Nouveau);
    assert_eq!(rapport.items[0].severite_v2, Severite::Bloquant);
    assert_eq!(rapport.synthese.bloquants_restants, 1);
    assert!(!rapport.synthese.conforme);
}

/// TC-DIFF-003: Closing balance deltas between two balances
#[test]
fn tc_diff_003_account_delta_scenario() {
    let avant = vec![
        line("601000", "Achats", 8_000_000.0, 0.0),
        line("521000", "Banque", 1_000.0, 0.0),
    ];
    let apres = vec![
        line("601000", "Achats", 8_500_000.0, 0.0),
        line("521000", "Banque", 1_000.004, 0.0),
    ];

    let deltas = compute_account_deltas(&avant, &apres, 0.01);

    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].compte, "601000");
    assert_eq!(deltas[0].solde_avant, 8_000_000.0);
    assert_eq!(deltas[0].solde_apres, 8_500_000.0);
    assert_eq!(deltas[0].ecart, 500_000.0);

    let avant_session = session_with(vec![]);
    let rapport = generate_correction_report(&avant_session, &avant_session, &avant, &apres, 0.01);
    assert_eq!(rapport.comptes_modifies, deltas);
}

/// TC-DIFF-004: Comparing a real session with itself changes nothing
#[tokio::test]
async fn tc_diff_004_self_comparison_is_idempotent() {
    // Given: A completed audit of an unbalanced balance
    let runner = AuditRunner::standard().unwrap();
    let lines = helpers::balance_with_debit_gap(250.0);
    let session = runner
        .run(
            runner.start_session("balance", "2024", fisca_audit::models::PhaseAudit::Phase1),
            &context(lines.clone()),
            &mut NoopObserver,
        )
        .await;
    assert!(session.resultats.iter().any(|f| f.is_anomalie()));

    // When: Comparing it against itself
    let correction = generate_correction_report(&session, &session, &lines, &lines, 0.01);
    let partie2 = generate_partie2_report(&session, &session, &lines, &lines, 0.01);

    // Then: Nothing corrected, nothing new, every item unchanged
    assert!(!correction.corrections.is_empty());
    assert!(correction.corrections.iter().all(|c| c.evolution == Evolution::Inchange));
    assert_eq!(partie2.synthese.corriges, 0);
    assert_eq!(partie2.synthese.nouveaux, 0);
    assert!(partie2.items.iter().all(|i| i.evolution == EvolutionPartie2::NonCorrige));
    assert!(correction.comptes_modifies.is_empty());
    assert_eq!(partie2.synthese.conforme, session.resume.bloquants_restants == 0);
}

/// TC-SCORE-001: Passing controls never lower the score, blockers never raise it
#[test]
fn tc_score_001_monotonicity() {
    let base = vec![
        finding("A", Severite::Ok),
        finding("B", Severite::Majeur),
        finding("C", Severite::Mineur),
    ];
    let score = |findings: &[fisca_audit::models::ResultatControle]| ResumeAudit::from_findings(findings, 49).score_global;

    let mut more_passing = base.clone();
    let mut previous = score(&base);
    for i in 0..20 {
        more_passing.push(finding(&format!("P{}", i), Severite::Ok));
        let current = score(&more_passing);
        assert!(current >= previous, "score dropped from {} to {}", previous, current);
        previous = current;
    }

    let mut with_blockers = more_passing.clone();
    let mut previous = score(&with_blockers);
    for i in 0..5 {
        with_blockers.push(finding(&format!("X{}", i), Severite::Bloquant));
        let current = score(&with_blockers);
        assert!(current <= previous, "score rose from {} to {}", previous, current);
        assert!(current <= 49);
        previous = current;
    }
}

/// TC-SCORE-002: Session summary is the summary of its findings
#[tokio::test]
async fn tc_score_002_session_resume_matches_findings() {
    let runner = AuditRunner::standard().unwrap();
    let session = runner
        .run(
            runner.start_session("balance", "2024", fisca_audit::models::PhaseAudit::Phase1),
            &context(balance()),
            &mut NoopObserver,
        )
        .await;
    let resume = ResumeAudit::from_findings(&session.resultats, 49);
    assert_eq!(resume, session.resume);
    if resume.bloquants_restants == 0 {
        assert!(resume.score_global > 0);
    } else {
        assert!(resume.score_global <= 49);
    }
}
