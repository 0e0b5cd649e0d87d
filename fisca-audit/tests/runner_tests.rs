//! Audit runner integration tests
//!
//! Full runs of the built-in catalogue over small balances: determinism,
//! tolerance on the general equilibrium, cancellation between levels,
//! fault isolation and session-level faults.

mod helpers;

use fisca_audit::controls::{standard_definitions, ControlDefinition, ControlMeta};
use fisca_audit::error::ControlError;
use fisca_audit::models::{
    Niveau, PhaseAudit, ResultatControle, SessionAudit, Severite, StatutControle, StatutSession,
};
use fisca_audit::reference::{MappingSyscohada, PlanComptable};
use fisca_audit::{AuditContext, AuditObserver, AuditRunner, ControlRegistry, NoopObserver, TokenObserver};
use helpers::{balance, balance_with_debit_gap, context, evaluated_at};
use tokio_util::sync::CancellationToken;

async fn run_phase(runner: &AuditRunner, ctx: &AuditContext, phase: PhaseAudit) -> SessionAudit {
    let session = runner.start_session("balance", "2024", phase);
    runner.run(session, ctx, &mut NoopObserver).await
}

fn equilibrium_blockers(session: &SessionAudit) -> usize {
    session
        .resultats
        .iter()
        .filter(|f| f.reference == "F-001" && f.severite == Severite::Bloquant)
        .count()
}

/// TC-RUN-001: Two runs over the same context produce identical findings
#[tokio::test]
async fn tc_run_001_runs_are_deterministic() {
    // Given: One context with a fixed evaluation instant
    let runner = AuditRunner::standard().unwrap();
    let ctx = context(balance());

    // When: Running phase 1 twice
    let first = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;
    let second = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;

    // Then: Same ordered finding list, byte for byte
    assert_eq!(first.statut, StatutSession::Terminee);
    assert_eq!(first.resultats, second.resultats);
    assert_eq!(
        serde_json::to_string(&first.resultats).unwrap(),
        serde_json::to_string(&second.resultats).unwrap()
    );
    assert_eq!(first.resume, second.resume);
}

/// TC-RUN-002: Debit/credit gap below tolerance is not blocking
#[tokio::test]
async fn tc_run_002_equilibrium_within_tolerance() {
    let runner = AuditRunner::standard().unwrap();

    let session = run_phase(&runner, &context(balance_with_debit_gap(0.004)), PhaseAudit::Phase1).await;
    assert_eq!(equilibrium_blockers(&session), 0);

    let session = run_phase(&runner, &context(balance_with_debit_gap(5.0)), PhaseAudit::Phase1).await;
    assert_eq!(equilibrium_blockers(&session), 1);
    assert!(session.resume.score_global <= 49);
}

/// Cancels once the given level has been evaluated
struct CancelAfter {
    niveau: Niveau,
    done: bool,
}

impl AuditObserver for CancelAfter {
    fn on_level_end(&mut self, niveau: Niveau, _findings: &[ResultatControle]) {
        if niveau == self.niveau {
            self.done = true;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.done
    }
}

/// TC-RUN-003: Cancellation between levels keeps the completed levels
#[tokio::test]
async fn tc_run_003_cancellation_preserves_partial_results() {
    // Given: A reference run to completion
    let runner = AuditRunner::standard().unwrap();
    let ctx = context(balance());
    let full = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;

    // When: Cancelling after level 1
    let mut observer = CancelAfter {
        niveau: Niveau::Fondamental,
        done: false,
    };
    let session = runner
        .run(runner.start_session("balance", "2024", PhaseAudit::Phase1), &ctx, &mut observer)
        .await;

    // Then: ANNULEE with exactly the findings of levels 0 and 1
    assert_eq!(session.statut, StatutSession::Annulee);
    assert!(session.date_fin.is_some());
    let expected: Vec<ResultatControle> = full
        .resultats
        .iter()
        .take_while(|f| f.niveau.value() <= 1)
        .cloned()
        .collect();
    assert_eq!(session.resultats, expected);

    let registry = runner.registry();
    let executed = registry.for_level(Niveau::Structurel).len() + registry.for_level(Niveau::Fondamental).len();
    let total = registry.active_count(PhaseAudit::Phase1);
    assert_eq!(session.progression.controles_executes, executed);
    assert!((session.progression.pourcentage - executed as f64 * 100.0 / total as f64).abs() < 1e-9);
    assert_eq!(session.resume.total_controles, expected.len());
}

/// TC-RUN-004: A cancelled token stops the run before the first level
#[tokio::test]
async fn tc_run_004_token_cancellation() {
    let runner = AuditRunner::standard().unwrap();
    let token = CancellationToken::new();
    let mut observer = TokenObserver::new(token.clone());
    token.cancel();

    let session = runner
        .run(runner.start_session("balance", "2024", PhaseAudit::Phase1), &context(balance()), &mut observer)
        .await;
    assert_eq!(session.statut, StatutSession::Annulee);
    assert!(session.resultats.is_empty());
}

const PROBE: ControlMeta = ControlMeta::new("F-999", "Sonde defaillante", Niveau::Fondamental);

fn faulty(ctx: &AuditContext) -> Result<Vec<ResultatControle>, ControlError> {
    if ctx.balance_n.len() < 1000 {
        panic!("index out of range");
    }
    Ok(vec![PROBE.ok("unreachable")])
}

/// TC-RUN-005: One faulting control does not stop the others
#[tokio::test]
async fn tc_run_005_fault_isolation() {
    // Given: The standard catalogue plus a control that panics
    let mut definitions = standard_definitions();
    definitions.push(ControlDefinition::new(PROBE, "Panique", Severite::Mineur, faulty));
    let runner = AuditRunner::new(ControlRegistry::new(definitions).unwrap());
    let baseline = AuditRunner::standard().unwrap();
    let ctx = context(balance());

    // When: Running phase 1
    let session = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;
    let reference = run_phase(&baseline, &ctx, PhaseAudit::Phase1).await;

    // Then: Exactly one ERREUR_EXEC finding for the probe, everything else unchanged
    assert_eq!(session.statut, StatutSession::Terminee);
    let probe: Vec<&ResultatControle> = session.resultats.iter().filter(|f| f.reference == "F-999").collect();
    assert_eq!(probe.len(), 1);
    assert_eq!(probe[0].statut, StatutControle::ErreurExec);
    assert!(probe[0].message.contains("index out of range"));

    let others: Vec<&ResultatControle> = session.resultats.iter().filter(|f| f.reference != "F-999").collect();
    assert_eq!(others, reference.resultats.iter().collect::<Vec<_>>());
}

/// TC-RUN-006: Missing chart or mapping is a session fault
#[tokio::test]
async fn tc_run_006_missing_context_faults_session() {
    let runner = AuditRunner::standard().unwrap();

    let ctx = AuditContext::builder(balance())
        .plan_comptable(PlanComptable::default())
        .evaluated_at(evaluated_at())
        .build();
    let session = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;
    assert_eq!(session.statut, StatutSession::Erreur);
    assert!(session.erreur.as_deref().unwrap().contains("level 2"));
    assert!(session.resultats.is_empty());

    let ctx = AuditContext::builder(balance())
        .mapping(MappingSyscohada::default())
        .evaluated_at(evaluated_at())
        .build();
    let session = run_phase(&runner, &ctx, PhaseAudit::Phase3).await;
    assert_eq!(session.statut, StatutSession::Erreur);
    assert!(session.erreur.as_deref().unwrap().contains("level 6"));

    // Without levels 2, 4 and 6 the same context is accepted
    let reduced = runner
        .registry()
        .with_inactive(
            &runner
                .registry()
                .iter()
                .filter(|d| matches!(d.niveau.value(), 2 | 4))
                .map(|d| d.reference)
                .collect::<Vec<_>>(),
        )
        .unwrap();
    let session = run_phase(&AuditRunner::new(reduced), &ctx, PhaseAudit::Phase1).await;
    assert_eq!(session.statut, StatutSession::Terminee);
}

/// TC-RUN-007: A session can only be run from EN_ATTENTE
#[tokio::test]
async fn tc_run_007_terminal_session_not_rerun() {
    let runner = AuditRunner::standard().unwrap();
    let ctx = context(balance());
    let done = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;
    let findings = done.resultats.clone();

    let again = runner.run(done, &ctx, &mut NoopObserver).await;
    assert_eq!(again.statut, StatutSession::Terminee);
    assert_eq!(again.resultats, findings);
}

/// TC-RUN-008: Phase 3 extends a completed balance audit
#[tokio::test]
async fn tc_run_008_resume_phase3() {
    let runner = AuditRunner::standard().unwrap();
    let ctx = context(balance());
    let phase1 = run_phase(&runner, &ctx, PhaseAudit::Phase1).await;

    let phase3 = runner.resume_phase3(&phase1, &ctx, &mut NoopObserver).await;
    assert_eq!(phase3.statut, StatutSession::Terminee);
    assert_eq!(phase3.phase, PhaseAudit::Phase3);
    assert_ne!(phase3.id, phase1.id);
    assert_eq!(&phase3.resultats[..phase1.resultats.len()], &phase1.resultats[..]);
    assert!(phase3.resultats[phase1.resultats.len()..]
        .iter()
        .all(|f| matches!(f.niveau, Niveau::EtatsFinanciers | Niveau::Fiscal)));
    assert_eq!(
        phase3.progression.total_controles,
        runner.registry().active_count(PhaseAudit::Phase3)
    );

    // An unfinished session cannot be extended
    let pending = runner.start_session("balance", "2024", PhaseAudit::Phase1);
    let refused = runner.resume_phase3(&pending, &ctx, &mut NoopObserver).await;
    assert_eq!(refused.statut, StatutSession::Erreur);
}

/// TC-RUN-009: Re-import of a corrected balance reports the fix
#[tokio::test]
async fn tc_run_009_reimport_and_compare() {
    let runner = AuditRunner::standard().unwrap();
    let broken = balance_with_debit_gap(5.0);
    let avant = run_phase(&runner, &context(broken.clone()), PhaseAudit::Phase1).await;
    assert_eq!(equilibrium_blockers(&avant), 1);

    let (apres, rapport) = runner
        .reimport_and_compare(&avant, &broken, "balance-v2", &context(balance()), &mut NoopObserver)
        .await;

    assert_eq!(apres.phase, PhaseAudit::Phase2);
    assert_eq!(apres.statut, StatutSession::Terminee);
    assert_eq!(rapport.session_avant_id, avant.id);
    assert_eq!(rapport.session_apres_id, apres.id);
    let item = rapport.item("F-001").unwrap();
    assert_eq!(item.severite_avant, Severite::Bloquant);
    assert_eq!(item.evolution, fisca_audit::models::Evolution::Corrige);
    assert!(rapport.synthese.bloquants_apres < rapport.synthese.bloquants_avant);
    // Only movements changed, closing balances are identical
    assert!(rapport.comptes_modifies.is_empty());
}
