//! Audit runner
//!
//! Evaluates the active rules of a phase level by level against one
//! read-only `AuditContext`, owning the session it mutates. Progress is
//! reported through `AuditObserver` callbacks; cancellation is polled
//! between levels only.
//!
//! `run` never returns an error: control faults become `ERREUR_EXEC`
//! findings and session faults leave the session in `ERREUR`.

use crate::context::AuditContext;
use crate::controls::ControlDefinition;
use crate::diff::generate_correction_report;
use crate::error::{AuditError, AuditResult, ControlError};
use crate::models::{
    BalanceEntry, Niveau, PhaseAudit, RapportCorrection, ResultatControle, ResumeAudit, SessionAudit,
    StatutSession,
};
use crate::registry::ControlRegistry;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callbacks fired while a session runs
///
/// Every method has a no-op default so observers only implement what they need.
pub trait AuditObserver: Send {
    /// Session moved to EN_COURS
    fn on_session_start(&mut self, _session: &SessionAudit) {}

    fn on_level_start(&mut self, _niveau: Niveau) {}

    /// A control is about to be evaluated (`index` is 0-based within the level)
    fn on_progress(&mut self, _niveau: Niveau, _index: usize, _total: usize, _reference: &str) {}

    fn on_level_end(&mut self, _niveau: Niveau, _findings: &[ResultatControle]) {}

    /// Session reached TERMINEE, ANNULEE or ERREUR; `session.resume` holds
    /// the (possibly partial) summary
    fn on_complete(&mut self, _session: &SessionAudit) {}

    /// Polled before each level
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Observer that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AuditObserver for NoopObserver {}

/// Cancellation through a `CancellationToken`, forwarding callbacks to an
/// inner observer
#[derive(Debug, Clone)]
pub struct TokenObserver<O: AuditObserver = NoopObserver> {
    token: CancellationToken,
    inner: O,
}

impl TokenObserver<NoopObserver> {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            inner: NoopObserver,
        }
    }
}

impl<O: AuditObserver> TokenObserver<O> {
    pub fn with_inner(token: CancellationToken, inner: O) -> Self {
        Self { token, inner }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn into_inner(self) -> O {
        self.inner
    }

    /// Cancel the token once `delay` has elapsed
    pub fn cancel_after(&self, delay: Duration) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(delay_ms = delay.as_millis() as u64, "Audit timeout reached, cancelling");
            token.cancel();
        })
    }
}

impl<O: AuditObserver> AuditObserver for TokenObserver<O> {
    fn on_session_start(&mut self, session: &SessionAudit) {
        self.inner.on_session_start(session);
    }

    fn on_level_start(&mut self, niveau: Niveau) {
        self.inner.on_level_start(niveau);
    }

    fn on_progress(&mut self, niveau: Niveau, index: usize, total: usize, reference: &str) {
        self.inner.on_progress(niveau, index, total, reference);
    }

    fn on_level_end(&mut self, niveau: Niveau, findings: &[ResultatControle]) {
        self.inner.on_level_end(niveau, findings);
    }

    fn on_complete(&mut self, session: &SessionAudit) {
        self.inner.on_complete(session);
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.inner.is_cancelled()
    }
}

/// Summary of a finding list with the configured score ceiling
pub fn compute_resume(findings: &[ResultatControle], blocking_ceiling: u8) -> ResumeAudit {
    ResumeAudit::from_findings(findings, blocking_ceiling)
}

/// Single-owner audit engine over one rule registry
#[derive(Debug, Clone)]
pub struct AuditRunner {
    registry: ControlRegistry,
}

impl AuditRunner {
    pub fn new(registry: ControlRegistry) -> Self {
        Self { registry }
    }

    /// Runner over the built-in catalogue
    pub fn standard() -> AuditResult<Self> {
        Ok(Self::new(ControlRegistry::standard()?.clone()))
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// New session in EN_ATTENTE
    pub fn start_session(
        &self,
        balance_id: impl Into<String>,
        exercice: impl Into<String>,
        phase: PhaseAudit,
    ) -> SessionAudit {
        SessionAudit::new(balance_id, exercice, phase)
    }

    /// Evaluate every active rule of the session's phase
    pub async fn run(
        &self,
        mut session: SessionAudit,
        ctx: &AuditContext,
        observer: &mut dyn AuditObserver,
    ) -> SessionAudit {
        let phase = session.phase;
        let ceiling = ctx.config.blocking_score_ceiling;

        if session.statut != StatutSession::EnAttente {
            let fault = AuditError::Session(format!(
                "session {} is {} (expected EN_ATTENTE)",
                session.id, session.statut
            ));
            return self.fail(session, fault, ceiling, observer);
        }
        if let Err(fault) = self.check_context(ctx, phase) {
            return self.fail(session, fault, ceiling, observer);
        }
        if let Err(fault) = session.transition_to(StatutSession::EnCours) {
            return self.fail(session, fault, ceiling, observer);
        }

        session.progression.total_controles = self.registry.active_count(phase);
        info!(
            session_id = %session.id,
            phase = %phase,
            exercice = %session.exercice,
            controls = session.progression.total_controles,
            "Starting audit session"
        );
        observer.on_session_start(&session);

        for &niveau in ControlRegistry::levels_for_phase(phase) {
            if observer.is_cancelled() {
                info!(
                    session_id = %session.id,
                    level = niveau.value(),
                    executed = session.progression.controles_executes,
                    "Audit cancelled"
                );
                return self.finish(session, StatutSession::Annulee, ceiling, observer);
            }

            let definitions = self.registry.for_level(niveau);
            if definitions.is_empty() {
                continue;
            }

            info!(session_id = %session.id, level = niveau.value(), controls = definitions.len(), "Level started");
            observer.on_level_start(niveau);
            let first = session.resultats.len();

            for (index, def) in definitions.iter().enumerate() {
                session.set_current(niveau, index);
                observer.on_progress(niveau, index, definitions.len(), def.reference);
                let findings = evaluate_guarded(def, ctx);
                debug!(
                    session_id = %session.id,
                    reference = def.reference,
                    findings = findings.len(),
                    "Control evaluated"
                );
                session.resultats.extend(findings);
                session.control_done();
            }

            let level_findings = &session.resultats[first..];
            info!(
                session_id = %session.id,
                level = niveau.value(),
                anomalies = level_findings.iter().filter(|f| f.is_anomalie()).count(),
                "Level completed"
            );
            observer.on_level_end(niveau, level_findings);
            tokio::task::yield_now().await;
        }

        self.finish(session, StatutSession::Terminee, ceiling, observer)
    }

    /// Run the statements and fiscal levels after a completed balance audit
    ///
    /// Produces a new PHASE_3 session whose results start with the balance
    /// audit's findings.
    pub async fn resume_phase3(
        &self,
        phase1: &SessionAudit,
        ctx: &AuditContext,
        observer: &mut dyn AuditObserver,
    ) -> SessionAudit {
        let mut session = self.start_session(phase1.balance_id.clone(), phase1.exercice.clone(), PhaseAudit::Phase3);
        let ceiling = ctx.config.blocking_score_ceiling;

        if phase1.statut != StatutSession::Terminee || phase1.phase == PhaseAudit::Phase3 {
            let fault = AuditError::Session(format!(
                "session {} must be a completed balance audit (found {} {})",
                phase1.id, phase1.phase, phase1.statut
            ));
            return self.fail(session, fault, ceiling, observer);
        }

        session.resultats = phase1.resultats.clone();
        self.run(session, ctx, observer).await
    }

    /// Audit a corrected re-import (PHASE_2) and compare it with the prior session
    pub async fn reimport_and_compare(
        &self,
        avant: &SessionAudit,
        balance_avant: &[BalanceEntry],
        balance_id: impl Into<String>,
        ctx: &AuditContext,
        observer: &mut dyn AuditObserver,
    ) -> (SessionAudit, RapportCorrection) {
        let session = self.start_session(balance_id, avant.exercice.clone(), PhaseAudit::Phase2);
        let apres = self.run(session, ctx, observer).await;
        let rapport = generate_correction_report(
            avant,
            &apres,
            balance_avant,
            &ctx.balance_n,
            ctx.config.tolerance,
        );
        (apres, rapport)
    }

    /// Context every active level of the phase relies on
    fn check_context(&self, ctx: &AuditContext, phase: PhaseAudit) -> AuditResult<()> {
        if self.registry.active_count(phase) == 0 {
            return Err(AuditError::Session(format!("no active control for {}", phase)));
        }
        for &niveau in ControlRegistry::levels_for_phase(phase) {
            if self.registry.for_level(niveau).is_empty() {
                continue;
            }
            let missing = match niveau {
                Niveau::Conformite if ctx.plan_comptable.is_empty() => Some("plan comptable vide"),
                Niveau::Conformite | Niveau::InterComptes | Niveau::EtatsFinanciers
                    if ctx.mapping.is_empty() =>
                {
                    Some("mapping SYSCOHADA vide")
                }
                _ => None,
            };
            if let Some(what) = missing {
                return Err(AuditError::MissingContext {
                    niveau: niveau.value(),
                    what: what.to_string(),
                });
            }
        }
        Ok(())
    }

    fn fail(
        &self,
        mut session: SessionAudit,
        fault: AuditError,
        ceiling: u8,
        observer: &mut dyn AuditObserver,
    ) -> SessionAudit {
        error!(session_id = %session.id, error = %fault, "Audit session fault");
        if session.is_terminal() {
            // Terminal states are absorbing; report without touching the session
            observer.on_complete(&session);
            return session;
        }
        session.erreur = Some(fault.to_string());
        if session.statut == StatutSession::EnAttente {
            if let Err(e) = session.transition_to(StatutSession::EnCours) {
                warn!(session_id = %session.id, error = %e, "Cannot start faulted session");
            }
        }
        self.finish(session, StatutSession::Erreur, ceiling, observer)
    }

    fn finish(
        &self,
        mut session: SessionAudit,
        statut: StatutSession,
        ceiling: u8,
        observer: &mut dyn AuditObserver,
    ) -> SessionAudit {
        session.refresh_resume(ceiling);
        if let Err(e) = session.transition_to(statut) {
            warn!(session_id = %session.id, error = %e, "Unexpected session transition");
        }
        info!(
            session_id = %session.id,
            statut = %session.statut,
            findings = session.resultats.len(),
            score = session.resume.score_global,
            bloquants = session.resume.bloquants_restants,
            "Audit session finished"
        );
        observer.on_complete(&session);
        session
    }
}

/// Evaluate one control, turning errors and panics into one ERREUR_EXEC finding
fn evaluate_guarded(def: &ControlDefinition, ctx: &AuditContext) -> Vec<ResultatControle> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| def.evaluate(ctx)))
        .unwrap_or_else(|payload| Err(ControlError::Panic(panic_message(payload.as_ref()))));

    let findings = match outcome {
        Ok(findings) if !findings.is_empty() => findings,
        Ok(_) => {
            warn!(reference = def.reference, "Control produced no finding");
            vec![def.meta().erreur_exec("Aucun resultat produit par le controle")]
        }
        Err(e) => {
            warn!(reference = def.reference, error = %e, "Control failed");
            vec![def.meta().erreur_exec(e.to_string())]
        }
    };
    findings.into_iter().map(|f| f.stamped(ctx.evaluated_at)).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
