//! Bridge between runner callbacks and the `EventBus`
//!
//! `EventBridge` is an `AuditObserver` publishing every callback as an
//! `AuditEvent`. `log_events` is the matching consumer task used by the CLI.

use crate::models::{Niveau, ResultatControle, SessionAudit, StatutControle};
use crate::runner::AuditObserver;
use chrono::Utc;
use fisca_common::events::{AuditEvent, EventBus};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Observer forwarding progress to an `EventBus`
///
/// Emission is lossy: a run without subscribers behaves exactly like one with.
#[derive(Debug, Clone)]
pub struct EventBridge {
    bus: EventBus,
    session_id: Uuid,
}

impl EventBridge {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            session_id: Uuid::nil(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl AuditObserver for EventBridge {
    fn on_session_start(&mut self, session: &SessionAudit) {
        self.session_id = session.id;
        self.bus.emit_lossy(AuditEvent::SessionStarted {
            session_id: session.id,
            exercice: session.exercice.clone(),
            phase: session.phase.as_str().to_string(),
            total_controles: session.progression.total_controles,
            timestamp: Utc::now(),
        });
    }

    fn on_level_start(&mut self, niveau: Niveau) {
        self.bus.emit_lossy(AuditEvent::LevelStarted {
            session_id: self.session_id,
            niveau: niveau.value(),
            nom: niveau.name().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn on_progress(&mut self, niveau: Niveau, index: usize, total: usize, reference: &str) {
        self.bus.emit_lossy(AuditEvent::ControlProgress {
            session_id: self.session_id,
            niveau: niveau.value(),
            index,
            total_niveau: total,
            reference: reference.to_string(),
        });
    }

    fn on_level_end(&mut self, niveau: Niveau, findings: &[ResultatControle]) {
        self.bus.emit_lossy(AuditEvent::LevelCompleted {
            session_id: self.session_id,
            niveau: niveau.value(),
            findings: findings.len(),
            ok: findings.iter().filter(|f| f.statut == StatutControle::Ok).count(),
            anomalies: findings.iter().filter(|f| f.is_anomalie()).count(),
            timestamp: Utc::now(),
        });
    }

    fn on_complete(&mut self, session: &SessionAudit) {
        self.bus.emit_lossy(AuditEvent::SessionCompleted {
            session_id: session.id,
            statut: session.statut.as_str().to_string(),
            total: session.resume.total_controles,
            score_global: session.resume.score_global,
            bloquants_restants: session.resume.bloquants_restants,
            timestamp: Utc::now(),
        });
    }
}

/// Log every event until the bus is dropped
///
/// Returns the number of events received. Lagged events are skipped.
pub async fn log_events(mut rx: broadcast::Receiver<AuditEvent>) -> usize {
    let mut received = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                received += 1;
                match &event {
                    AuditEvent::LevelStarted { niveau, nom, .. } => {
                        info!(level = niveau, "Niveau {} - {}", niveau, nom);
                    }
                    AuditEvent::SessionCompleted {
                        statut, score_global, ..
                    } => {
                        info!(statut = %statut, score = score_global, "Audit termine");
                    }
                    other => debug!(event = ?other, "Audit event"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind the audit");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuditContext;
    use crate::models::{BalanceEntry, PhaseAudit};
    use crate::runner::AuditRunner;

    #[tokio::test]
    async fn test_bridge_emits_lifecycle_events() {
        let bus = EventBus::new(1024);
        let mut rx = bus.subscribe();
        let runner = AuditRunner::standard().unwrap();
        let ctx = AuditContext::builder(vec![
            BalanceEntry::new("101000", "Capital", 0.0, 1000.0, 0.0, 1000.0),
            BalanceEntry::new("521000", "Banque", 1000.0, 0.0, 1000.0, 0.0),
        ])
        .exercice("2024")
        .build();

        let mut bridge = EventBridge::new(bus.clone());
        let session = runner
            .run(runner.start_session("bal", "2024", PhaseAudit::Phase1), &ctx, &mut bridge)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(AuditEvent::SessionStarted { .. })));
        match events.last() {
            Some(AuditEvent::SessionCompleted { statut, score_global, .. }) => {
                assert_eq!(statut, "TERMINEE");
                assert_eq!(*score_global, session.resume.score_global);
            }
            other => panic!("unexpected last event {:?}", other),
        }
        let progress = events
            .iter()
            .filter(|e| matches!(e, AuditEvent::ControlProgress { .. }))
            .count();
        assert_eq!(progress, session.progression.total_controles);
        assert!(events.iter().all(|e| e.session_id() == session.id));
    }

    #[tokio::test]
    async fn test_logger_stops_when_bus_dropped() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let mut bridge = EventBridge::new(bus);
        bridge.on_level_start(Niveau::Structurel);
        bridge.on_level_start(Niveau::Fondamental);
        drop(bridge);
        assert_eq!(log_events(rx).await, 2);
    }
}
