//! Audit event types and the broadcast `EventBus`
//!
//! Progress of a running audit session is published as `AuditEvent`s so that
//! presentation layers can follow a run without sharing the session itself.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Audit progress events
///
/// Serialized with a `type` tag so they can be forwarded as-is to any
/// JSON consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditEvent {
    /// Session moved to EN_COURS
    SessionStarted {
        session_id: Uuid,
        exercice: String,
        /// Phase code (`PHASE_1`, `PHASE_2`, `PHASE_3`)
        phase: String,
        total_controles: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A level is about to be evaluated
    LevelStarted {
        session_id: Uuid,
        niveau: u8,
        nom: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A control is about to be evaluated
    ControlProgress {
        session_id: Uuid,
        niveau: u8,
        /// 0-based index within the level
        index: usize,
        total_niveau: usize,
        reference: String,
    },

    /// All controls of a level have been evaluated
    LevelCompleted {
        session_id: Uuid,
        niveau: u8,
        findings: usize,
        ok: usize,
        anomalies: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached a terminal state
    SessionCompleted {
        session_id: Uuid,
        /// Terminal status code (`TERMINEE`, `ANNULEE`, `ERREUR`)
        statut: String,
        total: usize,
        score_global: u8,
        bloquants_restants: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AuditEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            AuditEvent::SessionStarted { session_id, .. }
            | AuditEvent::LevelStarted { session_id, .. }
            | AuditEvent::ControlProgress { session_id, .. }
            | AuditEvent::LevelCompleted { session_id, .. }
            | AuditEvent::SessionCompleted { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for audit events
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuditEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AuditEvent,
    ) -> Result<usize, broadcast::error::SendError<AuditEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AuditEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_started(session_id: Uuid) -> AuditEvent {
        AuditEvent::LevelStarted {
            session_id,
            niveau: 1,
            nom: "Controles fondamentaux".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(level_started(Uuid::new_v4())).is_err());
        // Lossy variant never fails
        bus.emit_lossy(level_started(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        assert_eq!(bus.emit(level_started(session_id)).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id(), session_id);
        assert!(matches!(received, AuditEvent::LevelStarted { niveau: 1, .. }));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AuditEvent::ControlProgress {
            session_id: Uuid::nil(),
            niveau: 0,
            index: 2,
            total_niveau: 10,
            reference: "S-003".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ControlProgress");
        assert_eq!(json["reference"], "S-003");
    }

    #[test]
    fn test_capacity_and_subscriber_count() {
        let bus = EventBus::new(42);
        assert_eq!(bus.capacity(), 42);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
