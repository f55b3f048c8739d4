// Events emitted by the tray component to downstream consumers
//
// Delivery is synchronous, on the caller's thread, in registration order -
// a slow subscriber stalls the caller by contract. Within a single
// update_result call, ResultProcessed always fires before TrayCompleted.
// Using a tagged enum keeps exported JSON self-describing:
// {"type": "result_processed", ...}

use crate::model::Tray;
use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of one processed result, also attached to TrayCompleted when a
/// result write was what finished the tray
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub position: Position,
    pub result: String,
    pub image_path: Option<String>,
    pub detection_time: DateTime<Utc>,
}

/// Main event type that flows out of the tray component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrayEvent {
    /// A result was validated, stored and persisted
    ResultProcessed {
        position: Position,
        result: String,
        image_path: Option<String>,
        detection_time: DateTime<Utc>,
    },

    /// A tray finished, either by filling its last slot or explicitly.
    /// `last_result` is present only on the auto-completion path.
    TrayCompleted {
        tray: Tray,
        last_result: Option<ResultPayload>,
    },

    /// A write-path operation failed; carries whatever context was available
    Error {
        timestamp: DateTime<Utc>,
        message: String,
        position: Option<Position>,
        result: Option<String>,
        detection_time: Option<DateTime<Utc>>,
    },

    /// An operator asked to re-inspect one slot; no state was mutated
    ManualRetestRequested {
        position: Position,
        timestamp: DateTime<Utc>,
    },
}

impl TrayEvent {
    /// Short variant name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TrayEvent::ResultProcessed { .. } => "result_processed",
            TrayEvent::TrayCompleted { .. } => "tray_completed",
            TrayEvent::Error { .. } => "error",
            TrayEvent::ManualRetestRequested { .. } => "manual_retest_requested",
        }
    }
}

/// Boxed observer callback
pub type EventHandler = Box<dyn Fn(&TrayEvent) + Send>;

/// Synchronous observer registry
///
/// Handlers are called in registration order on the emitting thread. There
/// is no unsubscribe: subscribers live as long as the component, which
/// matches the single-pipeline process model this core targets.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; called for every subsequent event
    pub fn subscribe(&mut self, handler: impl Fn(&TrayEvent) + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Deliver an event to all observers, in registration order
    pub fn emit(&self, event: &TrayEvent) {
        tracing::trace!(
            event = event.name(),
            observers = self.handlers.len(),
            "dispatching event"
        );
        for handler in &self.handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().unwrap().push(tag));
        }

        bus.emit(&TrayEvent::ManualRetestRequested {
            position: Position::new(1, 1),
            timestamp: Utc::now(),
        });

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn events_serialize_tagged() {
        let event = TrayEvent::ResultProcessed {
            position: Position::new(2, 1),
            result: "OK".into(),
            image_path: None,
            detection_time: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result_processed");
        assert_eq!(json["position"], "2_1");
    }
}
