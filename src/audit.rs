use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::events::{Event, EventSender};

/// Best-effort audit trail emitter. Every mutating operation records what it
/// did and who did it; a failed emit is logged and never fails the operation.
#[derive(Debug, Clone)]
pub struct AuditEmitter {
    events: EventSender,
}

impl AuditEmitter {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub async fn record(&self, action: &str, actor_id: Uuid, detail: serde_json::Value) {
        let event = Event::AuditRecorded {
            action: action.to_string(),
            actor_id,
            timestamp: Utc::now(),
            detail,
        };

        if let Err(e) = self.events.send(event).await {
            warn!("Failed to emit audit event for action '{}': {}", action, e);
        }
    }

    /// Records a state change with before/after snapshots.
    pub async fn record_change(
        &self,
        action: &str,
        actor_id: Uuid,
        before: serde_json::Value,
        after: serde_json::Value,
    ) {
        self.record(action, actor_id, json!({ "before": before, "after": after }))
            .await;
    }
}
