use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Default capacity of the event channel wired up at startup.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates the event channel with the default capacity.
pub fn event_channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSender::new(tx), rx)
}

// Events emitted after a unit of work commits. Consumers must treat them as
// notifications; the ledger row is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockAdded {
        movement_id: Uuid,
        variation_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        balance_after: Decimal,
    },
    StockRemoved {
        movement_id: Uuid,
        variation_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        balance_after: Decimal,
    },
    StockTransferred {
        out_movement_id: Uuid,
        in_movement_id: Uuid,
        variation_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: Decimal,
    },
    StockVoided {
        original_movement_id: Uuid,
        reversal_movement_id: Uuid,
        variation_id: Uuid,
        location_id: Uuid,
    },

    CorrectionCreated(Uuid),
    CorrectionApproved {
        correction_id: Uuid,
        movement_id: Option<Uuid>,
    },
    CorrectionDeleted(Uuid),

    SerialUnitsReceived {
        variation_id: Uuid,
        location_id: Uuid,
        count: usize,
    },
    AuditRecorded {
        action: String,
        actor_id: Uuid,
        timestamp: DateTime<Utc>,
        detail: serde_json::Value,
    },
}

// Drains the channel and logs each event. A real deployment would fan these
// out to webhooks or a message bus; the write path never depends on it.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAdded {
                movement_id,
                variation_id,
                location_id,
                quantity,
                balance_after,
            } => {
                info!(
                    "Stock added: movement={}, variation={}, location={}, quantity={}, balance_after={}",
                    movement_id, variation_id, location_id, quantity, balance_after
                );
            }
            Event::StockRemoved {
                movement_id,
                variation_id,
                location_id,
                quantity,
                balance_after,
            } => {
                info!(
                    "Stock removed: movement={}, variation={}, location={}, quantity={}, balance_after={}",
                    movement_id, variation_id, location_id, quantity, balance_after
                );
                if balance_after < &Decimal::ZERO {
                    warn!(
                        "Negative balance after removal: variation={}, location={}, balance={}",
                        variation_id, location_id, balance_after
                    );
                }
            }
            Event::StockTransferred {
                variation_id,
                from_location_id,
                to_location_id,
                quantity,
                ..
            } => {
                info!(
                    "Stock transferred: variation={}, from={}, to={}, quantity={}",
                    variation_id, from_location_id, to_location_id, quantity
                );
            }
            Event::StockVoided {
                original_movement_id,
                reversal_movement_id,
                ..
            } => {
                info!(
                    "Stock movement voided: original={}, reversal={}",
                    original_movement_id, reversal_movement_id
                );
            }
            Event::CorrectionCreated(id) => {
                info!("Stock correction created: {}", id);
            }
            Event::CorrectionApproved {
                correction_id,
                movement_id,
            } => {
                info!(
                    "Stock correction approved: correction={}, movement={:?}",
                    correction_id, movement_id
                );
            }
            Event::CorrectionDeleted(id) => {
                info!("Stock correction deleted: {}", id);
            }
            Event::SerialUnitsReceived {
                variation_id,
                location_id,
                count,
            } => {
                info!(
                    "Serial units received: variation={}, location={}, count={}",
                    variation_id, location_id, count
                );
            }
            Event::AuditRecorded { action, actor_id, .. } => {
                info!("Audit recorded: action={}, actor={}", action, actor_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}
