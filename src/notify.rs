use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{BookingId, Event, HolderId, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-resource state-change events.
#[derive(Debug, Default)]
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, event: Event) {
        if let Some(sender) = self.channels.get(event.resource_id()) {
            let _ = sender.send(event);
        }
    }
}

// ── Outbound notifications ───────────────────────────────────────

/// Payload handed to the notification dispatcher after a booking succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingNotice {
    pub holder: HolderId,
    pub booking_id: BookingId,
    pub resource_id: ResourceId,
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Email/SMS delivery. Invoked fire-and-forget; failures are logged and
/// never affect the booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, notice: &BookingNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_confirmed(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        tracing::info!(
            holder = %notice.holder,
            booking_id = %notice.booking_id,
            resource_id = %notice.resource_id,
            "booking confirmed notice"
        );
        Ok(())
    }
}
