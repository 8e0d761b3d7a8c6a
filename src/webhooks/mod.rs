//! Webhook delivery subsystem.
//!
//! The ledger hands domain events to an unbounded channel; a worker task
//! owns fan-out so the request that triggered a state change never waits
//! on delivery. Per-endpoint delivery tasks walk the retry ladder
//! independently.

mod dispatcher;
mod retry;

pub use dispatcher::{Dispatcher, EVENT_HEADER, SIGNATURE_HEADER};
pub use retry::RetryPolicy;

use tokio::sync::mpsc;

use crate::events::DomainEvent;

/// Cheap handle for emitting domain events into the dispatcher worker.
#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<DomainEvent>);

impl EventSender {
    /// Queue an event for delivery. Never blocks and never fails the
    /// caller; a closed worker is logged and the event dropped, since
    /// delivery is best-effort relative to the committed state change.
    pub fn send(&self, event: DomainEvent) {
        if let Err(e) = self.0.send(event) {
            tracing::warn!("webhook worker gone, dropping {} event", e.0.event_type);
        }
    }

    /// A sender with no worker behind it, for tests and CLI paths that
    /// do not deliver webhooks.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self(tx)
    }
}

/// Spawn the dispatcher worker and return the sender half.
pub fn spawn_dispatcher(dispatcher: Dispatcher) -> EventSender {
    let (tx, mut rx) = mpsc::unbounded_channel::<DomainEvent>();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tracing::debug!(
                "dispatching {} for merchant {}",
                event.event_type,
                event.merchant_id
            );
            // Handles are detached: each endpoint delivery owns its own
            // retry schedule.
            let _ = dispatcher.dispatch(&event);
        }
        tracing::info!("webhook dispatcher worker stopped");
    });

    EventSender(tx)
}
