mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod registry;
mod seat;

pub use availability::{free_windows, subtract_intervals};
#[cfg(test)]
pub(crate) use conflict::now_ms;
pub use error::{EngineError, ErrorCategory};
pub use registry::{Registry, ResourceEntry, SharedResource};
pub use seat::{ConfirmableHold, Placed};

use std::sync::Arc;

use crate::ledger::BookingLedger;
use crate::model::*;
use crate::notify::{BookingNotice, LogNotifier, Notifier, NotifyHub};
use crate::payment::{AcceptAll, PaymentAuthorizer};
use crate::pricing::{FlatRate, PerDay, PricingStrategy};
use crate::reaper::HoldReaper;

/// The reservation façade. Every caller-visible operation lives here; see
/// `mutations.rs` and `queries.rs`.
pub struct Engine {
    pub(super) registry: Arc<Registry>,
    pub(super) ledger: BookingLedger,
    pub(super) reaper: HoldReaper,
    pub notify: Arc<NotifyHub>,
    seat_pricing: Arc<dyn PricingStrategy>,
    range_pricing: Arc<dyn PricingStrategy>,
    payments: Arc<dyn PaymentAuthorizer>,
    notifier: Arc<dyn Notifier>,
}

/// Collaborators the engine is wired with. Defaults: flat seat pricing,
/// per-day range pricing, every payment accepted, notices logged.
pub struct EngineBuilder {
    seat_pricing: Arc<dyn PricingStrategy>,
    range_pricing: Arc<dyn PricingStrategy>,
    payments: Arc<dyn PaymentAuthorizer>,
    notifier: Arc<dyn Notifier>,
    resources: Vec<Resource>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            seat_pricing: Arc::new(FlatRate),
            range_pricing: Arc::new(PerDay),
            payments: Arc::new(AcceptAll),
            notifier: Arc::new(LogNotifier),
            resources: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn seat_pricing(mut self, strategy: Arc<dyn PricingStrategy>) -> Self {
        self.seat_pricing = strategy;
        self
    }

    pub fn range_pricing(mut self, strategy: Arc<dyn PricingStrategy>) -> Self {
        self.range_pricing = strategy;
        self
    }

    pub fn payments(mut self, authorizer: Arc<dyn PaymentAuthorizer>) -> Self {
        self.payments = authorizer;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Resources registered during `build`.
    pub fn resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Build the engine and spawn its hold reaper. Must be called inside a
    /// tokio runtime.
    pub fn build(mut self) -> Result<Engine, EngineError> {
        let resources = std::mem::take(&mut self.resources);
        let engine = self.build_empty();
        for resource in resources {
            engine.register(resource)?;
        }
        Ok(engine)
    }

    fn build_empty(self) -> Engine {
        let registry = Arc::new(Registry::new());
        let notify = Arc::new(NotifyHub::new());
        let reaper = HoldReaper::spawn(registry.clone(), notify.clone());
        Engine {
            registry,
            ledger: BookingLedger::new(),
            reaper,
            notify,
            seat_pricing: self.seat_pricing,
            range_pricing: self.range_pricing,
            payments: self.payments,
            notifier: self.notifier,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Engine with default collaborators and no resources. Must be called
    /// inside a tokio runtime.
    pub fn new() -> Self {
        Self::builder().build_empty()
    }

    pub fn register(&self, resource: Resource) -> Result<(), EngineError> {
        let id = resource.id.clone();
        let kind = resource.kind;
        self.registry.register(resource)?;
        tracing::debug!("registered {kind} resource {id}");
        Ok(())
    }

    pub fn resource(&self, id: &str) -> Result<Resource, EngineError> {
        Ok(self.registry.get(id)?.resource.clone())
    }

    pub(super) fn price(&self, resource: &Resource, span: &Span) -> Money {
        match resource.kind {
            ResourceKind::Discrete => self.seat_pricing.price(resource, span),
            ResourceKind::TimeRanged => self.range_pricing.price(resource, span),
        }
    }

    pub(super) async fn authorize(
        &self,
        resource_id: &str,
        amount: Money,
        payment: &crate::payment::PaymentDetails,
    ) -> Result<(), EngineError> {
        if self.payments.authorize(amount, payment).await {
            return Ok(());
        }
        tracing::warn!("payment of {amount} declined for {resource_id}");
        metrics::counter!(crate::observability::PAYMENTS_DECLINED_TOTAL).increment(1);
        Err(EngineError::PaymentDeclined {
            resource_id: resource_id.to_string(),
            amount,
        })
    }

    /// Fire-and-forget delivery of a booking notice.
    pub(super) fn dispatch_notice(&self, booking: &Booking) {
        let notifier = self.notifier.clone();
        let notice = BookingNotice {
            holder: booking.holder.clone(),
            booking_id: booking.id,
            resource_id: booking.resource_id.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.booking_confirmed(&notice).await {
                tracing::warn!("notice for booking {} not delivered: {e}", notice.booking_id);
            }
        });
    }
}

/// Record a conflict for metrics and pass the error through.
pub(super) fn count_conflict(err: EngineError) -> EngineError {
    metrics::counter!(crate::observability::CONFLICTS_TOTAL, "reason" => err.code()).increment(1);
    err
}
