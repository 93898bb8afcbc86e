use dashmap::DashMap;

use crate::engine::EngineError;
use crate::model::*;

/// Authoritative record of bookings. Lives behind its own concurrent map,
/// independent of the per-resource locks.
///
/// The engine only mutates a booking while holding the write lock of the
/// booking's resource, so check-then-act sequences on one booking are
/// serialized even though the map itself is shared.
#[derive(Debug, Default)]
pub struct BookingLedger {
    bookings: DashMap<BookingId, Booking>,
    by_holder: DashMap<HolderId, Vec<BookingId>>,
    by_resource: DashMap<ResourceId, Vec<BookingId>>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, booking: Booking) {
        self.by_holder
            .entry(booking.holder.clone())
            .or_default()
            .push(booking.id);
        self.by_resource
            .entry(booking.resource_id.clone())
            .or_default()
            .push(booking.id);
        self.bookings.insert(booking.id, booking);
    }

    pub fn get(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.bookings
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::BookingNotFound(id))
    }

    /// Like `get`, but a cancelled booking counts as not found.
    pub fn active(&self, id: BookingId) -> Result<Booking, EngineError> {
        let booking = self.get(id)?;
        if !booking.is_active() {
            return Err(EngineError::BookingNotFound(id));
        }
        Ok(booking)
    }

    /// ACTIVE → CANCELLED. Not idempotent: a second cancel is an error.
    pub fn cancel(&self, id: BookingId) -> Result<Booking, EngineError> {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if !entry.is_active() {
            return Err(EngineError::BookingNotFound(id));
        }
        entry.status = BookingStatus::Cancelled;
        Ok(entry.clone())
    }

    pub fn set_feedback(&self, id: BookingId, feedback: Feedback) -> Result<Booking, EngineError> {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if !entry.is_active() {
            return Err(EngineError::BookingNotFound(id));
        }
        entry.feedback = Some(feedback);
        Ok(entry.clone())
    }

    pub fn for_holder(&self, holder: &str) -> Vec<Booking> {
        let ids = self
            .by_holder
            .get(holder)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.collect(&ids)
    }

    pub fn for_resource(&self, resource_id: &str) -> Vec<Booking> {
        let ids = self
            .by_resource
            .get(resource_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.collect(&ids)
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    fn collect(&self, ids: &[BookingId]) -> Vec<Booking> {
        let mut out: Vec<Booking> = ids
            .iter()
            .filter_map(|id| self.bookings.get(id).map(|b| b.value().clone()))
            .collect();
        out.sort_by_key(|b| (b.created_at, b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn booking(resource: &str, holder: &str, created_at: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: resource.into(),
            kind: ResourceKind::TimeRanged,
            holder: holder.into(),
            span: Span::new(0, DAY_MS),
            price: 100,
            created_at,
            status: BookingStatus::Active,
            feedback: None,
        }
    }

    #[test]
    fn record_and_get() {
        let ledger = BookingLedger::new();
        let b = booking("VEH-7", "cust1", 1);
        ledger.record(b.clone());
        assert_eq!(ledger.get(b.id).unwrap(), b);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn unknown_booking() {
        let ledger = BookingLedger::new();
        let id = Ulid::new();
        assert_eq!(ledger.get(id), Err(EngineError::BookingNotFound(id)));
        assert_eq!(ledger.cancel(id), Err(EngineError::BookingNotFound(id)));
    }

    #[test]
    fn cancel_is_single_use() {
        let ledger = BookingLedger::new();
        let b = booking("VEH-7", "cust1", 1);
        ledger.record(b.clone());

        let cancelled = ledger.cancel(b.id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(ledger.cancel(b.id), Err(EngineError::BookingNotFound(b.id)));
        assert_eq!(ledger.active(b.id), Err(EngineError::BookingNotFound(b.id)));
        // Still visible for lookup
        assert_eq!(ledger.get(b.id).unwrap().status, BookingStatus::Cancelled);
    }

    #[test]
    fn feedback_only_on_active() {
        let ledger = BookingLedger::new();
        let b = booking("VEH-7", "cust1", 1);
        ledger.record(b.clone());
        let fb = Feedback { rating: 4, distance_km: 120.5 };
        assert_eq!(ledger.set_feedback(b.id, fb).unwrap().feedback, Some(fb));
        ledger.cancel(b.id).unwrap();
        assert!(ledger.set_feedback(b.id, fb).is_err());
    }

    #[test]
    fn indexes_sorted_by_creation() {
        let ledger = BookingLedger::new();
        let late = booking("VEH-7", "cust1", 20);
        let early = booking("VEH-7", "cust1", 10);
        let other = booking("VEH-8", "cust2", 15);
        ledger.record(late.clone());
        ledger.record(early.clone());
        ledger.record(other.clone());

        let mine: Vec<BookingId> = ledger.for_holder("cust1").iter().map(|b| b.id).collect();
        assert_eq!(mine, vec![early.id, late.id]);
        assert_eq!(ledger.for_resource("VEH-8"), vec![other]);
        assert!(ledger.for_holder("nobody").is_empty());
    }
}
