use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::{now_ms, validate_range};
use super::{Engine, EngineError};

impl Engine {
    pub fn get_booking(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        self.ledger.get(booking_id)
    }

    /// Every booking the holder ever made, cancelled ones included, oldest
    /// first.
    pub fn bookings_for_holder(&self, holder: &str) -> Vec<Booking> {
        self.ledger.for_holder(holder)
    }

    pub fn bookings_for_resource(&self, resource_id: &str) -> Result<Vec<Booking>, EngineError> {
        self.registry.get(resource_id)?;
        Ok(self.ledger.for_resource(resource_id))
    }

    /// Current state of a seat. A hold past its expiry is reported as
    /// `Available` even if the reaper has not swept it yet, matching what
    /// `hold_seat` would do.
    pub async fn seat_status(&self, resource_id: &str) -> Result<SeatStatus, EngineError> {
        let entry = self.registry.get(resource_id)?;
        entry.expect_kind(ResourceKind::Discrete)?;
        let guard = entry.state.read().await;
        let seat = guard.as_seat(resource_id)?;
        Ok(match &seat.status {
            SeatStatus::Held { expires_at, .. } if *expires_at <= now_ms() => SeatStatus::Available,
            status => status.clone(),
        })
    }

    /// Ids of all seats a new hold would succeed on right now, sorted.
    pub async fn available_seats(&self) -> Vec<ResourceId> {
        let now = now_ms();
        let mut out = Vec::new();
        for entry in self.registry.entries() {
            if entry.resource.kind != ResourceKind::Discrete {
                continue;
            }
            let guard = entry.state.read().await;
            if let ResourceState::Seat(seat) = &*guard
                && seat.is_holdable(now)
            {
                out.push(entry.resource.id.clone());
            }
        }
        out.sort();
        out
    }

    /// Free windows of a time-ranged resource within `[start, end)`.
    pub async fn availability(
        &self,
        resource_id: &str,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        let query = validate_range(start, end)?;
        if query.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let entry = self.registry.get(resource_id)?;
        entry.expect_kind(ResourceKind::TimeRanged)?;
        let guard = entry.state.read().await;
        Ok(free_windows(guard.as_timeline(resource_id)?, &query))
    }

    /// Mean rating over completed rentals of a resource; 0.0 when none.
    pub fn average_rating(&self, resource_id: &str) -> Result<f64, EngineError> {
        self.registry.get(resource_id)?;
        let ratings: Vec<f64> = self
            .ledger
            .for_resource(resource_id)
            .iter()
            .filter_map(|b| b.feedback.map(|f| f64::from(f.rating)))
            .collect();
        if ratings.is_empty() {
            return Ok(0.0);
        }
        Ok(ratings.iter().sum::<f64>() / ratings.len() as f64)
    }

    /// All registered resources, sorted by id.
    pub fn list_resources(&self) -> Vec<Resource> {
        let mut out: Vec<Resource> = self
            .registry
            .entries()
            .iter()
            .map(|e| e.resource.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
