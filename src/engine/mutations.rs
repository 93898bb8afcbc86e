use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;
use crate::payment::PaymentDetails;
use crate::reaper::HoldTimer;

use super::conflict::*;
use super::{count_conflict, Engine, EngineError};

impl Engine {
    // ── Discrete resources ───────────────────────────────────────

    /// AVAILABLE → HELD for `ttl`. Returns the token that confirm and
    /// release must present.
    pub async fn hold_seat(
        &self,
        resource_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<HoldToken, EngineError> {
        validate_holder(holder)?;
        let ttl_ms = validate_ttl(ttl)?;
        let entry = self.registry.get(resource_id)?;
        entry.expect_kind(ResourceKind::Discrete)?;

        let mut guard = entry.state.write().await;
        let seat = guard.as_seat_mut(resource_id)?;
        let now = now_ms();
        let placed = seat
            .hold(resource_id, holder, ttl_ms, now)
            .map_err(count_conflict)?;

        if let Some(old) = placed.superseded {
            self.reaper.cancel(resource_id, old);
        }
        self.reaper.schedule(
            HoldTimer {
                resource_id: resource_id.to_string(),
                holder: holder.to_string(),
                token: placed.token,
                fire_at: now + ttl_ms,
            },
            ttl,
        );
        drop(guard);

        if let Some(old) = placed.superseded {
            self.hold_released(resource_id, old, ReleaseReason::Expired);
        }
        debug!("hold {resource_id}#{} for {holder}, {ttl_ms}ms", placed.token);
        metrics::counter!(HOLDS_PLACED_TOTAL).increment(1);
        self.notify.send(Event::HoldPlaced {
            resource_id: resource_id.to_string(),
            holder: holder.to_string(),
            token: placed.token,
            expires_at: now + ttl_ms,
        });
        Ok(placed.token)
    }

    /// Hold several seats for one holder, all or nothing. Seats are locked
    /// one at a time; if any hold fails the ones already placed are
    /// released and the first error is returned.
    pub async fn hold_seats(
        &self,
        resource_ids: &[ResourceId],
        holder: &str,
        ttl: Duration,
    ) -> Result<Vec<(ResourceId, HoldToken)>, EngineError> {
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }
        if resource_ids.len() > MAX_SEATS_PER_HOLD {
            return Err(EngineError::LimitExceeded("too many seats in one hold"));
        }
        let mut seen = HashSet::new();
        if !resource_ids.iter().all(|id| seen.insert(id.as_str())) {
            return Err(EngineError::InvalidArgument("seat listed twice"));
        }

        let mut placed: Vec<(ResourceId, HoldToken)> = Vec::with_capacity(resource_ids.len());
        for id in resource_ids {
            match self.hold_seat(id, holder, ttl).await {
                Ok(token) => placed.push((id.clone(), token)),
                Err(e) => {
                    for (held_id, token) in &placed {
                        let undone = self
                            .release_with_reason(held_id, holder, *token, ReleaseReason::RolledBack)
                            .await;
                        if let Err(release_err) = undone {
                            warn!("rollback of {held_id}#{token} for {holder} failed: {release_err}");
                        }
                    }
                    debug!("multi-seat hold for {holder} rolled back at {id}: {e}");
                    return Err(e);
                }
            }
        }
        Ok(placed)
    }

    /// HELD → BOOKED.
    pub async fn confirm_seat(
        &self,
        resource_id: &str,
        holder: &str,
        token: HoldToken,
    ) -> Result<Booking, EngineError> {
        self.confirm_inner(resource_id, holder, token, None).await
    }

    /// HELD → BOOKED once the payment authorizer accepts the price. A
    /// declined payment leaves the hold untouched.
    pub async fn confirm_seat_paid(
        &self,
        resource_id: &str,
        holder: &str,
        token: HoldToken,
        payment: &PaymentDetails,
    ) -> Result<Booking, EngineError> {
        self.confirm_inner(resource_id, holder, token, Some(payment)).await
    }

    async fn confirm_inner(
        &self,
        resource_id: &str,
        holder: &str,
        token: HoldToken,
        payment: Option<&PaymentDetails>,
    ) -> Result<Booking, EngineError> {
        let entry = self.registry.get(resource_id)?;
        entry.expect_kind(ResourceKind::Discrete)?;

        // Authorize against a snapshot, without the lock; the commit below
        // re-checks holder, token and expiry.
        if let Some(payment) = payment {
            let hold = {
                let guard = entry.state.read().await;
                guard
                    .as_seat(resource_id)?
                    .check_confirmable(resource_id, holder, token, now_ms())
                    .map_err(count_conflict)?
            };
            let price = validate_price(self.price(&entry.resource, &hold.span()))?;
            self.authorize(resource_id, price, payment).await?;
        }

        let mut guard = entry.state.write().await;
        let seat = guard.as_seat_mut(resource_id)?;
        let now = now_ms();
        let hold = seat
            .check_confirmable(resource_id, holder, token, now)
            .map_err(count_conflict)?;
        let span = hold.span();
        let price = validate_price(self.price(&entry.resource, &span))?;

        let id = Ulid::new();
        seat.confirm(resource_id, holder, token, id, now)?;
        let booking = Booking {
            id,
            resource_id: resource_id.to_string(),
            kind: ResourceKind::Discrete,
            holder: holder.to_string(),
            span,
            price,
            created_at: now,
            status: BookingStatus::Active,
            feedback: None,
        };
        self.ledger.record(booking.clone());
        drop(guard);

        self.reaper.cancel(resource_id, token);
        self.booked(&booking);
        Ok(booking)
    }

    /// Explicitly give up a hold. Idempotent: a token that no longer
    /// matches (already released, expired, confirmed) is a no-op and
    /// returns false.
    pub async fn release_seat(
        &self,
        resource_id: &str,
        holder: &str,
        token: HoldToken,
    ) -> Result<bool, EngineError> {
        self.release_with_reason(resource_id, holder, token, ReleaseReason::Released)
            .await
    }

    async fn release_with_reason(
        &self,
        resource_id: &str,
        holder: &str,
        token: HoldToken,
        reason: ReleaseReason,
    ) -> Result<bool, EngineError> {
        let released = self.registry.release_hold(resource_id, holder, token).await?;
        if released {
            self.reaper.cancel(resource_id, token);
            self.hold_released(resource_id, token, reason);
        }
        Ok(released)
    }

    fn hold_released(&self, resource_id: &str, token: HoldToken, reason: ReleaseReason) {
        let label = match reason {
            ReleaseReason::Expired => "expired",
            ReleaseReason::Released => "released",
            ReleaseReason::RolledBack => "rolled_back",
        };
        metrics::counter!(HOLDS_RELEASED_TOTAL, "reason" => label).increment(1);
        self.notify.send(Event::HoldReleased {
            resource_id: resource_id.to_string(),
            token,
            reason,
        });
    }

    /// BOOKED → AVAILABLE. A booking can be cancelled once; later attempts
    /// fail with `BookingNotFound`.
    pub async fn cancel_seat_booking(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let booking = self.ledger.active(booking_id)?;
        if booking.kind != ResourceKind::Discrete {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        let entry = self.registry.get(&booking.resource_id)?;
        let mut guard = entry.state.write().await;
        let seat = guard.as_seat_mut(&booking.resource_id)?;
        if !seat.is_booked_by(booking_id) {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        // Ledger first: it is the one that refuses a second cancel
        self.ledger.cancel(booking_id)?;
        seat.cancel_booking(booking_id)?;
        drop(guard);

        self.cancelled(&booking);
        Ok(())
    }

    // ── Continuous resources ─────────────────────────────────────

    /// Claim `[start, end)` on a continuous resource.
    pub async fn book_time_range(
        &self,
        resource_id: &str,
        holder: &str,
        start: Ms,
        end: Ms,
    ) -> Result<Booking, EngineError> {
        self.book_inner(resource_id, holder, start, end, None).await
    }

    /// Like `book_time_range`, gated on the payment authorizer.
    pub async fn book_time_range_paid(
        &self,
        resource_id: &str,
        holder: &str,
        start: Ms,
        end: Ms,
        payment: &PaymentDetails,
    ) -> Result<Booking, EngineError> {
        self.book_inner(resource_id, holder, start, end, Some(payment))
            .await
    }

    async fn book_inner(
        &self,
        resource_id: &str,
        holder: &str,
        start: Ms,
        end: Ms,
        payment: Option<&PaymentDetails>,
    ) -> Result<Booking, EngineError> {
        validate_holder(holder)?;
        let entry = self.registry.get(resource_id)?;
        entry.expect_kind(ResourceKind::TimeRanged)?;
        let span = validate_range(start, end)?;
        let price = validate_price(self.price(&entry.resource, &span))?;

        if let Some(payment) = payment {
            {
                let guard = entry.state.read().await;
                check_no_overlap(guard.as_timeline(resource_id)?, &span).map_err(count_conflict)?;
            }
            self.authorize(resource_id, price, payment).await?;
        }

        let mut guard = entry.state.write().await;
        let timeline = guard.as_timeline_mut(resource_id)?;
        check_no_overlap(timeline, &span).map_err(count_conflict)?;
        check_claim_room(timeline)?;

        let id = Ulid::new();
        timeline.insert_claim(Claim { booking_id: id, span });
        let booking = Booking {
            id,
            resource_id: resource_id.to_string(),
            kind: ResourceKind::TimeRanged,
            holder: holder.to_string(),
            span,
            price,
            created_at: now_ms(),
            status: BookingStatus::Active,
            feedback: None,
        };
        self.ledger.record(booking.clone());
        drop(guard);

        self.booked(&booking);
        Ok(booking)
    }

    /// Remove the claim and cancel the booking. Not idempotent.
    pub async fn cancel_time_range_booking(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let booking = self.ledger.active(booking_id)?;
        if booking.kind != ResourceKind::TimeRanged {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        let entry = self.registry.get(&booking.resource_id)?;
        let mut guard = entry.state.write().await;
        let timeline = guard.as_timeline_mut(&booking.resource_id)?;
        if !timeline.contains(booking_id) {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        self.ledger.cancel(booking_id)?;
        timeline.remove_claim(booking_id);
        drop(guard);

        self.cancelled(&booking);
        Ok(())
    }

    /// Record trip feedback on an active rental.
    pub async fn complete_booking(
        &self,
        booking_id: BookingId,
        rating: u8,
        distance_km: f64,
    ) -> Result<Booking, EngineError> {
        if !(1..=5).contains(&rating) {
            return Err(EngineError::InvalidFeedback("rating must be between 1 and 5"));
        }
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(EngineError::InvalidFeedback("distance must be a non-negative number"));
        }
        let booking = self.ledger.active(booking_id)?;
        if booking.kind != ResourceKind::TimeRanged {
            return Err(EngineError::InvalidFeedback("only rentals can be completed"));
        }
        let entry = self.registry.get(&booking.resource_id)?;
        let _guard = entry.state.write().await;
        let booking = self
            .ledger
            .set_feedback(booking_id, Feedback { rating, distance_km })?;
        info!("booking {booking_id} completed with rating {rating}, {distance_km:.2} km");
        Ok(booking)
    }

    // ── Shared bookkeeping ───────────────────────────────────────

    fn booked(&self, booking: &Booking) {
        info!(
            "booked {} for {} as {} (price {})",
            booking.resource_id, booking.holder, booking.id, booking.price
        );
        metrics::counter!(BOOKINGS_CONFIRMED_TOTAL, "kind" => kind_label(booking.kind)).increment(1);
        self.notify.send(Event::BookingConfirmed {
            resource_id: booking.resource_id.clone(),
            booking_id: booking.id,
            holder: booking.holder.clone(),
        });
        self.dispatch_notice(booking);
    }

    fn cancelled(&self, booking: &Booking) {
        info!("cancelled booking {} on {}", booking.id, booking.resource_id);
        metrics::counter!(BOOKINGS_CANCELLED_TOTAL, "kind" => kind_label(booking.kind)).increment(1);
        self.notify.send(Event::BookingCancelled {
            resource_id: booking.resource_id.clone(),
            booking_id: booking.id,
        });
    }
}

fn kind_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Discrete => "seat",
        ResourceKind::TimeRanged => "time_range",
    }
}
