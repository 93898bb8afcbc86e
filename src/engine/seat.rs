//! Hold/confirm/release state machine for a single seat.
//!
//! Everything here is synchronous and takes `now` explicitly; the caller
//! holds the seat's write lock for the duration of each call.

use crate::model::*;

use super::EngineError;

/// Result of a successful hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    pub token: HoldToken,
    /// Token of an expired-but-unswept hold this one replaced.
    pub superseded: Option<HoldToken>,
}

/// The hold a confirm is about to turn into a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmableHold {
    pub held_at: Ms,
    pub expires_at: Ms,
}

impl ConfirmableHold {
    pub fn span(&self) -> Span {
        Span::new(self.held_at, self.expires_at)
    }
}

impl SeatState {
    /// True if a new hold would succeed at `now`.
    pub fn is_holdable(&self, now: Ms) -> bool {
        match &self.status {
            SeatStatus::Available => true,
            SeatStatus::Held { expires_at, .. } => *expires_at <= now,
            SeatStatus::Booked { .. } => false,
        }
    }

    /// AVAILABLE → HELD. An expired hold that the reaper has not swept yet
    /// is treated as AVAILABLE and replaced under a fresh token.
    pub fn hold(
        &mut self,
        seat_id: &str,
        holder: &str,
        ttl_ms: Ms,
        now: Ms,
    ) -> Result<Placed, EngineError> {
        let superseded = match &self.status {
            SeatStatus::Available => None,
            SeatStatus::Held { token, expires_at, .. } if *expires_at <= now => Some(*token),
            SeatStatus::Held { .. } => return Err(EngineError::AlreadyHeld(seat_id.to_string())),
            SeatStatus::Booked { .. } => {
                return Err(EngineError::AlreadyBooked(seat_id.to_string()));
            }
        };

        self.last_token += 1;
        let token = self.last_token;
        self.status = SeatStatus::Held {
            holder: holder.to_string(),
            token,
            held_at: now,
            expires_at: now + ttl_ms,
        };
        Ok(Placed { token, superseded })
    }

    /// Validate that `holder` may confirm hold `token` at `now`, without
    /// changing anything.
    pub fn check_confirmable(
        &self,
        seat_id: &str,
        holder: &str,
        token: HoldToken,
        now: Ms,
    ) -> Result<ConfirmableHold, EngineError> {
        match &self.status {
            SeatStatus::Held {
                holder: h,
                token: t,
                held_at,
                expires_at,
            } if h == holder && *t == token => {
                if *expires_at <= now {
                    return Err(EngineError::ExpiredHold(seat_id.to_string()));
                }
                Ok(ConfirmableHold {
                    held_at: *held_at,
                    expires_at: *expires_at,
                })
            }
            _ => Err(EngineError::HoldNotFound(seat_id.to_string())),
        }
    }

    /// HELD → BOOKED, re-validating holder, token and expiry.
    pub fn confirm(
        &mut self,
        seat_id: &str,
        holder: &str,
        token: HoldToken,
        booking_id: BookingId,
        now: Ms,
    ) -> Result<ConfirmableHold, EngineError> {
        let hold = self.check_confirmable(seat_id, holder, token, now)?;
        self.status = SeatStatus::Booked { booking_id };
        Ok(hold)
    }

    /// HELD → AVAILABLE if holder and token match. Anything else is a
    /// silent no-op: this is what keeps stale expiry timers harmless.
    pub fn release_hold(&mut self, holder: &str, token: HoldToken) -> bool {
        match &self.status {
            SeatStatus::Held { holder: h, token: t, .. } if h == holder && *t == token => {
                self.status = SeatStatus::Available;
                true
            }
            _ => false,
        }
    }

    pub fn is_booked_by(&self, booking_id: BookingId) -> bool {
        matches!(&self.status, SeatStatus::Booked { booking_id: b } if *b == booking_id)
    }

    /// BOOKED(booking_id) → AVAILABLE.
    pub fn cancel_booking(&mut self, booking_id: BookingId) -> Result<(), EngineError> {
        if !self.is_booked_by(booking_id) {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        self.status = SeatStatus::Available;
        Ok(())
    }
}
