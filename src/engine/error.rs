use thiserror::Error;

use crate::model::{BookingId, Money, ResourceId, ResourceKind};

/// The four families every engine failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    StateConflict,
    Overlap,
    Validation,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::StateConflict => "state_conflict",
            ErrorCategory::Overlap => "overlap",
            ErrorCategory::Validation => "validation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),

    #[error("resource already exists: {0}")]
    DuplicateResource(ResourceId),
    #[error("{0} is already held")]
    AlreadyHeld(ResourceId),
    #[error("{0} is already booked")]
    AlreadyBooked(ResourceId),
    #[error("no matching hold on {0}")]
    HoldNotFound(ResourceId),
    #[error("hold on {0} has expired")]
    ExpiredHold(ResourceId),
    #[error("payment of {amount} declined for {resource_id}")]
    PaymentDeclined { resource_id: ResourceId, amount: Money },

    #[error("overlaps booking {0}")]
    Overlap(BookingId),

    #[error("hold ttl must be between 1ms and the configured maximum")]
    InvalidTtl,
    #[error("invalid range [{start}, {end}): start must be before end")]
    InvalidRange { start: i64, end: i64 },
    #[error("pricing produced a negative price: {0}")]
    NegativePrice(Money),
    #[error("{id} is not a {expected} resource")]
    WrongKind { id: ResourceId, expected: ResourceKind },
    #[error("invalid feedback: {0}")]
    InvalidFeedback(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::ResourceNotFound(_) | EngineError::BookingNotFound(_) => {
                ErrorCategory::NotFound
            }
            EngineError::DuplicateResource(_)
            | EngineError::AlreadyHeld(_)
            | EngineError::AlreadyBooked(_)
            | EngineError::HoldNotFound(_)
            | EngineError::ExpiredHold(_)
            | EngineError::PaymentDeclined { .. } => ErrorCategory::StateConflict,
            EngineError::Overlap(_) => ErrorCategory::Overlap,
            EngineError::InvalidTtl
            | EngineError::InvalidRange { .. }
            | EngineError::NegativePrice(_)
            | EngineError::WrongKind { .. }
            | EngineError::InvalidFeedback(_)
            | EngineError::InvalidArgument(_)
            | EngineError::LimitExceeded(_) => ErrorCategory::Validation,
        }
    }

    /// Stable snake_case code, used on the wire and as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ResourceNotFound(_) => "resource_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::DuplicateResource(_) => "duplicate_resource",
            EngineError::AlreadyHeld(_) => "already_held",
            EngineError::AlreadyBooked(_) => "already_booked",
            EngineError::HoldNotFound(_) => "hold_not_found",
            EngineError::ExpiredHold(_) => "expired_hold",
            EngineError::PaymentDeclined { .. } => "payment_declined",
            EngineError::Overlap(_) => "overlap",
            EngineError::InvalidTtl => "invalid_ttl",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::NegativePrice(_) => "negative_price",
            EngineError::WrongKind { .. } => "wrong_kind",
            EngineError::InvalidFeedback(_) => "invalid_feedback",
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn categories() {
        assert_eq!(
            EngineError::ResourceNotFound("x".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            EngineError::ExpiredHold("x".into()).category(),
            ErrorCategory::StateConflict
        );
        assert_eq!(
            EngineError::PaymentDeclined { resource_id: "x".into(), amount: 10 }.category(),
            ErrorCategory::StateConflict
        );
        assert_eq!(EngineError::Overlap(Ulid::new()).category(), ErrorCategory::Overlap);
        assert_eq!(
            EngineError::InvalidRange { start: 5, end: 5 }.category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn overlap_message_names_booking() {
        let id = Ulid::new();
        assert_eq!(EngineError::Overlap(id).to_string(), format!("overlaps booking {id}"));
    }
}
