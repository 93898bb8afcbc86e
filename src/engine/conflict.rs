use std::time::Duration;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidRange { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

pub(crate) fn validate_ttl(ttl: Duration) -> Result<Ms, EngineError> {
    let ms = Ms::try_from(ttl.as_millis()).map_err(|_| EngineError::InvalidTtl)?;
    if ms <= 0 || ms > MAX_HOLD_TTL_MS {
        return Err(EngineError::InvalidTtl);
    }
    Ok(ms)
}

pub(crate) fn validate_holder(holder: &str) -> Result<(), EngineError> {
    if holder.is_empty() {
        return Err(EngineError::InvalidArgument("holder id must not be empty"));
    }
    if holder.len() > MAX_HOLDER_LEN {
        return Err(EngineError::LimitExceeded("holder id too long"));
    }
    Ok(())
}

pub(crate) fn validate_price(price: Money) -> Result<Money, EngineError> {
    if price < 0 {
        return Err(EngineError::NegativePrice(price));
    }
    Ok(price)
}

/// Fails with the first live claim overlapping `span`, if any.
pub(crate) fn check_no_overlap(timeline: &Timeline, span: &Span) -> Result<(), EngineError> {
    match timeline.overlapping(span).first() {
        Some(claim) => Err(EngineError::Overlap(claim.booking_id)),
        None => Ok(()),
    }
}

pub(crate) fn check_claim_room(timeline: &Timeline) -> Result<(), EngineError> {
    if timeline.len() >= MAX_CLAIMS_PER_RESOURCE {
        return Err(EngineError::LimitExceeded("too many bookings on resource"));
    }
    Ok(())
}
