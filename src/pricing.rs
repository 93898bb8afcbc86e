use std::fmt::Debug;
use std::sync::Arc;

use crate::model::*;

/// Prices a claim on a resource over a span. Must be cheap and pure: it
/// runs while the resource lock is held.
pub trait PricingStrategy: Debug + Send + Sync {
    fn price(&self, resource: &Resource, span: &Span) -> Money;
}

/// `base_rate` regardless of duration (a cinema ticket).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatRate;

impl PricingStrategy for FlatRate {
    fn price(&self, resource: &Resource, _span: &Span) -> Money {
        resource.base_rate
    }
}

/// `base_rate` per whole day, at least one day.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerDay;

impl PricingStrategy for PerDay {
    fn price(&self, resource: &Resource, span: &Span) -> Money {
        let days = (span.duration_ms() / DAY_MS).max(1);
        resource.base_rate.saturating_mul(days)
    }
}

/// `base_rate / 24` per whole hour, at least one hour.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerHour;

impl PricingStrategy for PerHour {
    fn price(&self, resource: &Resource, span: &Span) -> Money {
        let hours = (span.duration_ms() / HOUR_MS).max(1);
        resource.base_rate.saturating_mul(hours) / 24
    }
}

/// Look up a strategy by its config name.
pub fn from_name(name: &str) -> Option<Arc<dyn PricingStrategy>> {
    match name {
        "flat" => Some(Arc::new(FlatRate)),
        "per_day" => Some(Arc::new(PerDay)),
        "per_hour" => Some(Arc::new(PerHour)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_ignores_duration() {
        let seat = Resource::seat("S1", 120);
        assert_eq!(FlatRate.price(&seat, &Span::new(0, 1)), 120);
        assert_eq!(FlatRate.price(&seat, &Span::new(0, 10 * DAY_MS)), 120);
    }

    #[test]
    fn per_day_counts_whole_days() {
        let car = Resource::vehicle("VEH-7", 5000);
        assert_eq!(PerDay.price(&car, &Span::new(DAY_MS, 3 * DAY_MS)), 10_000);
        // Partial day rounds down, but never below one day
        assert_eq!(PerDay.price(&car, &Span::new(0, 2 * DAY_MS + HOUR_MS)), 10_000);
        assert_eq!(PerDay.price(&car, &Span::new(0, HOUR_MS)), 5000);
    }

    #[test]
    fn per_hour_is_day_rate_over_24() {
        let car = Resource::vehicle("VEH-7", 4800);
        assert_eq!(PerHour.price(&car, &Span::new(0, 5 * HOUR_MS)), 1000);
        assert_eq!(PerHour.price(&car, &Span::new(0, 1)), 200);
    }

    #[test]
    fn lookup_by_name() {
        assert!(from_name("per_day").is_some());
        assert!(from_name("per_hour").is_some());
        assert!(from_name("flat").is_some());
        assert!(from_name("weekly").is_none());
    }
}
