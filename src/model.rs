use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Minor currency units (e.g. cents).
pub type Money = i64;

pub type ResourceId = String;
pub type HolderId = String;
pub type BookingId = Ulid;

/// Generation number of a hold on one seat. Strictly increasing per seat.
pub type HoldToken = u64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Binary occupancy with a hold phase (a seat).
    Discrete,
    /// Occupancy as non-overlapping time ranges (a vehicle).
    TimeRanged,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Discrete => f.write_str("discrete"),
            ResourceKind::TimeRanged => f.write_str("time-ranged"),
        }
    }
}

/// Immutable resource metadata. The core only looks at `id` and `kind`;
/// `base_rate` is handed to the pricing strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_rate: Money,
}

impl Resource {
    pub fn seat(id: impl Into<ResourceId>, price: Money) -> Self {
        Self {
            id: id.into(),
            kind: ResourceKind::Discrete,
            name: None,
            base_rate: price,
        }
    }

    pub fn vehicle(id: impl Into<ResourceId>, rate_per_day: Money) -> Self {
        Self {
            id: id.into(),
            kind: ResourceKind::TimeRanged,
            name: None,
            base_rate: rate_per_day,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ── Discrete resources ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Held {
        holder: HolderId,
        token: HoldToken,
        held_at: Ms,
        expires_at: Ms,
    },
    Booked {
        booking_id: BookingId,
    },
}

/// Reservation state of one seat. Mutated only through the state machine
/// in `engine::seat`, always under the seat's write lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatState {
    pub status: SeatStatus,
    /// Last token handed out; the next hold gets `last_token + 1`.
    pub last_token: HoldToken,
}

impl Default for SeatState {
    fn default() -> Self {
        Self {
            status: SeatStatus::Available,
            last_token: 0,
        }
    }
}

// ── Continuous resources ─────────────────────────────────────────

/// A live booking on a continuous resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub booking_id: BookingId,
    pub span: Span,
}

/// Live claims of one continuous resource, sorted by `span.start`.
///
/// Claims never overlap, so their ends are sorted too; both bounds of an
/// overlap query are found by binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    claims: Vec<Claim>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn contains(&self, booking_id: BookingId) -> bool {
        self.claims.iter().any(|c| c.booking_id == booking_id)
    }

    /// Insert claim maintaining sort order by span.start.
    pub fn insert_claim(&mut self, claim: Claim) {
        let pos = self
            .claims
            .binary_search_by_key(&claim.span.start, |c| c.span.start)
            .unwrap_or_else(|e| e);
        self.claims.insert(pos, claim);
    }

    /// Remove claim by booking id.
    pub fn remove_claim(&mut self, booking_id: BookingId) -> Option<Claim> {
        let pos = self.claims.iter().position(|c| c.booking_id == booking_id)?;
        Some(self.claims.remove(pos))
    }

    /// Claims whose span overlaps the query window.
    pub fn overlapping(&self, query: &Span) -> &[Claim] {
        let left = self.claims.partition_point(|c| c.span.end <= query.start);
        let right = self.claims.partition_point(|c| c.span.start < query.end);
        if left >= right {
            return &[];
        }
        &self.claims[left..right]
    }
}

/// Per-resource state behind the resource's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Seat(SeatState),
    Timeline(Timeline),
}

impl ResourceState {
    pub fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Discrete => ResourceState::Seat(SeatState::default()),
            ResourceKind::TimeRanged => ResourceState::Timeline(Timeline::new()),
        }
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

/// Trip feedback recorded when a rental is completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub resource_id: ResourceId,
    pub kind: ResourceKind,
    pub holder: HolderId,
    /// The booked range; for seats, the hold window that was confirmed.
    pub span: Span,
    pub price: Money,
    pub created_at: Ms,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Expired,
    Released,
    RolledBack,
}

/// Broadcast to per-resource subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    HoldPlaced {
        resource_id: ResourceId,
        holder: HolderId,
        token: HoldToken,
        expires_at: Ms,
    },
    HoldReleased {
        resource_id: ResourceId,
        token: HoldToken,
        reason: ReleaseReason,
    },
    BookingConfirmed {
        resource_id: ResourceId,
        booking_id: BookingId,
        holder: HolderId,
    },
    BookingCancelled {
        resource_id: ResourceId,
        booking_id: BookingId,
    },
}

impl Event {
    pub fn resource_id(&self) -> &str {
        match self {
            Event::HoldPlaced { resource_id, .. }
            | Event::HoldReleased { resource_id, .. }
            | Event::BookingConfirmed { resource_id, .. }
            | Event::BookingCancelled { resource_id, .. } => resource_id,
        }
    }
}
