use crate::model::Ms;

pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_ID_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_HOLDER_LEN: usize = 128;

/// Longest hold a caller may request (24h).
pub const MAX_HOLD_TTL_MS: Ms = 86_400_000;
/// Most seats a single multi-seat hold may cover.
pub const MAX_SEATS_PER_HOLD: usize = 64;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
/// Two years.
pub const MAX_SPAN_DURATION_MS: Ms = 2 * 366 * 86_400_000;
pub const MAX_QUERY_WINDOW_MS: Ms = MAX_SPAN_DURATION_MS;
pub const MAX_CLAIMS_PER_RESOURCE: usize = 100_000;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
