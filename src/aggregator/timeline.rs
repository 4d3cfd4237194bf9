//! Bucket-width policy for timeline rollups
//!
//! Width is a function of the window alone (relative windows) or of the
//! covered log span (all time), so two calls over the same data always
//! produce identical buckets:
//!
//! - relative window: `window / 50`
//! - all time: `ceil(span / 50)` where span = last - first movement
//!
//! Both are rounded up to whole seconds with a one-second floor. Bucket starts
//! are aligned to multiples of the width since the Unix epoch.

/// Target number of buckets across a window
pub const TARGET_BUCKETS: i64 = 50;

/// Smallest bucket the policy will produce
pub const MIN_BUCKET_MS: i64 = 1_000;

pub fn bucket_width_ms(window_ms: Option<i64>, span_ms: i64) -> i64 {
    let covered = window_ms.unwrap_or(span_ms).max(0);
    let raw = div_ceil(covered, TARGET_BUCKETS);
    (div_ceil(raw, MIN_BUCKET_MS) * MIN_BUCKET_MS).max(MIN_BUCKET_MS)
}

/// Start of the bucket containing `timestamp_ms`
pub fn bucket_start(timestamp_ms: i64, width_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(width_ms)
}

fn div_ceil(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1).div_euclid(divisor)
}
