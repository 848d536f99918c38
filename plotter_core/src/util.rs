//! Small duration helpers shared by the encoder and the workers.

use std::time::Duration;

/// `per_unit × count`, saturating at `Duration::MAX`.
#[inline]
pub fn scale_duration(per_unit: Duration, count: u64) -> Duration {
    let nanos = per_unit.as_nanos().saturating_mul(u128::from(count));
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    // Remainder is < 1e9 and always fits.
    let sub = u32::try_from(nanos % 1_000_000_000).unwrap_or(0);
    if secs == u64::MAX {
        Duration::MAX
    } else {
        Duration::new(secs, sub)
    }
}

/// Sum of a sequence of durations, saturating.
pub fn total<I: IntoIterator<Item = Duration>>(durations: I) -> Duration {
    durations
        .into_iter()
        .fold(Duration::ZERO, Duration::saturating_add)
}
