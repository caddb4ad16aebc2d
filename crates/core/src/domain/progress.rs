// Progress policy for extraction jobs

/// Progress value of a completed job
pub const COMPLETE: u8 = 100;

/// Starting point of the unknown-total heuristic
const UNKNOWN_TOTAL_FLOOR: u64 = 50;

/// The unknown-total heuristic never claims more than this
pub const UNKNOWN_TOTAL_CEILING: u8 = 95;

/// Clamp any integer into the 0..=100 range
pub fn clamp_progress(value: i64) -> u8 {
    value.clamp(0, COMPLETE as i64) as u8
}

/// Compute progress for `items` persisted records.
///
/// With a known positive total this is `floor(items / total * 100)` clamped
/// to 0..=100. Without one it is `min(95, floor(50 + 10 * items / 100))`,
/// a saturating estimate that creeps toward 95 and only reaches 100 when the
/// job is completed.
pub fn calculate_progress(items: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let percent = (u128::from(items) * 100) / u128::from(total);
            percent.min(u128::from(COMPLETE)) as u8
        }
        _ => {
            let estimate = UNKNOWN_TOTAL_FLOOR.saturating_add(items / 10);
            estimate.min(u64::from(UNKNOWN_TOTAL_CEILING)) as u8
        }
    }
}
