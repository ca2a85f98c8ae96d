//! Backoff schedule between retry cycles.

use std::time::Duration;

/// Delay to wait after `failed_cycles` consecutive failures.
///
/// The schedule is indexed from the first failure; once exhausted its last
/// entry repeats. An empty schedule means no delay.
pub fn backoff_delay(schedule: &[Duration], failed_cycles: u32) -> Duration {
    if failed_cycles == 0 {
        return Duration::ZERO;
    }
    let idx = (failed_cycles as usize - 1).min(schedule.len().saturating_sub(1));
    schedule.get(idx).copied().unwrap_or(Duration::ZERO)
}
