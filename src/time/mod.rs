//! Tick accounting and sleep deadlines.

pub mod tick;

pub use tick::TickCounter;

/// Tick counter type. Wraps silently at its maximum value.
pub type Tick = u16;

/// Frequency in Hz for timer interrupts.
pub const TIMER_FREQUENCY_HZ: u32 = 1000; // 1 kHz = 1ms ticks

/// Sleep-deadline state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeSchedule {
    /// Not sleeping
    #[default]
    None,
    /// Deadline is comparable with the current tick count
    Normal,
    /// Deadline lies past the next wraparound of the tick counter
    OverflowPending,
}

/// Compute the wake-up tick for a sleep of `ticks` starting at `now`.
///
/// If the deadline does not fit before the counter wraps, it is returned
/// already wrapped and marked `OverflowPending`; it becomes `Normal` once the
/// counter passes zero.
pub fn wake_deadline(now: Tick, ticks: Tick) -> (Tick, WakeSchedule) {
    let wake_up_at = now.wrapping_add(ticks);
    if Tick::MAX - now < ticks {
        (wake_up_at, WakeSchedule::OverflowPending)
    } else {
        (wake_up_at, WakeSchedule::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_without_wrap() {
        assert_eq!(wake_deadline(10, 5), (15, WakeSchedule::Normal));
        assert_eq!(wake_deadline(0, 0), (0, WakeSchedule::Normal));
    }

    #[test]
    fn test_deadline_exactly_at_max() {
        assert_eq!(
            wake_deadline(Tick::MAX - 3, 3),
            (Tick::MAX, WakeSchedule::Normal)
        );
    }

    #[test]
    fn test_deadline_past_wrap() {
        assert_eq!(
            wake_deadline(Tick::MAX - 3, 4),
            (0, WakeSchedule::OverflowPending)
        );
        assert_eq!(
            wake_deadline(Tick::MAX, 10),
            (9, WakeSchedule::OverflowPending)
        );
    }
}
