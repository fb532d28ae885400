//! Tick counting.

use super::{Tick, TIMER_FREQUENCY_HZ};
use portable_atomic::{AtomicU16, Ordering};

/// Tick counter driven by the timer interrupt.
///
/// The counter wraps silently; sleepers whose deadline lies past the wrap are
/// tracked separately (see [`WakeSchedule`](super::WakeSchedule)).
pub struct TickCounter {
    /// Ticks since start, modulo `Tick::MAX + 1`
    ticks: AtomicU16,
    /// Tick frequency in Hz
    frequency: u32,
}

impl TickCounter {
    /// Create a new tick counter with the given frequency.
    ///
    /// A zero frequency is accepted; the counter still counts, but
    /// [`ticks_to_millis`](Self::ticks_to_millis) has nothing to convert with.
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU16::new(0),
            frequency,
        }
    }

    /// Increment the counter and return the new value.
    ///
    /// This should only be called from the tick path.
    pub(crate) fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }

    /// Get the tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Convert ticks to milliseconds. `None` for a zero frequency.
    pub fn ticks_to_millis(&self, ticks: Tick) -> Option<u64> {
        (ticks as u64 * 1000).checked_div(self.frequency as u64)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new(TIMER_FREQUENCY_HZ)
    }
}
