//! Nested atomic (critical) sections.
//!
//! The outermost [`AtomicSection::begin`] records whether interrupts were
//! enabled and disables them; the matching outermost [`AtomicSection::end`]
//! re-enables them only if they were enabled before. While the depth is
//! non-zero interrupts stay physically disabled, so an ISR can never observe
//! or race the counter: nesting from an ISR composes with nesting from
//! thread code.

use crate::arch::Arch;
use crate::errors::{SchedError, SchedResult};
use core::marker::PhantomData;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

/// Deepest supported nesting.
pub const MAX_NESTING: u8 = u8::MAX;

/// Process-wide atomic-section counter.
pub struct AtomicSection<A: Arch> {
    depth: AtomicU8,
    interrupts_were_enabled: AtomicBool,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> AtomicSection<A> {
    pub const fn new() -> Self {
        Self {
            depth: AtomicU8::new(0),
            interrupts_were_enabled: AtomicBool::new(false),
            _arch: PhantomData,
        }
    }

    /// Enter an atomic section.
    ///
    /// Fails with [`SchedError::Overflow`] when already nested
    /// [`MAX_NESTING`] deep; the interrupt state is left as it was.
    pub fn begin(&self) -> SchedResult<()> {
        let enabled = A::interrupts_enabled();
        if enabled {
            A::disable_interrupts();
        }

        let depth = self.depth.load(Ordering::Acquire);
        if depth == MAX_NESTING {
            if enabled {
                A::enable_interrupts();
            }
            return Err(SchedError::Overflow);
        }

        if depth == 0 {
            self.interrupts_were_enabled.store(enabled, Ordering::Release);
        }
        self.depth.store(depth + 1, Ordering::Release);
        Ok(())
    }

    /// Leave an atomic section.
    pub fn end(&self) -> SchedResult<()> {
        let depth = self.depth.load(Ordering::Acquire);
        if depth == 0 {
            return Err(SchedError::Underflow);
        }

        self.depth.store(depth - 1, Ordering::Release);
        if depth == 1 && self.interrupts_were_enabled.load(Ordering::Acquire) {
            A::enable_interrupts();
        }
        Ok(())
    }

    /// Whether at least one atomic section is open.
    pub fn is_atomic(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u8 {
        self.depth.load(Ordering::Acquire)
    }

    /// Enter an atomic section that ends when the returned guard is dropped.
    pub fn enter(&self) -> SchedResult<AtomicGuard<'_, A>> {
        self.begin()?;
        Ok(AtomicGuard { section: self })
    }
}

impl<A: Arch> Default for AtomicSection<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`AtomicSection::enter`].
pub struct AtomicGuard<'a, A: Arch> {
    section: &'a AtomicSection<A>,
}

impl<A: Arch> Drop for AtomicGuard<'_, A> {
    fn drop(&mut self) {
        // Cannot underflow: this guard owns one level.
        let _ = self.section.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimArch;

    #[test]
    fn test_nesting_limits() {
        SimArch::reset();
        let section = AtomicSection::<SimArch>::new();

        for _ in 0..255 {
            assert_eq!(section.begin(), Ok(()));
        }
        assert_eq!(section.depth(), 255);
        assert_eq!(section.begin(), Err(SchedError::Overflow));
        assert_eq!(section.depth(), 255);

        for _ in 0..255 {
            assert_eq!(section.end(), Ok(()));
        }
        assert_eq!(section.end(), Err(SchedError::Underflow));
        assert!(!section.is_atomic());
        assert!(SimArch::interrupts_enabled());
    }

    #[test]
    fn test_interrupts_restored_only_by_outermost_end() {
        SimArch::reset();
        let section = AtomicSection::<SimArch>::new();

        section.begin().unwrap();
        assert!(!SimArch::interrupts_enabled());
        section.begin().unwrap();
        section.end().unwrap();
        assert!(!SimArch::interrupts_enabled());
        assert!(section.is_atomic());
        section.end().unwrap();
        assert!(SimArch::interrupts_enabled());
    }

    #[test]
    fn test_disabled_interrupts_stay_disabled() {
        SimArch::reset();
        SimArch::disable_interrupts();
        let section = AtomicSection::<SimArch>::new();

        section.begin().unwrap();
        section.end().unwrap();
        assert!(!SimArch::interrupts_enabled());
    }

    #[test]
    fn test_inner_begin_does_not_overwrite_saved_state() {
        SimArch::reset();
        let section = AtomicSection::<SimArch>::new();

        section.begin().unwrap();
        // Interrupts are disabled now; an inner begin sees them disabled but
        // must not forget that the outermost entry found them enabled.
        section.begin().unwrap();
        section.end().unwrap();
        section.end().unwrap();
        assert!(SimArch::interrupts_enabled());
    }

    #[test]
    fn test_guard_ends_section_on_drop() {
        SimArch::reset();
        let section = AtomicSection::<SimArch>::new();
        {
            let _outer = section.enter().unwrap();
            let _inner = section.enter().unwrap();
            assert_eq!(section.depth(), 2);
        }
        assert_eq!(section.depth(), 0);
        assert!(SimArch::interrupts_enabled());
    }

    #[test]
    fn test_overflow_preserves_interrupt_state() {
        SimArch::reset();
        let section = AtomicSection::<SimArch>::new();
        for _ in 0..255 {
            section.begin().unwrap();
        }
        // Pretend something re-enabled interrupts behind our back; a failed
        // begin must leave that state as found.
        SimArch::enable_interrupts();
        assert_eq!(section.begin(), Err(SchedError::Overflow));
        assert!(SimArch::interrupts_enabled());
    }
}
