//! Architecture abstraction layer for context switching and interrupt handling.
//!
//! The scheduler core never touches registers directly. Each port implements
//! [`Arch`] to capture, restore, swap and initialize CPU contexts, and to
//! mask interrupts and arm the tick timer.

use crate::errors::ArchError;
use core::cell::UnsafeCell;
use core::marker::PhantomData;

/// Architecture abstraction trait.
///
/// This trait must be implemented for each supported target to provide
/// context switching and interrupt control.
///
/// # Safety
///
/// Implementations involve direct hardware (or OS) state manipulation. All
/// methods marked as unsafe have specific preconditions that must be upheld
/// by the caller.
pub trait Arch: 'static {
    /// Architecture-specific saved context type.
    ///
    /// This type must contain all CPU registers and state needed to fully
    /// restore a thread's execution context.
    type SavedContext: Send;

    /// Placeholder value used for slots whose context has not been built yet.
    const EMPTY_CONTEXT: Self::SavedContext;

    /// Capture the caller's register set into `ctx`.
    ///
    /// # Safety
    ///
    /// `ctx` must point to a valid, properly aligned `SavedContext`.
    unsafe fn get_context(ctx: *mut Self::SavedContext) -> Result<(), ArchError>;

    /// Resume execution from `ctx`. Only returns on failure.
    ///
    /// # Safety
    ///
    /// `ctx` must hold a context produced by `get_context`, `swap_context`
    /// or `make_context` whose stack is still alive.
    unsafe fn set_context(ctx: *const Self::SavedContext) -> ArchError;

    /// Save the caller into `prev` and resume `next`.
    ///
    /// Returns `Ok(())` when something later swaps back into `prev`.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly aligned contexts
    /// - The memory behind both pointers must stay valid until the caller
    ///   is resumed
    /// - `next` must represent a resumable execution state
    unsafe fn swap_context(
        prev: *mut Self::SavedContext,
        next: *const Self::SavedContext,
    ) -> Result<(), ArchError>;

    /// Prepare `ctx` so that resuming it runs `entry(arg)` on the given stack
    /// and continues at `successor` if `entry` returns.
    ///
    /// # Safety
    ///
    /// - `stack` must be valid for writes of `stack_size` bytes and must not
    ///   be used by anything else while the context is alive
    /// - `successor` must stay valid for as long as `ctx` may run
    unsafe fn make_context(
        ctx: *mut Self::SavedContext,
        stack: *mut u8,
        stack_size: usize,
        successor: *const Self::SavedContext,
        entry: extern "C" fn(usize),
        arg: usize,
    ) -> Result<(), ArchError>;

    /// Arm the periodic tick interrupt and enable interrupts.
    fn enable_tick_interrupt() -> Result<(), ArchError>;

    /// Enable interrupts on the current CPU.
    fn enable_interrupts();

    /// Disable interrupts on the current CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;

    /// Hint used by the idle thread between interrupt checks.
    fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

/// Saves the interrupt flag, disables interrupts, and restores the flag on drop.
///
/// Unlike [`AtomicSection`](crate::critical::AtomicSection) this does not
/// touch the nesting counter, so kernel-internal critical sections stay
/// invisible to `is_atomic`.
pub struct InterruptGuard<A: Arch> {
    were_enabled: bool,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> InterruptGuard<A> {
    pub fn new() -> Self {
        let were_enabled = A::interrupts_enabled();
        if were_enabled {
            A::disable_interrupts();
        }
        Self {
            were_enabled,
            _arch: PhantomData,
        }
    }
}

impl<A: Arch> Default for InterruptGuard<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Arch> Drop for InterruptGuard<A> {
    fn drop(&mut self) {
        if self.were_enabled {
            A::enable_interrupts();
        }
    }
}

/// Fixed-address storage for a context owned by the kernel itself
/// (scheduler and idle contexts).
pub(crate) struct ContextCell<C>(UnsafeCell<C>);

impl<C> ContextCell<C> {
    pub(crate) const fn new(ctx: C) -> Self {
        Self(UnsafeCell::new(ctx))
    }

    pub(crate) fn get(&self) -> *mut C {
        self.0.get()
    }
}

// Safety: the cell is only written through `Arch` calls made by the single
// execution context that currently owns the CPU.
unsafe impl<C: Send> Sync for ContextCell<C> {}

#[cfg(all(feature = "posix", target_os = "linux", target_env = "gnu"))]
pub mod posix;

#[cfg(test)]
pub(crate) mod sim;

#[cfg(all(feature = "posix", target_os = "linux", target_env = "gnu"))]
pub use posix::PosixArch;
