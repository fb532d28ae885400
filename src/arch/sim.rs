//! Deterministic in-process port for unit tests.
//!
//! No registers are touched: a swap records which context was resumed and
//! returns immediately, as if the resumed context yielded straight back.
//! Interrupt state and hooks are thread-local so each test thread gets an
//! isolated "CPU".

use super::Arch;
use crate::errors::ArchError;
use std::boxed::Box;
use std::cell::{Cell, RefCell};

/// Saved context for the simulated CPU.
pub(crate) struct SimContext {
    pub(crate) captured: bool,
    pub(crate) entry: Option<extern "C" fn(usize)>,
    pub(crate) arg: usize,
    pub(crate) stack_size: usize,
    pub(crate) successor: *const SimContext,
    pub(crate) resumed: usize,
}

unsafe impl Send for SimContext {}

type SwapHook = Box<dyn FnMut()>;

std::thread_local! {
    static INTERRUPTS: Cell<bool> = Cell::new(true);
    static TICK_ARMED: Cell<bool> = Cell::new(false);
    static FAILING_SWAPS: Cell<usize> = Cell::new(0);
    static SWAP_COUNT: Cell<usize> = Cell::new(0);
    static SWAP_HOOK: RefCell<Option<SwapHook>> = RefCell::new(None);
}

/// Simulated architecture.
pub(crate) struct SimArch;

impl SimArch {
    /// Reset the calling thread's simulated CPU.
    pub(crate) fn reset() {
        INTERRUPTS.with(|c| c.set(true));
        TICK_ARMED.with(|c| c.set(false));
        FAILING_SWAPS.with(|c| c.set(0));
        SWAP_COUNT.with(|c| c.set(0));
        SWAP_HOOK.with(|h| *h.borrow_mut() = None);
    }

    /// Run `hook` on every successful swap, standing in for whatever the
    /// resumed context would do before handing control back.
    pub(crate) fn on_swap<F: FnMut() + 'static>(hook: F) {
        SWAP_HOOK.with(|h| *h.borrow_mut() = Some(Box::new(hook)));
    }

    pub(crate) fn clear_swap_hook() {
        SWAP_HOOK.with(|h| *h.borrow_mut() = None);
    }

    /// Make the next `count` swaps fail.
    pub(crate) fn fail_next_swaps(count: usize) {
        FAILING_SWAPS.with(|c| c.set(count));
    }

    pub(crate) fn swap_count() -> usize {
        SWAP_COUNT.with(|c| c.get())
    }

    pub(crate) fn tick_armed() -> bool {
        TICK_ARMED.with(|c| c.get())
    }

    fn run_hook() {
        // Taken out while running so nested swaps inside the hook don't re-enter it.
        let hook = SWAP_HOOK.with(|h| h.borrow_mut().take());
        if let Some(mut hook) = hook {
            hook();
            SWAP_HOOK.with(|h| {
                let mut slot = h.borrow_mut();
                if slot.is_none() {
                    *slot = Some(hook);
                }
            });
        }
    }
}

impl Arch for SimArch {
    type SavedContext = SimContext;

    const EMPTY_CONTEXT: SimContext = SimContext {
        captured: false,
        entry: None,
        arg: 0,
        stack_size: 0,
        successor: core::ptr::null(),
        resumed: 0,
    };

    unsafe fn get_context(ctx: *mut SimContext) -> Result<(), ArchError> {
        unsafe { (*ctx).captured = true };
        Ok(())
    }

    unsafe fn set_context(_ctx: *const SimContext) -> ArchError {
        ArchError::ResumeFailed
    }

    unsafe fn swap_context(prev: *mut SimContext, next: *const SimContext) -> Result<(), ArchError> {
        let failing = FAILING_SWAPS.with(|c| c.get());
        if failing > 0 {
            FAILING_SWAPS.with(|c| c.set(failing - 1));
            return Err(ArchError::ContextSwitchFailed);
        }
        unsafe {
            (*prev).captured = true;
            (*(next as *mut SimContext)).resumed += 1;
        }
        SWAP_COUNT.with(|c| c.set(c.get() + 1));
        Self::run_hook();
        Ok(())
    }

    unsafe fn make_context(
        ctx: *mut SimContext,
        _stack: *mut u8,
        stack_size: usize,
        successor: *const SimContext,
        entry: extern "C" fn(usize),
        arg: usize,
    ) -> Result<(), ArchError> {
        if stack_size == 0 {
            return Err(ArchError::ContextInitFailed);
        }
        unsafe {
            (*ctx).entry = Some(entry);
            (*ctx).arg = arg;
            (*ctx).stack_size = stack_size;
            (*ctx).successor = successor;
        }
        Ok(())
    }

    fn enable_tick_interrupt() -> Result<(), ArchError> {
        TICK_ARMED.with(|c| c.set(true));
        Self::enable_interrupts();
        Ok(())
    }

    fn enable_interrupts() {
        INTERRUPTS.with(|c| c.set(true));
    }

    fn disable_interrupts() {
        INTERRUPTS.with(|c| c.set(false));
    }

    fn interrupts_enabled() -> bool {
        INTERRUPTS.with(|c| c.get())
    }
}
