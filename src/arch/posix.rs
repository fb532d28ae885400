//! POSIX reference port built on `ucontext` coroutines.
//!
//! Interrupts are modelled by `SIGALRM`: "disabled" means the signal is
//! blocked in the calling thread's mask, and the periodic tick is an
//! `ITIMER_REAL` interval timer. `swapcontext` saves and restores the signal
//! mask together with the registers, the same way a status register travels
//! with a context on a microcontroller.

use super::Arch;
use crate::errors::ArchError;
use crate::time::TIMER_FREQUENCY_HZ;
use core::mem::MaybeUninit;

/// Saved thread context for the POSIX port.
#[repr(transparent)]
pub struct PosixContext {
    uc: MaybeUninit<libc::ucontext_t>,
}

impl PosixContext {
    fn as_mut_ptr(ctx: *mut PosixContext) -> *mut libc::ucontext_t {
        ctx as *mut libc::ucontext_t
    }
}

// The raw pointers inside `ucontext_t` only refer to stacks and contexts that
// the kernel keeps alive for the program's lifetime.
unsafe impl Send for PosixContext {}
unsafe impl Sync for PosixContext {}

/// POSIX architecture implementation.
pub struct PosixArch;

fn tick_signal_set() -> libc::sigset_t {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), libc::SIGALRM);
        set.assume_init()
    }
}

extern "C" fn on_tick_signal(_signal: libc::c_int) {
    crate::kernel::tick_interrupt::<PosixArch>();
}

impl Arch for PosixArch {
    type SavedContext = PosixContext;

    const EMPTY_CONTEXT: PosixContext = PosixContext {
        uc: MaybeUninit::uninit(),
    };

    unsafe fn get_context(ctx: *mut PosixContext) -> Result<(), ArchError> {
        if unsafe { libc::getcontext(PosixContext::as_mut_ptr(ctx)) } != 0 {
            return Err(ArchError::ContextCaptureFailed);
        }
        Ok(())
    }

    unsafe fn set_context(ctx: *const PosixContext) -> ArchError {
        unsafe { libc::setcontext(ctx as *const libc::ucontext_t) };
        ArchError::ResumeFailed
    }

    unsafe fn swap_context(prev: *mut PosixContext, next: *const PosixContext) -> Result<(), ArchError> {
        let rc = unsafe {
            libc::swapcontext(
                PosixContext::as_mut_ptr(prev),
                next as *const libc::ucontext_t,
            )
        };
        if rc != 0 {
            return Err(ArchError::ContextSwitchFailed);
        }
        Ok(())
    }

    unsafe fn make_context(
        ctx: *mut PosixContext,
        stack: *mut u8,
        stack_size: usize,
        successor: *const PosixContext,
        entry: extern "C" fn(usize),
        arg: usize,
    ) -> Result<(), ArchError> {
        if stack.is_null() || stack_size == 0 {
            return Err(ArchError::ContextInitFailed);
        }
        let uc = PosixContext::as_mut_ptr(ctx);
        unsafe {
            // makecontext requires a context initialized by getcontext
            if libc::getcontext(uc) != 0 {
                return Err(ArchError::ContextInitFailed);
            }
            (*uc).uc_stack.ss_sp = stack as *mut libc::c_void;
            (*uc).uc_stack.ss_size = stack_size;
            (*uc).uc_stack.ss_flags = 0;
            (*uc).uc_link = successor as *mut libc::ucontext_t;

            let start: extern "C" fn() =
                core::mem::transmute::<extern "C" fn(usize), extern "C" fn()>(entry);
            libc::makecontext(uc, start, 1, arg);
        }
        Ok(())
    }

    fn enable_tick_interrupt() -> Result<(), ArchError> {
        let period_us = 1_000_000 / TIMER_FREQUENCY_HZ as libc::suseconds_t;
        unsafe {
            let mut action: libc::sigaction = core::mem::zeroed();
            action.sa_sigaction = on_tick_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGALRM, &action, core::ptr::null_mut()) != 0 {
                return Err(ArchError::TimerUnavailable);
            }

            let interval = libc::timeval {
                tv_sec: 0,
                tv_usec: period_us,
            };
            let timer = libc::itimerval {
                it_interval: interval,
                it_value: interval,
            };
            if libc::setitimer(libc::ITIMER_REAL, &timer, core::ptr::null_mut()) != 0 {
                return Err(ArchError::TimerUnavailable);
            }
        }
        Self::enable_interrupts();
        Ok(())
    }

    fn enable_interrupts() {
        let set = tick_signal_set();
        unsafe {
            libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, core::ptr::null_mut());
        }
    }

    fn disable_interrupts() {
        let set = tick_signal_set();
        unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, core::ptr::null_mut());
        }
    }

    fn interrupts_enabled() -> bool {
        unsafe {
            let mut current = MaybeUninit::<libc::sigset_t>::uninit();
            libc::sigemptyset(current.as_mut_ptr());
            if libc::pthread_sigmask(libc::SIG_BLOCK, core::ptr::null(), current.as_mut_ptr()) != 0 {
                return false;
            }
            libc::sigismember(current.as_ptr(), libc::SIGALRM) == 0
        }
    }

    fn wait_for_interrupt() {
        unsafe {
            libc::sched_yield();
        }
    }
}
