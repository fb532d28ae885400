//! Thread control blocks.
//!
//! The application owns an array of [`Tcb`]s (usually a `static`) and hands it
//! to the kernel once, before start. Slots are never freed; a thread that is
//! no longer wanted is only ever suspended.

use crate::arch::Arch;
use crate::time::{Tick, WakeSchedule};
use core::num::NonZeroUsize;

mod table;

pub(crate) use table::ThreadTable;

/// Thread entry point. Receives the argument given at admission.
///
/// Threads are expected to loop forever. If one returns anyway, the kernel
/// marks it [`ThreadStatus::Exited`] and never schedules it again.
pub type ThreadEntry = fn(usize);

/// Identifier of an admitted thread: its slot index plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Create a thread ID. Returns `None` for 0, which names the idle thread.
    pub const fn new(id: usize) -> Option<Self> {
        match NonZeroUsize::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(index))
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }

    pub(crate) fn index(self) -> usize {
        self.0.get() - 1
    }
}

/// Scheduling eligibility of a thread.
///
/// Status tracks eligibility, not execution: the thread that is executing
/// normally still reads as `Ready`. Which thread runs is tracked by the
/// kernel's current-thread id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    Suspended = 0,
    Ready = 1,
    /// Part of the status vocabulary only. The kernel never stores it, since
    /// the executing thread is known from the current-thread id; a port or
    /// application may use it when reporting thread state.
    Running = 2,
    /// The entry function returned; the context can no longer be resumed.
    Exited = 3,
}

impl ThreadStatus {
    pub fn is_schedulable(self) -> bool {
        matches!(self, ThreadStatus::Ready | ThreadStatus::Running)
    }
}

/// Thread control block.
pub struct Tcb<A: Arch> {
    pub(crate) id: Option<ThreadId>,
    pub(crate) status: ThreadStatus,
    pub(crate) priority: u8,
    pub(crate) last_run: bool,
    pub(crate) wake_up_at: Tick,
    pub(crate) wake: WakeSchedule,
    pub(crate) entry: Option<ThreadEntry>,
    pub(crate) arg: usize,
    pub(crate) stack: Option<&'static mut [u8]>,
    pub(crate) context: A::SavedContext,
}

impl<A: Arch> Tcb<A> {
    /// An unused slot, suitable for `static` array initializers:
    /// `static mut THREADS: [Tcb<MyArch>; 4] = [Tcb::VACANT; 4];`
    pub const VACANT: Self = Self {
        id: None,
        status: ThreadStatus::Suspended,
        priority: 0,
        last_run: false,
        wake_up_at: 0,
        wake: WakeSchedule::None,
        entry: None,
        arg: 0,
        stack: None,
        context: A::EMPTY_CONTEXT,
    };

    pub fn id(&self) -> Option<ThreadId> {
        self.id
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn stack_size(&self) -> usize {
        self.stack.as_deref().map_or(0, <[u8]>::len)
    }

    pub(crate) fn is_schedulable(&self) -> bool {
        self.status.is_schedulable()
    }
}
