//! Fixed-capacity thread table supplied by the application.

use super::{Tcb, ThreadEntry, ThreadId, ThreadStatus};
use crate::arch::Arch;
use crate::errors::{SchedError, SchedResult};
use crate::sched::priority;
use crate::time::{Tick, WakeSchedule};

/// The application's TCB array plus the number of admitted threads.
///
/// Thread `id` lives at index `id - 1`; ids are handed out densely in
/// admission order and the table is never resized.
pub(crate) struct ThreadTable<A: Arch> {
    slots: &'static mut [Tcb<A>],
    used: usize,
}

impl<A: Arch> ThreadTable<A> {
    /// Take over `slots`, marking every slot suspended and unused.
    pub(crate) fn new(slots: &'static mut [Tcb<A>]) -> SchedResult<Self> {
        if slots.is_empty() {
            return Err(SchedError::InvalidArgument);
        }
        for slot in slots.iter_mut() {
            slot.status = ThreadStatus::Suspended;
        }
        Ok(Self { slots, used: 0 })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.used
    }

    /// Admitted threads in id order.
    pub(crate) fn threads(&self) -> &[Tcb<A>] {
        &self.slots[..self.used]
    }

    pub(crate) fn threads_mut(&mut self) -> &mut [Tcb<A>] {
        &mut self.slots[..self.used]
    }

    /// Append a ready thread and return its id.
    pub(crate) fn admit(
        &mut self,
        entry: ThreadEntry,
        arg: usize,
        stack: &'static mut [u8],
        priority: u8,
    ) -> SchedResult<ThreadId> {
        if stack.is_empty() || !(priority::MIN..=priority::MAX).contains(&priority) {
            return Err(SchedError::InvalidArgument);
        }
        if self.used >= self.slots.len() {
            return Err(SchedError::TableFull);
        }

        let id = ThreadId::from_index(self.used);
        let tcb = &mut self.slots[self.used];
        tcb.id = Some(id);
        tcb.status = ThreadStatus::Ready;
        tcb.priority = priority;
        tcb.last_run = false;
        tcb.wake_up_at = 0;
        tcb.wake = WakeSchedule::None;
        tcb.entry = Some(entry);
        tcb.arg = arg;
        tcb.stack = Some(stack);
        self.used += 1;

        Ok(id)
    }

    pub(crate) fn get(&self, id: ThreadId) -> SchedResult<&Tcb<A>> {
        self.threads().get(id.index()).ok_or(SchedError::InvalidArgument)
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> SchedResult<&mut Tcb<A>> {
        self.threads_mut()
            .get_mut(id.index())
            .ok_or(SchedError::InvalidArgument)
    }

    /// Pointer to a thread's saved context. Stays valid for the program's
    /// lifetime since the slots are `'static`.
    pub(crate) fn context_ptr(&mut self, id: ThreadId) -> SchedResult<*mut A::SavedContext> {
        Ok(&mut self.get_mut(id)?.context as *mut A::SavedContext)
    }

    /// Promote overflow-pending sleepers after a wrap, then ready every
    /// sleeper whose deadline has passed. Returns whether any woke.
    pub(crate) fn wake_sleepers(&mut self, now: Tick) -> bool {
        let threads = self.threads_mut();

        if now == 0 {
            for tcb in threads.iter_mut() {
                if tcb.wake == WakeSchedule::OverflowPending {
                    tcb.wake = WakeSchedule::Normal;
                }
            }
        }

        let mut woke = false;
        for tcb in threads.iter_mut() {
            if tcb.wake != WakeSchedule::Normal || tcb.wake_up_at > now {
                continue;
            }
            tcb.wake = WakeSchedule::None;
            if tcb.status != ThreadStatus::Exited {
                tcb.status = ThreadStatus::Ready;
            }
            log::trace!("tick {}: woke thread {:?}", now, tcb.id);
            woke = true;
        }
        woke
    }
}
