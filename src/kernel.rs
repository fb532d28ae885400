//! Kernel object tying the scheduler together.
//!
//! A [`Kernel`] owns every piece of process-wide scheduler state: the thread
//! table, the idle stack, the scheduler and idle contexts, the current thread,
//! the tick counter and the atomic-section counter. It is built with a
//! `const fn` so it can live in a `static`, and registered globally so the
//! tick ISR can reach it.
//!
//! Execution moves between three kinds of context, always through the
//! scheduler context:
//!
//! ```text
//!            dispatch_next             yield_now / sleep / return
//! scheduler ---------------> thread ----------------------------> scheduler
//!           ---------------> idle   ----------------------------> scheduler
//! ```
//!
//! Every access to the thread table happens with interrupts disabled and
//! under a short `spin::Mutex` section. The lock is never held across a
//! context swap.

use crate::arch::{Arch, ContextCell, InterruptGuard};
use crate::critical::AtomicSection;
use crate::errors::{SchedError, SchedResult};
use crate::sched::{mark_dispatched, priority, select_next};
use crate::thread::{Tcb, ThreadEntry, ThreadId, ThreadStatus, ThreadTable};
use crate::time::{wake_deadline, Tick, TickCounter, WakeSchedule, TIMER_FREQUENCY_HZ};
use core::convert::Infallible;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use spin::Mutex;

/// Thread id reserved for the idle thread.
pub const IDLE_THREAD_ID: usize = 0;

/// Value of `current` before the first dispatch.
const NO_THREAD: usize = usize::MAX;

/// Global kernel reference for interrupt handlers.
static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// The scheduler.
///
/// # Example
///
/// ```ignore
/// static KERNEL: Kernel<PosixArch> = Kernel::new();
/// static mut THREADS: [Tcb<PosixArch>; 2] = [Tcb::VACANT; 2];
/// ```
pub struct Kernel<A: Arch> {
    table: Mutex<Option<ThreadTable<A>>>,
    idle_stack: Mutex<Option<&'static mut [u8]>>,
    scheduler_context: ContextCell<A::SavedContext>,
    idle_context: ContextCell<A::SavedContext>,
    /// Id of the dispatched thread, `IDLE_THREAD_ID`, or `NO_THREAD`
    current: AtomicUsize,
    started: AtomicBool,
    ticks: TickCounter,
    atomic: AtomicSection<A>,
}

impl<A: Arch> Kernel<A> {
    pub const fn new() -> Self {
        Self {
            table: Mutex::new(None),
            idle_stack: Mutex::new(None),
            scheduler_context: ContextCell::new(A::EMPTY_CONTEXT),
            idle_context: ContextCell::new(A::EMPTY_CONTEXT),
            current: AtomicUsize::new(NO_THREAD),
            started: AtomicBool::new(false),
            ticks: TickCounter::new(TIMER_FREQUENCY_HZ),
            atomic: AtomicSection::new(),
        }
    }

    /// Run `f` on the installed table with interrupts disabled.
    fn with_table<R>(
        &self,
        f: impl FnOnce(&mut ThreadTable<A>) -> SchedResult<R>,
    ) -> SchedResult<R> {
        let _irq = InterruptGuard::<A>::new();
        let mut table = self.table.lock();
        let table = table.as_mut().ok_or(SchedError::NotInitialized)?;
        f(table)
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Install the thread table. Must be called exactly once, before start.
    ///
    /// Every slot is reset to suspended; none counts as admitted until
    /// [`create_thread_static`](Self::create_thread_static) fills it.
    pub fn provide_threads_array(&self, slots: &'static mut [Tcb<A>]) -> SchedResult<()> {
        if slots.is_empty() {
            return Err(SchedError::InvalidArgument);
        }

        let _irq = InterruptGuard::<A>::new();
        let mut table = self.table.lock();
        if table.is_some() {
            return Err(SchedError::AlreadyProvided);
        }
        if self.is_started() {
            return Err(SchedError::AlreadyStarted);
        }

        let installed = ThreadTable::new(slots)?;
        log::debug!("thread table installed, capacity {}", installed.capacity());
        *table = Some(installed);
        Ok(())
    }

    /// Supply the stack the idle thread runs on. A second call before start
    /// replaces the first stack.
    pub fn provide_idle_thread_stack(&self, stack: &'static mut [u8]) -> SchedResult<()> {
        if stack.is_empty() {
            return Err(SchedError::InvalidArgument);
        }
        if self.is_started() {
            return Err(SchedError::AlreadyStarted);
        }
        *self.idle_stack.lock() = Some(stack);
        Ok(())
    }

    /// Admit a thread that will run `entry(arg)` on `stack`.
    ///
    /// `priority` must lie in [`priority::MIN`]..=[`priority::MAX`].
    /// The stack must be large enough for everything `entry` does; overflow
    /// is not detected.
    pub fn create_thread_static(
        &self,
        entry: ThreadEntry,
        arg: usize,
        stack: &'static mut [u8],
        priority: u8,
    ) -> SchedResult<ThreadId> {
        if stack.is_empty() || !(priority::MIN..=priority::MAX).contains(&priority) {
            return Err(SchedError::InvalidArgument);
        }

        let id = self.with_table(|table| {
            if self.is_started() {
                return Err(SchedError::AlreadyStarted);
            }
            table.admit(entry, arg, stack, priority)
        })?;

        log::debug!("admitted thread {} at priority {}", id, priority);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------

    fn resolve(&self, id: Option<ThreadId>) -> SchedResult<ThreadId> {
        match id {
            Some(id) => Ok(id),
            None => self.current_thread().ok_or(SchedError::NoCurrentThread),
        }
    }

    /// Whether a preemptive yield may happen right now.
    fn can_preempt(&self, in_atomic: bool) -> bool {
        !in_atomic && self.is_started() && self.current.load(Ordering::Acquire) != NO_THREAD
    }

    /// Make a thread ineligible for scheduling. `None` means the calling thread.
    ///
    /// Suspending the calling thread outside an atomic section yields at once
    /// and returns only after the thread has been unsuspended and dispatched
    /// again. Inside an atomic section the thread keeps running until its
    /// next yield.
    pub fn suspend(&self, id: Option<ThreadId>) -> SchedResult<()> {
        let in_atomic = self.is_atomic();
        let id = self.resolve(id)?;

        self.with_table(|table| {
            let tcb = table.get_mut(id)?;
            if tcb.status != ThreadStatus::Exited {
                tcb.status = ThreadStatus::Suspended;
            }
            Ok(())
        })?;
        log::debug!("suspended thread {}", id);

        if self.current_thread() == Some(id) && self.can_preempt(in_atomic) {
            return self.yield_now();
        }
        Ok(())
    }

    /// Make a thread eligible for scheduling again. `None` means the calling
    /// thread.
    ///
    /// If the thread outranks the caller (the idle thread ranks below every
    /// thread) and the caller is not in an atomic section, the caller yields
    /// so the thread runs at once.
    pub fn unsuspend(&self, id: Option<ThreadId>) -> SchedResult<()> {
        let in_atomic = self.is_atomic();
        let id = self.resolve(id)?;
        let current = self.current_thread();

        let (priority, current_priority) = self.with_table(|table| {
            let tcb = table.get_mut(id)?;
            if tcb.status == ThreadStatus::Exited {
                return Err(SchedError::InvalidArgument);
            }
            tcb.status = ThreadStatus::Ready;
            let priority = tcb.priority;

            let current_priority = match current {
                Some(current) => table.get(current)?.priority,
                None => 0,
            };
            Ok((priority, current_priority))
        })?;
        log::debug!("unsuspended thread {}", id);

        if priority > current_priority && self.can_preempt(in_atomic) {
            return self.yield_now();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Build every context and switch the kernel into the started state.
    ///
    /// After this, [`dispatch_next`](Self::dispatch_next) may be called
    /// repeatedly from the same execution context; [`start`](Self::start)
    /// does exactly that forever.
    pub fn prepare(&'static self) -> SchedResult<()> {
        if self.is_started() {
            return Err(SchedError::AlreadyStarted);
        }

        let mut idle_stack = self.idle_stack.lock();
        let idle_stack = idle_stack.as_deref_mut().ok_or(SchedError::NotInitialized)?;
        let mut table = self.table.lock();
        let table = table.as_mut().ok_or(SchedError::NotInitialized)?;

        let kernel = self as *const Self as usize;
        let successor = self.scheduler_context.get() as *const A::SavedContext;

        // Safety: every context lives inside `self` or the `'static` table,
        // and every stack is a `'static` slice used by nothing else.
        unsafe {
            A::get_context(self.scheduler_context.get())?;
            A::make_context(
                self.idle_context.get(),
                idle_stack.as_mut_ptr(),
                idle_stack.len(),
                successor,
                idle_trampoline::<A>,
                kernel,
            )?;
        }

        for tcb in table.threads_mut() {
            let stack = tcb.stack.as_deref_mut().ok_or(SchedError::InvalidArgument)?;
            let (stack, stack_size) = (stack.as_mut_ptr(), stack.len());
            unsafe {
                A::make_context(
                    &mut tcb.context,
                    stack,
                    stack_size,
                    successor,
                    thread_trampoline::<A>,
                    kernel,
                )?;
            }
        }

        A::disable_interrupts();
        self.started.store(true, Ordering::Release);
        log::info!("scheduler started with {} threads", table.len());
        Ok(())
    }

    /// Select the next thread and switch to it.
    ///
    /// Returns once the dispatched thread (or the idle thread) hands control
    /// back, with the id that was dispatched (`None` for idle).
    pub fn dispatch_next(&self) -> SchedResult<Option<ThreadId>> {
        if !self.is_started() {
            return Err(SchedError::NotStarted);
        }

        let (next, context) = self.with_table(|table| match select_next(table.threads()) {
            Some(index) => {
                mark_dispatched(table.threads_mut(), index);
                let id = ThreadId::from_index(index);
                Ok((Some(id), table.context_ptr(id)? as *const A::SavedContext))
            }
            None => Ok((None, self.idle_context.get() as *const A::SavedContext)),
        })?;

        self.current
            .store(next.map_or(IDLE_THREAD_ID, ThreadId::get), Ordering::Release);
        log::trace!("dispatching {:?}", next);

        // Safety: both contexts are built by `prepare` and live as long as
        // the kernel.
        unsafe { A::swap_context(self.scheduler_context.get(), context)? };
        Ok(next)
    }

    /// Start scheduling. Never returns on success.
    ///
    /// Failed context switches are logged and the loop moves on to the
    /// next selection.
    pub fn start(&'static self) -> SchedResult<Infallible> {
        self.prepare()?;
        loop {
            if let Err(e) = self.dispatch_next() {
                log::error!("dispatch failed: {}", e);
            }
        }
    }

    /// Hand the CPU back to the scheduler.
    pub fn yield_now(&self) -> SchedResult<()> {
        if !self.is_started() {
            return Err(SchedError::NotStarted);
        }

        let context = match self.current.load(Ordering::Acquire) {
            NO_THREAD => return Err(SchedError::NoCurrentThread),
            IDLE_THREAD_ID => self.idle_context.get(),
            current => {
                let id = ThreadId::new(current).ok_or(SchedError::NoCurrentThread)?;
                self.with_table(|table| table.context_ptr(id))
                    .map_err(|_| SchedError::NoCurrentThread)?
            }
        };

        // Safety: `context` belongs to the running thread and the scheduler
        // context was saved by the dispatch that started it.
        unsafe { A::swap_context(context, self.scheduler_context.get())? };
        Ok(())
    }

    /// Body of every admitted thread: run the entry, then retire the thread
    /// if the entry ever returns.
    fn run_current(&self) {
        let Some(id) = self.current_thread() else {
            return;
        };

        let entry = self.with_table(|table| {
            let tcb = table.get(id)?;
            Ok((tcb.entry, tcb.arg))
        });
        if let Ok((Some(entry), arg)) = entry {
            entry(arg);
        }

        let _ = self.with_table(|table| {
            table.get_mut(id)?.status = ThreadStatus::Exited;
            Ok(())
        });
        log::warn!("thread {} returned from its entry function", id);
    }

    // ------------------------------------------------------------------
    // Ticks and sleep
    // ------------------------------------------------------------------

    /// Suspend the calling thread for `ticks` timer ticks.
    ///
    /// A deadline past the counter's wraparound is held back until the
    /// counter has wrapped. A sleep of zero ticks is a plain yield. The
    /// interrupt state found on entry is restored before returning.
    ///
    /// If the switch away fails the thread is made Ready again before the
    /// error is returned.
    pub fn sleep_for_ticks(&self, ticks: Tick) -> SchedResult<()> {
        if !self.is_started() {
            return Err(SchedError::NotStarted);
        }
        let id = self.current_thread().ok_or(SchedError::NoCurrentThread)?;
        if ticks == 0 {
            return self.yield_now();
        }

        let _irq = InterruptGuard::<A>::new();
        self.with_table(|table| {
            let (wake_up_at, wake) = wake_deadline(self.ticks.ticks(), ticks);
            let tcb = table.get_mut(id)?;
            tcb.wake_up_at = wake_up_at;
            tcb.wake = wake;
            tcb.status = ThreadStatus::Suspended;
            log::debug!("thread {} sleeping until tick {} ({:?})", id, wake_up_at, wake);
            Ok(())
        })?;

        let result = self.yield_now();

        self.with_table(|table| {
            let tcb = table.get_mut(id)?;
            tcb.wake = WakeSchedule::None;
            if result.is_err() && tcb.status == ThreadStatus::Suspended {
                tcb.status = ThreadStatus::Ready;
            }
            Ok(())
        })?;
        result
    }

    /// Advance the tick counter by one and wake every sleeper whose deadline
    /// has arrived. Returns whether any thread woke.
    ///
    /// Does nothing before start. Never yields; see
    /// [`tick_from_isr`](Self::tick_from_isr).
    pub fn increase_tick_count(&self) -> bool {
        if !self.is_started() {
            return false;
        }

        let _irq = InterruptGuard::<A>::new();
        let now = self.ticks.advance();
        let mut table = self.table.lock();
        table.as_mut().map_or(false, |table| table.wake_sleepers(now))
    }

    /// Tick handler body: advance the counter and yield if a thread woke.
    pub fn tick_from_isr(&self) -> SchedResult<bool> {
        let woke = self.increase_tick_count();
        if woke && self.can_preempt(self.is_atomic()) {
            self.yield_now()?;
        }
        Ok(woke)
    }

    /// Arm the port's periodic tick.
    pub fn enable_tick_interrupt(&self) -> SchedResult<()> {
        A::enable_tick_interrupt()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Atomic sections
    // ------------------------------------------------------------------

    pub fn begin_atomic(&self) -> SchedResult<()> {
        self.atomic.begin()
    }

    pub fn end_atomic(&self) -> SchedResult<()> {
        self.atomic.end()
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic.is_atomic()
    }

    /// The nesting counter, for RAII use through
    /// [`AtomicSection::enter`].
    pub fn atomic_section(&self) -> &AtomicSection<A> {
        &self.atomic
    }

    pub fn are_interrupts_enabled(&self) -> bool {
        A::interrupts_enabled()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The dispatched thread, or `None` when idle or not yet dispatching.
    pub fn current_thread(&self) -> Option<ThreadId> {
        match self.current.load(Ordering::Acquire) {
            NO_THREAD => None,
            current => ThreadId::new(current),
        }
    }

    pub fn tick_count(&self) -> Tick {
        self.ticks.ticks()
    }

    pub fn tick_counter(&self) -> &TickCounter {
        &self.ticks
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of admitted threads.
    pub fn thread_count(&self) -> usize {
        self.with_table(|table| Ok(table.len())).unwrap_or(0)
    }

    pub fn thread_status(&self, id: ThreadId) -> SchedResult<ThreadStatus> {
        self.with_table(|table| Ok(table.get(id)?.status()))
    }

    pub fn thread_priority(&self, id: ThreadId) -> SchedResult<u8> {
        self.with_table(|table| Ok(table.get(id)?.priority()))
    }

    /// Register this kernel as the global kernel for interrupt handlers.
    ///
    /// # Safety
    ///
    /// Only one kernel may be registered, and every later
    /// [`get_global_kernel`] or [`tick_interrupt`] call must name the same
    /// `A` this kernel was built with.
    pub unsafe fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const _ as *mut (), Ordering::Release);
    }
}

impl<A: Arch> Default for Kernel<A> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: the table and idle stack are behind locks taken with interrupts
// disabled; the contexts are only touched by whichever context owns the CPU.
unsafe impl<A: Arch> Send for Kernel<A> {}
unsafe impl<A: Arch> Sync for Kernel<A> {}

extern "C" fn thread_trampoline<A: Arch>(kernel: usize) {
    // Safety: `prepare` passes the address of a `'static` kernel.
    let kernel = unsafe { &*(kernel as *const Kernel<A>) };
    kernel.run_current();
}

extern "C" fn idle_trampoline<A: Arch>(_kernel: usize) {
    loop {
        // The dispatch path leaves interrupts disabled.
        if !A::interrupts_enabled() {
            A::enable_interrupts();
        }
        A::wait_for_interrupt();
    }
}

/// Get the global kernel reference (for interrupt handlers).
///
/// Returns None if no kernel has been registered.
pub fn get_global_kernel<A: Arch>() -> Option<&'static Kernel<A>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &*(ptr as *const Kernel<A>) })
    }
}

/// Entry point for a port's tick ISR.
pub fn tick_interrupt<A: Arch>() {
    if let Some(kernel) = get_global_kernel::<A>() {
        if let Err(e) = kernel.tick_from_isr() {
            log::warn!("tick interrupt: {}", e);
        }
    }
}
