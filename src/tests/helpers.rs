//! Test helper utilities and common functionality.

use crate::arch::sim::SimArch;
use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::thread::{Tcb, ThreadEntry, ThreadId};
use std::boxed::Box;
use std::vec::Vec;

/// Stack size for threads that never really run (simulated CPU).
pub(crate) const SIM_STACK_SIZE: usize = 256;

pub(crate) fn leak_stack(size: usize) -> &'static mut [u8] {
    Box::leak(std::vec![0u8; size].into_boxed_slice())
}

pub(crate) fn leak_slots<A: Arch>(capacity: usize) -> &'static mut [Tcb<A>] {
    let slots: Vec<Tcb<A>> = (0..capacity).map(|_| Tcb::VACANT).collect();
    Box::leak(slots.into_boxed_slice())
}

/// A kernel with a table of `capacity` slots and an idle stack installed.
pub(crate) fn leak_kernel<A: Arch>(capacity: usize, idle_stack: usize) -> &'static Kernel<A> {
    let kernel: &'static Kernel<A> = Box::leak(Box::new(Kernel::new()));
    kernel
        .provide_threads_array(leak_slots(capacity))
        .expect("fresh kernel accepts a table");
    kernel
        .provide_idle_thread_stack(leak_stack(idle_stack))
        .expect("fresh kernel accepts an idle stack");
    kernel
}

/// Reset the simulated CPU and build a kernel on it.
pub(crate) fn sim_kernel(capacity: usize) -> &'static Kernel<SimArch> {
    SimArch::reset();
    leak_kernel(capacity, SIM_STACK_SIZE)
}

pub(crate) fn spawn<A: Arch>(
    kernel: &'static Kernel<A>,
    entry: ThreadEntry,
    arg: usize,
    stack_size: usize,
    priority: u8,
) -> ThreadId {
    kernel
        .create_thread_static(entry, arg, leak_stack(stack_size), priority)
        .expect("thread admitted")
}

pub(crate) fn sim_spawn(kernel: &'static Kernel<SimArch>, priority: u8) -> ThreadId {
    spawn(kernel, never_entered, 0, SIM_STACK_SIZE, priority)
}

/// Thread body for simulated threads; never actually entered.
pub(crate) fn never_entered(_arg: usize) {}

/// Dispatch `count` times and collect what was dispatched.
pub(crate) fn dispatch_n<A: Arch>(kernel: &Kernel<A>, count: usize) -> Vec<Option<ThreadId>> {
    (0..count)
        .map(|_| kernel.dispatch_next().expect("dispatch succeeds"))
        .collect()
}

/// Simple linear congruential generator for property testing.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 16
    }

    pub(crate) fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + (self.next_u64() % (max - min))
    }

    pub(crate) fn gen_bool(&mut self) -> bool {
        self.next_u64() & 1 == 0
    }
}
