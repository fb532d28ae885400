//! Next-thread selection over the thread table.
//!
//! Strict priority with round-robin among equal priorities. There is no
//! rotation cursor: the rotation point is rebuilt on every call from the
//! `last_run` flags, so suspending and unsuspending a thread never disturbs
//! its place in the rotation.

use crate::arch::Arch;
use crate::thread::Tcb;

/// Pick the table index of the next thread to dispatch.
///
/// Returns `None` when no admitted thread is schedulable, meaning the idle
/// thread should run.
pub fn select_next<A: Arch>(threads: &[Tcb<A>]) -> Option<usize> {
    let mut max_priority = 0u8;
    let mut first_index = None;
    let mut last_run_index = None;

    for (index, tcb) in threads.iter().enumerate() {
        if !tcb.is_schedulable() {
            continue;
        }
        if tcb.priority > max_priority {
            max_priority = tcb.priority;
            first_index = Some(index);
            last_run_index = tcb.last_run.then_some(index);
        } else if tcb.priority == max_priority && tcb.last_run && last_run_index.is_none() {
            last_run_index = Some(index);
        }
    }

    let first_index = first_index?;
    let Some(last_run_index) = last_run_index else {
        return Some(first_index);
    };

    let after = last_run_index + 1;
    let next = threads[after..]
        .iter()
        .position(|tcb| tcb.is_schedulable() && tcb.priority == max_priority)
        .map(|offset| after + offset);

    Some(next.unwrap_or(first_index))
}

/// Record that the thread at `index` was dispatched: it becomes the only
/// thread of its priority with `last_run` set.
pub fn mark_dispatched<A: Arch>(threads: &mut [Tcb<A>], index: usize) {
    let Some(priority) = threads.get(index).map(|tcb| tcb.priority) else {
        return;
    };
    for tcb in threads.iter_mut().filter(|tcb| tcb.priority == priority) {
        tcb.last_run = false;
    }
    threads[index].last_run = true;
}
