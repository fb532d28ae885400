#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Static, priority-based preemptible scheduler for small embedded targets.
//!
//! Everything is allocated by the application: the thread table, every
//! thread stack and the idle stack are `'static` buffers handed to the
//! kernel before it starts. The crate itself is `no_std` and never touches a
//! heap.
//!
//! # Features
//!
//! - `posix` (default): POSIX reference port on `ucontext` coroutines with
//!   `SIGALRM` as the tick interrupt (Linux/glibc only)
//!
//! Embedded builds disable default features and implement [`Arch`] for
//! their target.
//!
//! # Quick Start
//!
//! ```ignore
//! use static_rtos::{Kernel, PosixArch, Tcb};
//!
//! static KERNEL: Kernel<PosixArch> = Kernel::new();
//! static mut THREADS: [Tcb<PosixArch>; 2] = [Tcb::VACANT; 2];
//! static mut STACK: [u8; 64 * 1024] = [0; 64 * 1024];
//! static mut IDLE_STACK: [u8; 16 * 1024] = [0; 16 * 1024];
//!
//! fn worker(_arg: usize) {
//!     loop {
//!         /* thread work */
//!         KERNEL.sleep_for_ticks(100).ok();
//!     }
//! }
//!
//! fn main() {
//!     unsafe {
//!         KERNEL.provide_threads_array(&mut *core::ptr::addr_of_mut!(THREADS)).unwrap();
//!         KERNEL.provide_idle_thread_stack(&mut *core::ptr::addr_of_mut!(IDLE_STACK)).unwrap();
//!         KERNEL.create_thread_static(worker, 0, &mut *core::ptr::addr_of_mut!(STACK), 1).unwrap();
//!         KERNEL.register_global();
//!     }
//!     KERNEL.enable_tick_interrupt().unwrap();
//!     KERNEL.start().unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! - [`arch`]: the context and interrupt contract a port implements
//! - [`critical`]: nested atomic sections
//! - [`thread`]: thread control blocks and the thread table
//! - [`sched`]: next-thread selection
//! - [`time`]: tick counting and sleep deadlines
//! - [`kernel`]: the scheduler object tying these together
//!
//! Stack sizing is the application's responsibility. Overflowing a thread
//! stack is not detected.

pub mod arch;
pub mod critical;
pub mod errors;
pub mod kernel;
pub mod sched;
pub mod thread;
pub mod time;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests;

// Panic handler for bare-metal
#[cfg(all(not(test), target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, InterruptGuard};

#[cfg(all(feature = "posix", target_os = "linux", target_env = "gnu"))]
pub use arch::PosixArch;

// Kernel
pub use kernel::{get_global_kernel, tick_interrupt, Kernel, IDLE_THREAD_ID};

// Critical sections
pub use critical::{AtomicGuard, AtomicSection};

// Threads
pub use thread::{Tcb, ThreadEntry, ThreadId, ThreadStatus};

// Time
pub use time::{Tick, TickCounter, WakeSchedule};

// Errors
pub use errors::{ArchError, SchedError, SchedResult};
