//! Two equal-priority workers take turns, then park themselves; a
//! higher-priority thread sleeps on the SIGALRM tick and ends the demo.
//!
//! Run with `cargo run --example posix_round_robin`.

use static_rtos::sched::priority;
use static_rtos::{Kernel, PosixArch, SchedError, Tcb};
use std::ptr::addr_of_mut;

const STACK_SIZE: usize = 256 * 1024;
const NAMES: [&str; 2] = ["ping", "pong"];

static KERNEL: Kernel<PosixArch> = Kernel::new();
static mut THREADS: [Tcb<PosixArch>; 3] = [Tcb::VACANT; 3];
static mut STACKS: [[u8; STACK_SIZE]; 3] = [[0; STACK_SIZE]; 3];
static mut IDLE_STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Print with the tick masked so the ISR never switches away mid-write.
fn say(args: std::fmt::Arguments<'_>) {
    let _quiet = KERNEL.atomic_section().enter();
    println!("{}", args);
}

fn worker(index: usize) {
    for round in 0..3 {
        say(format_args!("{} {}", NAMES[index], round));
        let _ = KERNEL.yield_now();
    }
    say(format_args!("{} parked", NAMES[index]));
    let _ = KERNEL.suspend(None);
}

fn sleeper(_arg: usize) {
    let clock = KERNEL.tick_counter();
    for wake in 1..=5 {
        let _ = KERNEL.sleep_for_ticks(200);
        let now = clock.ticks();
        say(format_args!(
            "sleeper woke at tick {} ({} ms at {} Hz, {}/5)",
            now,
            clock.ticks_to_millis(now).unwrap_or(0),
            clock.frequency(),
            wake
        ));
    }
    std::process::exit(0);
}

fn main() -> Result<(), SchedError> {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }

    // Safety: the statics are handed to the kernel once and never touched
    // again from here.
    unsafe {
        let stacks = &mut *addr_of_mut!(STACKS);
        let [first, second, third] = stacks;

        KERNEL.provide_threads_array(&mut *addr_of_mut!(THREADS))?;
        KERNEL.provide_idle_thread_stack(&mut *addr_of_mut!(IDLE_STACK))?;
        KERNEL.create_thread_static(worker, 0, first, priority::NORMAL)?;
        KERNEL.create_thread_static(worker, 1, second, priority::NORMAL)?;
        KERNEL.create_thread_static(sleeper, 0, third, priority::HIGH)?;
        KERNEL.register_global();
    }

    KERNEL.enable_tick_interrupt()?;
    match KERNEL.start()? {}
}
