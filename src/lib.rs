//! krill: a minimal cooperative multiprocessing kernel core.
//!
//! One CPU, one address space, no interrupts for scheduling: processes run
//! until they voluntarily yield or exit, and the dispatcher hands the CPU
//! around in strict round-robin order. The pieces:
//!
//! - [`heap`]: a fixed arena with an intrusive free list, backing every
//!   process stack.
//! - [`proc`]: the fixed-capacity process table; a pid is its slot index.
//! - [`scheduler`]: selection, dispatch, yield and exit.
//! - [`arch`]: the narrow unsafe surface that actually swaps stacks.
//! - [`console`] and [`shell`]: byte I/O and the interactive process that
//!   owns slot 0.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod console;
pub mod heap;
pub mod proc;
pub mod scheduler;
pub mod shell;

#[cfg(all(target_os = "none", not(test)))]
mod panic_handler;

use crate::console::Console;

/// Brings the kernel up and never returns.
///
/// Order matters: console and logging first so every later step can report,
/// then the heap, then the process table, then the shell process (which must
/// land in the idle slot), and finally the dispatcher.
pub fn boot(console: &'static dyn Console) -> ! {
    console::install(console);
    console::init_logging();
    // SAFETY: boot runs once, before any allocation, on the only context.
    unsafe { heap::init() };
    proc::init();
    match proc::spawn(shell::main) {
        Ok(pid) => debug_assert_eq!(pid, scheduler::IDLE_PID),
        Err(err) => panic!("boot: cannot create the shell process: {err}"),
    }
    scheduler::start()
}
