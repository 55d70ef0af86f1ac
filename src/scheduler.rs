//! Round-robin cooperative scheduler and dispatcher.
//!
//! Rescheduling happens only when a process calls [`yield_now`] or [`exit`]
//! (or when an entry function returns, which lands in the same exit path).
//! A dispatch is split in two: [`Scheduler::prepare_dispatch`] makes the
//! selection and performs every state transition while the table is locked,
//! and the executing layer carries out the returned [`Dispatch`] with the
//! architecture primitives after the lock is dropped — no lock is ever held
//! across a context switch.

use crate::arch;
use crate::heap::HEAP;
use crate::proc::{MAX_PROCESSES, PROC_TABLE, Pid, ProcTable, ProcessState};

/// Slot of the designated idle process. It is expected to always re-arm
/// itself to `Ready` before yielding, so selection can always fall back to
/// it.
pub const IDLE_PID: Pid = 0;

/// Outcome of a dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The running process was reselected; no switch overhead.
    NoSwitch,
    /// Load `next` without saving anything: the one-time bootstrap dispatch
    /// (the boot stack is abandoned permanently) or the hand-off away from an
    /// exiting process (whose context is already gone).
    Jump { next: Pid },
    /// Steady-state two-sided exchange between `prev` and `next`.
    Exchange { prev: Pid, next: Pid },
}

/// Simple round-robin scheduler.
pub struct Scheduler;

impl Scheduler {
    /// Selects the next process to run.
    ///
    /// Starting from the slot after the currently running process (slot 0
    /// when nothing is running), scans forward circularly through all slots
    /// exactly once and takes the first `Ready` one. When nothing is `Ready`
    /// the idle slot is selected, provided its process is alive. `None` means
    /// the idle invariant has been violated; there is no safe recovery.
    pub fn select_next(table: &ProcTable) -> Option<Pid> {
        let start = match table.current() {
            Some(current) => current + 1,
            None => 0,
        };
        for offset in 0..MAX_PROCESSES {
            let pid = (start + offset) % MAX_PROCESSES;
            if table.state_of(pid) == Some(ProcessState::Ready) {
                return Some(pid);
            }
        }
        match table.state_of(IDLE_PID) {
            Some(ProcessState::Ready | ProcessState::Running) => Some(IDLE_PID),
            _ => None,
        }
    }

    /// Makes a dispatch decision and applies every state transition: the
    /// outgoing process (if any) drops to `Ready`, the selected one becomes
    /// `Running` and current, and the first decision ever made flips the
    /// bootstrapped flag. The returned plan tells the executing layer which
    /// context operation is left to do.
    ///
    /// # Panics
    ///
    /// Panics when nothing is runnable and the idle slot is dead. That
    /// configuration has no safe continuation: there is no context to hand
    /// the CPU to.
    pub fn prepare_dispatch(table: &mut ProcTable) -> Dispatch {
        let next = Self::select_next(table)
            .unwrap_or_else(|| panic!("scheduler: no runnable process and the idle slot is dead"));

        let prev = table.current();
        if prev == Some(next) {
            // Degenerate reselection of the running process: it keeps the
            // CPU, so it goes back to Running even if it just re-armed.
            table.promote(next);
            return Dispatch::NoSwitch;
        }

        if let Some(prev) = prev {
            table.demote(prev);
        }
        table.promote(next);

        if !table.is_bootstrapped() {
            table.mark_bootstrapped();
            return Dispatch::Jump { next };
        }
        match prev {
            Some(prev) => Dispatch::Exchange { prev, next },
            None => Dispatch::Jump { next },
        }
    }
}

/// Makes one dispatch decision against the global table and carries it out.
fn resched() {
    let plan = Scheduler::prepare_dispatch(&mut PROC_TABLE.lock());
    match plan {
        Dispatch::NoSwitch => {}
        Dispatch::Jump { next } => {
            let context = PROC_TABLE
                .lock()
                .saved_context(next)
                .expect("dispatch: selected process vanished");
            // SAFETY: the context was prepared at creation or saved at the
            // process's last suspension; its stack is owned by the record.
            // No lock is held, and this stack is never referenced again.
            unsafe { arch::launch(context) }
        }
        Dispatch::Exchange { prev, next } => {
            let (save, resume) = {
                let mut table = PROC_TABLE.lock();
                let resume = table
                    .saved_context(next)
                    .expect("dispatch: selected process vanished");
                (table.context_slot(prev), resume)
            };
            // SAFETY: `save` points at prev's context slot, which stays put
            // (slots never move) and unaliased (nothing else runs until the
            // exchange completes); `resume` is a live saved context. No lock
            // is held across the exchange.
            unsafe { arch::switch(save, resume) }
        }
    }
}

/// Enters the dispatcher for the first time. The kernel's boot stack is
/// abandoned permanently; this never returns.
pub fn start() -> ! {
    log::debug!("dispatcher: first dispatch");
    resched();
    unreachable!("dispatcher: bootstrap dispatch returned");
}

/// Voluntarily gives up the CPU. The caller re-arms to `Ready` and returns
/// here once it is selected again.
pub fn yield_now() {
    {
        let mut table = PROC_TABLE.lock();
        if let Some(current) = table.current() {
            table.rearm(current);
        }
    }
    resched();
}

/// Terminates the calling process and never returns.
pub fn exit() -> ! {
    let (pid, stack) = {
        let mut table = PROC_TABLE.lock();
        let pid = table.current().expect("exit: no running process");
        let stack = table
            .terminate(pid)
            .expect("exit: running process had no stack");
        table.clear_current();
        (pid, stack)
    };
    log::info!("process {pid} exited");
    // This call is still executing on the stack being released. That is the
    // one sanctioned exception to "never free a resident stack": nothing else
    // can allocate before the dispatch below, and this context is never
    // resumed once it switches away.
    HEAP.lock().free(stack);
    resched();
    loop {
        core::hint::spin_loop();
    }
}

/// Termination target for a process entry function that returns normally
/// instead of calling [`exit`]. Reached through the synthetic initial frame.
pub(crate) extern "C" fn exit_process() -> ! {
    exit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Arena;
    use crate::proc::STACK_SIZE;

    extern "C" fn nop() {}

    fn with_procs<R>(count: usize, f: impl FnOnce(&mut ProcTable, &mut Arena) -> R) -> R {
        let arena_len = (count + 2) * STACK_SIZE;
        let mut backing = vec![0u64; arena_len / 8];
        let mut arena = Arena::empty();
        unsafe { arena.init(backing.as_mut_ptr().cast(), arena_len) };
        let mut table = ProcTable::new();
        for _ in 0..count {
            table.create(&mut arena, nop).unwrap();
        }
        f(&mut table, &mut arena)
    }

    /// One simulated yield: re-arm the running process, then decide.
    fn yield_step(table: &mut ProcTable) -> Pid {
        if let Some(current) = table.current() {
            table.rearm(current);
        }
        match Scheduler::prepare_dispatch(table) {
            Dispatch::Jump { next } | Dispatch::Exchange { next, .. } => next,
            Dispatch::NoSwitch => table.current().unwrap(),
        }
    }

    #[test]
    fn bootstrap_dispatch_jumps_into_the_first_ready_slot() {
        with_procs(2, |table, _| {
            let plan = Scheduler::prepare_dispatch(table);
            assert_eq!(plan, Dispatch::Jump { next: 0 });
            assert_eq!(table.state_of(0), Some(ProcessState::Running));
            assert_eq!(table.state_of(1), Some(ProcessState::Ready));
            assert_eq!(table.current(), Some(0));
            assert!(table.is_bootstrapped());
        });
    }

    #[test]
    fn second_dispatch_is_a_two_sided_exchange() {
        with_procs(2, |table, _| {
            Scheduler::prepare_dispatch(table);
            table.rearm(0);
            let plan = Scheduler::prepare_dispatch(table);
            assert_eq!(plan, Dispatch::Exchange { prev: 0, next: 1 });
            assert_eq!(table.state_of(0), Some(ProcessState::Ready));
            assert_eq!(table.state_of(1), Some(ProcessState::Running));
        });
    }

    #[test]
    fn round_robin_visits_every_process_in_slot_order() {
        with_procs(3, |table, _| {
            Scheduler::prepare_dispatch(table); // bootstrap -> 0
            let mut order = vec![table.current().unwrap()];
            for _ in 0..6 {
                order.push(yield_step(table));
            }
            assert_eq!(order, [0, 1, 2, 0, 1, 2, 0]);
        });
    }

    #[test]
    fn every_ready_process_appears_in_any_full_window() {
        const N: usize = 4;
        with_procs(N, |table, _| {
            Scheduler::prepare_dispatch(table);
            let mut picks = vec![table.current().unwrap()];
            for _ in 0..3 * N {
                picks.push(yield_step(table));
            }
            for window in picks.windows(N) {
                for pid in 0..N {
                    assert!(window.contains(&pid), "pid {pid} starved in {window:?}");
                }
            }
        });
    }

    #[test]
    fn terminated_slots_are_skipped() {
        with_procs(3, |table, arena| {
            Scheduler::prepare_dispatch(table);
            let stack = table.terminate(1).unwrap();
            arena.free(stack);
            let mut order = Vec::new();
            for _ in 0..4 {
                order.push(yield_step(table));
            }
            assert_eq!(order, [2, 0, 2, 0]);
        });
    }

    #[test]
    fn lone_process_reselection_is_a_noop_that_stays_running() {
        with_procs(1, |table, _| {
            Scheduler::prepare_dispatch(table);
            table.rearm(0);
            let plan = Scheduler::prepare_dispatch(table);
            assert_eq!(plan, Dispatch::NoSwitch);
            assert_eq!(table.state_of(0), Some(ProcessState::Running));
            assert_eq!(table.current(), Some(0));
        });
    }

    #[test]
    fn idle_fallback_selects_the_running_idle_process() {
        with_procs(1, |table, _| {
            Scheduler::prepare_dispatch(table);
            // No rearm: nothing is Ready, the idle process keeps the CPU.
            assert_eq!(Scheduler::select_next(table), Some(IDLE_PID));
            assert_eq!(Scheduler::prepare_dispatch(table), Dispatch::NoSwitch);
            assert_eq!(table.state_of(IDLE_PID), Some(ProcessState::Running));
        });
    }

    #[test]
    fn exit_handoff_has_nothing_to_save() {
        with_procs(2, |table, arena| {
            Scheduler::prepare_dispatch(table); // 0 running
            let stack = table.terminate(0).unwrap();
            table.clear_current();
            arena.free(stack);
            let plan = Scheduler::prepare_dispatch(table);
            assert_eq!(plan, Dispatch::Jump { next: 1 });
        });
    }

    #[test]
    fn selection_reports_a_dead_idle_slot() {
        with_procs(1, |table, arena| {
            let stack = table.terminate(0).unwrap();
            arena.free(stack);
            assert_eq!(Scheduler::select_next(table), None);
        });
    }

    #[test]
    #[should_panic(expected = "idle slot is dead")]
    fn dispatch_with_nothing_runnable_is_fatal() {
        let mut table = ProcTable::new();
        Scheduler::prepare_dispatch(&mut table);
    }
}
