//! Process control records and the fixed-capacity process table.
//!
//! A process id is its table slot index. Slots are reused lowest-index-first
//! once their occupant has terminated, which keeps the well-known shell
//! process at id 0 and makes reuse predictable. The table also carries the
//! two pieces of scheduler-wide state (the currently running pid and the
//! bootstrapped flag) so the whole bundle can be driven as a plain value in
//! tests.

use core::fmt;

use const_default::ConstDefault;
use spin::Mutex;
use static_assertions::const_assert;

use crate::arch::{self, Context};
use crate::heap::{Arena, HEAP, OutOfMemory, Region};

/// Maximum number of concurrent processes.
pub const MAX_PROCESSES: usize = 16;

/// Stack handed to every new process.
pub const STACK_SIZE: usize = 16 * 1024;

const_assert!(MAX_PROCESSES > 0);
const_assert!(STACK_SIZE % 16 == 0);

/// Process ID type.
pub type Pid = usize;

/// Entry point of a process.
pub type EntryFn = extern "C" fn();

/// Process states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Eligible for selection.
    Ready,
    /// Currently on the CPU. At most one process is in this state.
    Running,
    /// Slot is reusable; the stack has been handed back.
    Terminated,
}

impl ConstDefault for ProcessState {
    const DEFAULT: Self = ProcessState::Terminated;
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Terminated => "TERMINATED",
        };
        f.pad(name)
    }
}

/// Process control record.
pub struct Process {
    pid: Pid,
    state: ProcessState,
    /// Where the process began executing; kept for diagnostics.
    entry: EntryFn,
    /// Owned exclusively by this record until termination.
    stack: Option<Region>,
    /// Saved execution context from the last suspension (or the synthetic
    /// one prepared at creation for a process that has never run).
    context: Context,
}

impl Process {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }
}

/// Errors that can occur during process creation. Both are recoverable: the
/// caller reports and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// No free process slot.
    TableFull,
    /// The allocator could not provide a stack.
    OutOfMemory,
}

impl From<OutOfMemory> for CreateError {
    fn from(_: OutOfMemory) -> Self {
        CreateError::OutOfMemory
    }
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            CreateError::TableFull => "process table is full",
            CreateError::OutOfMemory => "out of memory for a process stack",
        };
        f.write_str(message)
    }
}

/// One row of a process-table snapshot.
#[derive(ConstDefault, Debug, Clone, Copy)]
pub struct ListEntry {
    pub pid: Pid,
    pub state: ProcessState,
    /// Entry-point address, for the diagnostic listing.
    pub entry: usize,
}

/// Consistent snapshot of all live (non-terminated) processes, in pid order.
pub struct ProcessList {
    entries: [ListEntry; MAX_PROCESSES],
    len: usize,
}

impl ProcessList {
    pub fn iter(&self) -> core::slice::Iter<'_, ListEntry> {
        self.entries[..self.len].iter()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The process table, the currently running pid, and the bootstrapped flag.
pub struct ProcTable {
    procs: [Option<Process>; MAX_PROCESSES],
    current: Option<Pid>,
    /// Whether any process has ever been dispatched.
    bootstrapped: bool,
}

// SAFETY: only reachable through a lock; stack regions it owns point into the
// heap arena and are never aliased while the record is live.
unsafe impl Send for ProcTable {}

impl ProcTable {
    pub const fn new() -> Self {
        Self {
            procs: [const { None }; MAX_PROCESSES],
            current: None,
            bootstrapped: false,
        }
    }

    /// Lowest-index slot that has never been used or whose occupant has
    /// terminated.
    fn find_free_slot(&self) -> Option<usize> {
        self.procs.iter().position(|slot| match slot {
            None => true,
            Some(process) => process.state == ProcessState::Terminated,
        })
    }

    /// Creates a new process in `Ready` state.
    ///
    /// Fails without touching the table when no slot is free or the allocator
    /// cannot provide a stack.
    pub fn create(&mut self, arena: &mut Arena, entry: EntryFn) -> Result<Pid, CreateError> {
        let pid = self.find_free_slot().ok_or(CreateError::TableFull)?;
        let stack = arena.alloc(STACK_SIZE)?;
        // SAFETY: the region is freshly allocated and at least STACK_SIZE.
        let context = unsafe { arch::prepare_stack(&stack, entry) };
        self.procs[pid] = Some(Process {
            pid,
            state: ProcessState::Ready,
            entry,
            stack: Some(stack),
            context,
        });
        Ok(pid)
    }

    /// Tears down `pid`: marks it terminated, clears the saved context, and
    /// hands the stack region back to the caller.
    ///
    /// Not a general-purpose kill: the only legitimate caller is the
    /// dispatcher's exit path, which owns the free-then-switch ordering for
    /// the returned region.
    pub fn terminate(&mut self, pid: Pid) -> Option<Region> {
        let process = self.procs.get_mut(pid)?.as_mut()?;
        process.state = ProcessState::Terminated;
        process.context = Context::null();
        process.stack.take()
    }

    /// Snapshot of all non-terminated slots, taken in one go.
    pub fn list(&self) -> ProcessList {
        let mut entries = [ListEntry::DEFAULT; MAX_PROCESSES];
        let mut len = 0;
        for process in self.procs.iter().flatten() {
            if process.state != ProcessState::Terminated {
                entries[len] = ListEntry {
                    pid: process.pid,
                    state: process.state,
                    entry: process.entry as usize,
                };
                len += 1;
            }
        }
        ProcessList { entries, len }
    }

    pub fn state_of(&self, pid: Pid) -> Option<ProcessState> {
        self.procs.get(pid)?.as_ref().map(|p| p.state)
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    /// Re-arms `pid` for future selection. Every process, the idle one
    /// included, goes back to `Ready` when it yields.
    pub(crate) fn rearm(&mut self, pid: Pid) {
        if let Some(process) = self.procs.get_mut(pid).and_then(Option::as_mut) {
            if process.state != ProcessState::Terminated {
                process.state = ProcessState::Ready;
            }
        }
    }

    /// `Running` -> `Ready`, for the process losing the CPU.
    pub(crate) fn demote(&mut self, pid: Pid) {
        if let Some(process) = self.procs.get_mut(pid).and_then(Option::as_mut) {
            if process.state == ProcessState::Running {
                process.state = ProcessState::Ready;
            }
        }
    }

    /// Makes `pid` the running process.
    pub(crate) fn promote(&mut self, pid: Pid) {
        if let Some(process) = self.procs.get_mut(pid).and_then(Option::as_mut) {
            process.state = ProcessState::Running;
        }
        self.current = Some(pid);
    }

    pub(crate) fn clear_current(&mut self) {
        self.current = None;
    }

    pub(crate) fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub(crate) fn mark_bootstrapped(&mut self) {
        self.bootstrapped = true;
    }

    pub(crate) fn saved_context(&self, pid: Pid) -> Option<Context> {
        self.procs.get(pid)?.as_ref().map(|p| p.context)
    }

    /// Raw pointer to the context slot of `pid`, for the register exchange.
    /// The pointer stays valid after the table lock is dropped: slots are
    /// never moved, and nothing else runs until the switch completes.
    pub(crate) fn context_slot(&mut self, pid: Pid) -> *mut Context {
        let process = self.procs[pid]
            .as_mut()
            .expect("context_slot: no such process");
        &raw mut process.context
    }
}

/// Global process table.
pub(crate) static PROC_TABLE: Mutex<ProcTable> = Mutex::new(ProcTable::new());

/// Resets the process table to empty.
pub fn init() {
    *PROC_TABLE.lock() = ProcTable::new();
    log::debug!("process table: {} slots", MAX_PROCESSES);
}

/// Creates a new process around `entry` and reports its pid.
pub fn spawn(entry: EntryFn) -> Result<Pid, CreateError> {
    let pid = {
        let mut table = PROC_TABLE.lock();
        let mut heap = HEAP.lock();
        table.create(&mut heap, entry)?
    };
    log::info!("process {pid} created");
    Ok(pid)
}

/// Snapshot of all live processes.
pub fn list() -> ProcessList {
    PROC_TABLE.lock().list()
}

/// Current state of `pid`, if the slot has ever been used.
pub fn state_of(pid: Pid) -> Option<ProcessState> {
    PROC_TABLE.lock().state_of(pid)
}

/// Pid of the currently running process.
pub fn current() -> Option<Pid> {
    PROC_TABLE.lock().current()
}
