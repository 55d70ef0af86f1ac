//! Architecture-specific execution-context primitives.
//!
//! Everything the rest of the kernel knows about a suspended process is an
//! opaque [`Context`]. The per-architecture modules provide exactly three
//! operations over it:
//!
//! - [`switch`]: save the caller's live callee-saved state into one context
//!   and resume execution from another. From the resumed side this call
//!   simply returns, whether it is returning from an earlier suspension or
//!   "returning" into an entry function for the first time.
//! - [`launch`]: resume a context without saving anything; the calling stack
//!   is abandoned permanently. Used for the one-time bootstrap dispatch and
//!   for the hand-off away from an exiting process.
//! - [`prepare_stack`]: write the synthetic initial frame onto a fresh stack.
//!   Postcondition: resuming the returned context a first time transfers
//!   control to the entry function, and a normal return from the entry
//!   function transfers control to the termination path.

use const_default::ConstDefault;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::{launch, prepare_stack, switch};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::{launch, prepare_stack, switch};

#[cfg(target_arch = "riscv64")]
mod riscv64;
#[cfg(target_arch = "riscv64")]
pub use riscv64::{launch, prepare_stack, switch};

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "riscv64"
)))]
compile_error!("no context-switch support for this architecture");

/// A saved execution context: the stack pointer captured when a process last
/// suspended, or the one prepared at creation time for a process that has
/// never run.
#[derive(ConstDefault, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Context {
    pub(crate) sp: usize,
}

impl Context {
    /// A cleared context, held by slots that have nothing to resume.
    pub const fn null() -> Self {
        Context { sp: 0 }
    }
}
