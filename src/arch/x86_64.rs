//! x86_64 (System V) context switching.
//!
//! A suspended process keeps its callee-saved registers spilled on its own
//! stack; the saved context is just the resulting stack pointer.

use core::arch::naked_asm;

use super::Context;
use crate::heap::Region;
use crate::proc::EntryFn;

/// Words in a synthetic initial frame: six callee-saved registers, the resume
/// target, and the slot a normal return from the resume target consumes.
const FRAME_WORDS: usize = 8;

/// Saves the caller's state into `save` and resumes the context in `resume`.
/// Returns once the saved context is resumed again.
///
/// # Safety
///
/// `save` must point to a live `Context`. `resume` must come from
/// [`prepare_stack`] or an earlier save, and its stack must still be intact.
/// Must not be called with any lock held.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_save: *mut Context, _resume: Context) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

/// Resumes the context in `resume` without saving anything; the calling stack
/// is abandoned for good.
///
/// # Safety
///
/// Same requirements on `resume` as [`switch`]. Nothing may reference the
/// abandoned stack afterwards.
#[unsafe(naked)]
pub unsafe extern "C" fn launch(_resume: Context) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

// Sits in the return-address slot of every synthetic frame. Reached by `ret`
// with a 16-byte-aligned stack, so the `call` below re-establishes the normal
// calling convention for the termination path.
#[unsafe(naked)]
extern "C" fn return_trap() -> ! {
    naked_asm!(
        "call {exit}",
        "ud2",
        exit = sym crate::scheduler::exit_process,
    )
}

/// Writes the synthetic initial frame for a fresh process stack.
///
/// The frame simulates "`entry` was called by the termination trap" without
/// any such call having happened: the first resume `ret`s into `entry`, and
/// if `entry` ever returns normally, the next `ret` lands in the trap rather
/// than in undefined memory.
///
/// # Safety
///
/// `stack` must be an unused region large enough for the frame.
pub unsafe fn prepare_stack(stack: &Region, entry: EntryFn) -> Context {
    let top = (stack.as_ptr() as usize + stack.len()) & !0xf;
    let sp = top - FRAME_WORDS * 8;
    let frame = sp as *mut usize;
    unsafe {
        for word in 0..6 {
            frame.add(word).write(0); // r15, r14, r13, r12, rbx, rbp
        }
        frame.add(6).write(entry as usize);
        frame.add(7).write(return_trap as usize);
    }
    Context { sp }
}
