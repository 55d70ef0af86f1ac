//! riscv64 context switching.
//!
//! `ra` and `s0`-`s11` are spilled to the suspended stack; the saved context
//! is the resulting stack pointer. Fresh processes are entered through a
//! launch pad (the restored `ra`) that calls the entry function out of `s1`
//! and falls through into the termination path if it returns.

use core::arch::naked_asm;

use super::Context;
use crate::heap::Region;
use crate::proc::EntryFn;

/// ra, s0-s11, plus one pad word to keep the frame 16-byte aligned.
const FRAME_WORDS: usize = 14;

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
        "addi sp, sp, -112",
        "sd ra, 0(sp)",
        "sd s0, 8(sp)",
        "sd s1, 16(sp)",
        "sd s2, 24(sp)",
        "sd s3, 32(sp)",
        "sd s4, 40(sp)",
        "sd s5, 48(sp)",
        "sd s6, 56(sp)",
        "sd s7, 64(sp)",
        "sd s8, 72(sp)",
        "sd s9, 80(sp)",
        "sd s10, 88(sp)",
        "sd s11, 96(sp)",
        "sd sp, 0(a0)",
        "mv sp, a1",
        "ld ra, 0(sp)",
        "ld s0, 8(sp)",
        "ld s1, 16(sp)",
        "ld s2, 24(sp)",
        "ld s3, 32(sp)",
        "ld s4, 40(sp)",
        "ld s5, 48(sp)",
        "ld s6, 56(sp)",
        "ld s7, 64(sp)",
        "ld s8, 72(sp)",
        "ld s9, 80(sp)",
        "ld s10, 88(sp)",
        "ld s11, 96(sp)",
        "addi sp, sp, 112",
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
        "mv sp, a0",
        "ld ra, 0(sp)",
        "ld s0, 8(sp)",
        "ld s1, 16(sp)",
        "ld s2, 24(sp)",
        "ld s3, 32(sp)",
        "ld s4, 40(sp)",
        "ld s5, 48(sp)",
        "ld s6, 56(sp)",
        "ld s7, 64(sp)",
        "ld s8, 72(sp)",
        "ld s9, 80(sp)",
        "ld s10, 88(sp)",
        "ld s11, 96(sp)",
        "addi sp, sp, 112",
        "ret",
    )
}

// First-resume target for fresh stacks: the restored ra points here and the
// restored s1 holds the entry function.
#[unsafe(naked)]
extern "C" fn launch_pad() -> ! {
    naked_asm!(
        "jalr s1",
        "tail {exit}",
        exit = sym crate::scheduler::exit_process,
    )
}

/// Writes the synthetic initial frame for a fresh process stack.
///
/// The first resume restores `s1 = entry` and `ra = launch_pad`, so control
/// reaches `entry` with an aligned stack; a normal return from `entry` falls
/// through the pad into the termination path.
///
/// # Safety
///
/// `stack` must be an unused region large enough for the frame.
pub unsafe fn prepare_stack(stack: &Region, entry: EntryFn) -> Context {
    let top = (stack.as_ptr() as usize + stack.len()) & !0xf;
    let sp = top - FRAME_WORDS * 8;
    let frame = sp as *mut usize;
    unsafe {
        for word in 0..FRAME_WORDS {
            frame.add(word).write(0);
        }
        frame.add(0).write(launch_pad as usize); // ra
        frame.add(2).write(entry as usize); // s1
    }
    Context { sp }
}
