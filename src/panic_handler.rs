//! Bare-metal panic strategy: report on the console, halt the CPU.
//!
//! A panic in this kernel means an unrecoverable invariant violation (a dead
//! idle slot, a corrupted stack lifetime). There is no context to continue
//! in, so the CPU is parked for good.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    crate::println!("kernel panic: {info}");
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            riscv::asm::wfi()
        };
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}
