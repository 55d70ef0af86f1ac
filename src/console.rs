//! Character console: the kernel's byte I/O collaborator.
//!
//! The core only needs two primitives from the outside world: a blocking
//! byte write and a non-blocking byte poll. Everything else (line-buffered
//! string writes, blocking reads, formatted printing, the `log` sink) is
//! built on top of whichever [`Console`] device gets installed at boot.

use core::fmt;
use core::fmt::Write;

use spin::Once;

/// A byte-oriented console device.
pub trait Console: Sync {
    /// Blocking write of one byte.
    fn put_byte(&self, byte: u8);
    /// Non-blocking read of one byte.
    fn poll_byte(&self) -> Option<u8>;
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Installs the console device. Only the first install wins; output before
/// any install is dropped.
pub fn install(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

pub fn write_byte(byte: u8) {
    if let Some(console) = CONSOLE.get() {
        console.put_byte(byte);
    }
}

/// Line-disciplined write: LF becomes CRLF on the wire.
pub fn write_str(s: &str) {
    for byte in s.bytes() {
        if byte == b'\n' {
            write_byte(b'\r');
        }
        write_byte(byte);
    }
}

pub fn read_byte_nonblocking() -> Option<u8> {
    CONSOLE.get().and_then(|console| console.poll_byte())
}

/// Blocking read, polling the device until a byte arrives.
pub fn read_byte_blocking() -> u8 {
    loop {
        if let Some(byte) = read_byte_nonblocking() {
            return byte;
        }
        core::hint::spin_loop();
    }
}

struct ConsoleWriter;

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_str(s);
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = ConsoleWriter.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Console-backed `log` sink.
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Routes `log` records to the console at `info` and above. Later calls keep
/// the logger that is already installed.
pub fn init_logging() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Console over the SBI legacy byte interface.
#[cfg(target_arch = "riscv64")]
pub struct SbiConsole;

#[cfg(target_arch = "riscv64")]
impl Console for SbiConsole {
    fn put_byte(&self, byte: u8) {
        sbi::legacy::console_putchar(byte);
    }

    fn poll_byte(&self) -> Option<u8> {
        sbi::legacy::console_getchar()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex as StdMutex;
    use std::sync::MutexGuard;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Console, install};

    /// Scripted console: canned input, captured output.
    pub(crate) struct ScriptConsole {
        input: StdMutex<Vec<u8>>,
        cursor: AtomicUsize,
        output: StdMutex<Vec<u8>>,
    }

    impl ScriptConsole {
        const fn new() -> Self {
            Self {
                input: StdMutex::new(Vec::new()),
                cursor: AtomicUsize::new(0),
                output: StdMutex::new(Vec::new()),
            }
        }

        pub(crate) fn feed(&self, bytes: &[u8]) {
            self.input.lock().unwrap().extend_from_slice(bytes);
        }

        pub(crate) fn output(&self) -> String {
            String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
        }

        fn reset(&self) {
            self.input.lock().unwrap().clear();
            self.cursor.store(0, Ordering::SeqCst);
            self.output.lock().unwrap().clear();
        }
    }

    impl Console for ScriptConsole {
        fn put_byte(&self, byte: u8) {
            self.output.lock().unwrap().push(byte);
        }

        fn poll_byte(&self) -> Option<u8> {
            let input = self.input.lock().unwrap();
            let at = self.cursor.load(Ordering::SeqCst);
            if at < input.len() {
                self.cursor.store(at + 1, Ordering::SeqCst);
                Some(input[at])
            } else {
                None
            }
        }
    }

    static SHARED: ScriptConsole = ScriptConsole::new();
    static SESSION: StdMutex<()> = StdMutex::new(());

    /// Serializes tests that touch the global console and hands out the
    /// shared device with cleared buffers.
    pub(crate) fn session() -> (MutexGuard<'static, ()>, &'static ScriptConsole) {
        let guard = SESSION.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        install(&SHARED);
        SHARED.reset();
        (guard, &SHARED)
    }
}
