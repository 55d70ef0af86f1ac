//! Shared helpers for the kernel integration tests.
//!
//! Each test file boots the real kernel on a dedicated thread and lets it
//! context-switch between genuine stacks; the main thread only observes
//! through the diagnostic accessors. The kernel thread never finishes (the
//! dispatcher has no way back), so it is left detached and dies with the
//! test process.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use krill::console::Console;

/// Polls `condition` until it holds or a generous deadline passes.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Scripted console: canned input, captured output.
pub struct ScriptConsole {
    input: Mutex<Vec<u8>>,
    cursor: AtomicUsize,
    output: Mutex<Vec<u8>>,
}

impl ScriptConsole {
    pub const fn new() -> Self {
        Self {
            input: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            output: Mutex::new(Vec::new()),
        }
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend_from_slice(bytes);
        // Keep later pushes from reallocating on a process stack.
        self.output.lock().unwrap().reserve(16 * 1024);
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
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
