//! Interactive command shell. Runs as the idle process (slot 0), so it never
//! exits and re-arms to `Ready` whenever it yields.

use crate::console;
use crate::proc;
use crate::scheduler;
use crate::{print, println};

const PROMPT: &str = "krill> ";
const MAX_LINE: usize = 128;

const BACKSPACE: u8 = 0x7f;
const CTRL_H: u8 = 0x08;

/// Shell process body.
pub extern "C" fn main() {
    println!();
    println!("krill cooperative kernel");
    println!("type 'help' for commands");
    loop {
        print!("{PROMPT}");
        let mut buffer = [0u8; MAX_LINE];
        let len = read_line(&mut buffer);
        let line = core::str::from_utf8(&buffer[..len]).unwrap_or("");
        run_command(line);
    }
}

/// Reads one line with echo. Enter finishes the line, backspace erases.
fn read_line(buffer: &mut [u8]) -> usize {
    let mut len = 0;
    loop {
        let byte = console::read_byte_blocking();
        match byte {
            b'\r' | b'\n' => {
                console::write_str("\n");
                return len;
            }
            BACKSPACE | CTRL_H => {
                if len > 0 {
                    len -= 1;
                    // step left, blank the cell, step left again
                    console::write_str("\x08 \x08");
                }
            }
            byte if (b' '..=b'~').contains(&byte) && len < buffer.len() => {
                buffer[len] = byte;
                len += 1;
                console::write_byte(byte);
            }
            _ => {}
        }
    }
}

fn run_command(line: &str) {
    match line.trim() {
        "" => {}
        "help" | "?" => print_help(),
        "ps" | "psa" => print_processes(),
        "new" => create_task(),
        other => println!("unknown command: {other}"),
    }
}

fn print_help() {
    println!("available commands:");
    println!("  help  print this help message  (alias: ?)");
    println!("  ps    list processes           (alias: psa)");
    println!("  new   create a demo process");
}

fn print_processes() {
    let processes = proc::list();
    println!("{:<5} {:<11} ENTRY", "PID", "STATE");
    for entry in processes.iter() {
        println!("{:<5} {:<11} {:#x}", entry.pid, entry.state, entry.entry);
    }
}

fn create_task() {
    match proc::spawn(demo_task) {
        Ok(pid) => {
            println!("created process {pid}");
            // Hand the new process its first slice right away.
            scheduler::yield_now();
        }
        Err(err) => println!("cannot create process: {err}"),
    }
}

/// Demo payload for the `new` command: announce, yield once, exit.
extern "C" fn demo_task() {
    let pid = proc::current().unwrap_or(usize::MAX);
    println!("[task {pid}] running");
    scheduler::yield_now();
    println!("[task {pid}] finished");
    scheduler::exit();
}
