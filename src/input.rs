//! Runtime control flags and the stdin command listener.
//!
//! The sampling loop and the listener communicate exclusively through three
//! independent boolean flags. Each flag has exactly one writer and one
//! reader; a flag changing between two reads is tolerated with at most one
//! tick of staleness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

/// Process-wide control flags, shared by handle.
pub struct ControlFlags {
    exit: AtomicBool,
    manual_charging: AtomicBool,
    save_log: AtomicBool,
}

impl ControlFlags {
    pub fn new(save_log: bool) -> Self {
        Self {
            exit: AtomicBool::new(false),
            manual_charging: AtomicBool::new(false),
            save_log: AtomicBool::new(save_log),
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    pub fn manual_charging(&self) -> bool {
        self.manual_charging.load(Ordering::SeqCst)
    }

    pub fn set_manual_charging(&self, charging: bool) {
        self.manual_charging.store(charging, Ordering::SeqCst);
    }

    pub fn save_log(&self) -> bool {
        self.save_log.load(Ordering::SeqCst)
    }

    pub fn toggle_save_log(&self) -> bool {
        // Single writer per flag: a plain read-modify-write is race-free here
        let new = !self.save_log.load(Ordering::SeqCst);
        self.save_log.store(new, Ordering::SeqCst);
        new
    }
}

/// Print the runtime command help once at startup.
pub fn print_usage(manual_switch: bool) {
    print!(
        "press Ctrl+D or input 'e' to end the program, \
         input 'l' to enable/disable log saving"
    );
    if manual_switch {
        println!(
            ", input 'c'(charging) or 'd'(discharging) to switch the charging status (necessary)."
        );
        println!(
            "Notice: in manual mode the alarm decision follows your manual status setting.\n"
        );
    } else {
        println!(".\n");
    }
}

/// Background task consuming line-oriented commands, normally from stdin.
///
/// Mutates the control flags only; never joined by the sampling loop. The
/// task terminates when the reader ends: end of input is equivalent to an
/// exit request, so the sampler still performs its final flush when the
/// terminal closes.
pub async fn run_listener<R>(reader: R, flags: Arc<ControlFlags>, manual_switch: bool)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
                    Some('e') => {
                        flags.request_exit();
                        break;
                    }
                    Some('c') if manual_switch => flags.set_manual_charging(true),
                    Some('d') if manual_switch => flags.set_manual_charging(false),
                    Some('l') => {
                        let enabled = flags.toggle_save_log();
                        println!(
                            "Log saving {}.",
                            if enabled { "enabled" } else { "disabled" }
                        );
                    }
                    _ => {}
                }
            }
            Ok(None) => {
                info!("Input stream closed, requesting exit");
                flags.request_exit();
                break;
            }
            Err(e) => {
                info!("Input read error ({}), requesting exit", e);
                flags.request_exit();
                break;
            }
        }
    }
}
