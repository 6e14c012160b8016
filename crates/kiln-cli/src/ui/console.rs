//! Line-oriented progress output on stderr.

use crossterm::style::Stylize;
use crossterm::{cursor, execute, terminal};
use kiln_core::Reporter;
use kiln_schema::{PackageName, Version};
use std::io::{IsTerminal, Write};
use std::sync::Mutex;

/// Prints lifecycle phases and download progress for one recipe run.
///
/// On a terminal the download line is redrawn in place; otherwise only the
/// final size is printed.
#[derive(Debug)]
pub struct ConsoleReporter {
    interactive: bool,
    progress_open: Mutex<bool>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            interactive: std::io::stderr().is_terminal(),
            progress_open: Mutex::new(false),
        }
    }

    /// End an in-place progress line before printing anything else.
    fn close_progress(&self) {
        let Ok(mut open) = self.progress_open.lock() else {
            return;
        };
        if *open {
            eprintln!();
            *open = false;
        }
    }
}

impl Reporter for ConsoleReporter {
    fn phase(&self, name: &PackageName, version: &Version, phase: &str) {
        self.close_progress();
        eprintln!(
            "  {} {} {} {}",
            "→".cyan(),
            name.as_str().bold(),
            version.as_str().dark_grey(),
            phase
        );
    }

    fn downloading(&self, _name: &PackageName, _version: &Version, current: u64, total: Option<u64>) {
        let finished = total.is_some_and(|t| current >= t);
        if !self.interactive {
            if finished {
                eprintln!("    downloaded {}", format_size(current));
            }
            return;
        }

        let line = match total {
            Some(t) => format!("    {} / {}", format_size(current), format_size(t)),
            None => format!("    {}", format_size(current)),
        };
        let mut stderr = std::io::stderr();
        let _ = execute!(
            stderr,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine)
        );
        let _ = write!(stderr, "{}", line.dark_grey());
        let _ = stderr.flush();

        if let Ok(mut open) = self.progress_open.lock() {
            *open = true;
        }
        if finished {
            self.close_progress();
        }
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        self.close_progress();
        eprintln!(
            "  {} {} {} {}",
            "✓".green(),
            name.as_str().bold(),
            version.as_str().dark_grey(),
            detail.dark_grey()
        );
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        self.close_progress();
        eprintln!(
            "  {} {} {} {}",
            "✗".red(),
            name.as_str().bold(),
            version.as_str().dark_grey(),
            reason.red()
        );
    }

    fn info(&self, msg: &str) {
        self.close_progress();
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        self.close_progress();
        eprintln!("  {} {msg}", "!".yellow());
    }
}

/// Human-readable byte count.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
