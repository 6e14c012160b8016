//! External process execution.
//!
//! Everything kiln asks the outside world to do (cmake, patch, the system
//! package manager) goes through [`CommandRunner`]. [`SystemRunner`] spawns
//! real processes; [`RecordingRunner`] only records what would have run.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Required tool '{0}' was not found on PATH")]
    ToolNotFound(String),

    #[error("'{program}' failed ({status}). Last lines of the log:\n{tail}\nFull log: {}", .log.display())]
    CommandFailed {
        program: String,
        status: String,
        log: PathBuf,
        tail: String,
    },

    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A process invocation, described as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether any argument equals `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Executes [`CommandSpec`]s.
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion. A non-zero exit is an error.
    fn run(&self, cmd: &CommandSpec) -> Result<(), BuildError>;
}

/// Spawns real processes, sending their output to a build log.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    log_path: PathBuf,
    verbose: bool,
}

impl SystemRunner {
    /// Output of every command is appended to `log_path`.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            verbose: false,
        }
    }

    /// Stream output to the terminal instead of the log.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn open_log(&self) -> io::Result<File> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<(), BuildError> {
        let program = which::which(&spec.program)
            .map_err(|_| BuildError::ToolNotFound(spec.program.clone()))?;

        tracing::debug!(command = %spec, "Running");

        let mut cmd = Command::new(program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let status = if self.verbose {
            cmd.status()?
        } else {
            let mut log_file = self.open_log()?;
            writeln!(log_file, "$ {spec}")?;
            cmd.stdin(Stdio::null())
                .stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .status()?
        };

        if !status.success() {
            let tail = if self.verbose {
                String::new()
            } else {
                read_last_lines(&self.log_path, 20).unwrap_or_default()
            };
            return Err(BuildError::CommandFailed {
                program: spec.program.clone(),
                status: status
                    .code()
                    .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}")),
                log: self.log_path.clone(),
                tail,
            });
        }

        Ok(())
    }
}

/// Records commands instead of running them. Every command succeeds.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands seen so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Recorded commands for which `pred` holds.
    pub fn count(&self, pred: impl Fn(&CommandSpec) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<(), BuildError> {
        tracing::debug!(command = %cmd, "Recorded");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(cmd.clone());
        }
        Ok(())
    }
}

/// Read the last N lines from a file efficiently.
///
/// Instead of loading the entire file, we seek to near the end and read a fixed-size
/// tail buffer. Build logs of large C++ projects get big.
pub fn read_last_lines(path: &Path, n: usize) -> io::Result<String> {
    use std::io::{Read, Seek, SeekFrom};

    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&buffer[..], |idx| &buffer[idx + 1..])
    } else {
        &buffer[..]
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
