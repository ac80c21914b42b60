//! Console gateway: sends one command to `bconsole` and collects its output.
//!
//! The core never spawns processes directly; it talks to a [`ConsoleGateway`].
//! [`ProcessConsole`] is the production implementation: it starts the console
//! binary, writes the command to stdin, drains stdout and stderr on helper
//! threads and kills the child if it does not exit within the timeout.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;

/// Captured result of one console command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
}

impl ConsoleOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Something that can run a console command.
///
/// Implementations report process-level failures (cannot spawn, timeout)
/// as errors; a nonzero exit is returned as output and judged by the caller.
pub trait ConsoleGateway {
    fn execute(&self, command: &str) -> Result<ConsoleOutput, ConsoleError>;
}

impl<G: ConsoleGateway + ?Sized> ConsoleGateway for &G {
    fn execute(&self, command: &str) -> Result<ConsoleOutput, ConsoleError> {
        (**self).execute(command)
    }
}

/// Runs commands through a console subprocess, one process per command.
#[derive(Debug, Clone)]
pub struct ProcessConsole {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessConsole {
    #[must_use]
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn spawn(&self, command: &str) -> Result<Child, ConsoleError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConsoleError::Spawn {
                command: command.to_string(),
                source,
            })
    }
}

impl ConsoleGateway for ProcessConsole {
    fn execute(&self, command: &str) -> Result<ConsoleOutput, ConsoleError> {
        let io_error = |source| ConsoleError::Io {
            command: command.to_string(),
            source,
        };

        debug!(program = %self.program, command, "Running console command");
        let mut child = self.spawn(command)?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        if let Some(mut stdin) = child.stdin.take() {
            // The console reads commands until EOF; dropping stdin sends it.
            let written = stdin
                .write_all(command.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"));
            if let Err(e) = written {
                // A console that exits early closes its end of the pipe; its
                // exit status tells the real story.
                warn!(error = %e, command, "Failed to write command to console");
            }
        }

        let status = match child.wait_timeout(self.timeout).map_err(io_error)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConsoleError::Timeout {
                    command: command.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        Ok(ConsoleOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            exit_code: status.code(),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
