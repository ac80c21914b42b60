//! Error types for wormvol-core

use std::fmt::Write;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wormvol-core
#[derive(Error, Debug)]
pub enum Error {
    /// Console gateway and catalog protocol errors
    #[error("Console error: {0}")]
    Console(#[from] ConsoleError),

    /// Console output could not be turned into records
    #[error("Parse error in response to <{command}>: {source}")]
    Parse {
        command: String,
        #[source]
        source: ParseError,
    },

    /// Volume file operations
    #[error("Volume store error: {0}")]
    Store(#[from] StoreError),

    /// Record contents that make an action impossible
    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Console(err) => Some(err.remediation()),
            Self::Parse { command, .. } => Some(
                Remediation::new("The catalog rejected the listing or returned unexpected text.")
                    .command("Reproduce", format!("echo '{command}' | bconsole -n"))
                    .alternative("Check the director log for the reported ERR= line."),
            ),
            Self::Store(_) => Some(
                Remediation::new("Check the device root mount and its permissions, then retry.")
                    .alternative("The volume is retried on the next run."),
            ),
            Self::Volume(_) => Some(
                Remediation::new("Inspect the volume in the catalog and fix its record by hand.")
                    .command("Show volume", "echo 'llist volume=<name>' | bconsole -n"),
            ),
            Self::Config(err) => Some(err.remediation()),
        }
    }

    /// Command text and raw console output carried by this error, if any.
    ///
    /// Used for the diagnostic dump written when a run aborts.
    #[must_use]
    pub fn console_transcript(&self) -> Option<(&str, &str)> {
        match self {
            Self::Console(err) => err.transcript(),
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "on a signal".to_string(), |code| code.to_string())
}

/// Console gateway errors: the process failed or answered unexpectedly.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The console binary could not be started
    #[error("<{command}> failed to start console: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Talking to the running console failed
    #[error("<{command}> console I/O failed: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Nonzero exit status
    #[error("<{command}> console exited {}", describe_exit(.code))]
    Exited {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The console did not exit in time and was killed
    #[error("<{command}> console timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    /// Output did not carry the expected confirmation
    #[error("<{command}> console command error")]
    Unexpected { command: String, output: String },
}

impl ConsoleError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Spawn { .. } => Remediation::new(
                "Make sure the console binary exists and is executable by this account.",
            )
            .command("Check binary", "ls -l /usr/sbin/bconsole")
            .alternative("Set [console].command in the config file."),
            Self::Io { .. } | Self::Exited { .. } => {
                Remediation::new("The console failed. Check director connectivity and retry.")
                    .command("Check director", "echo 'status dir' | bconsole -n")
            }
            Self::Timeout { timeout_secs, .. } => Remediation::new(format!(
                "The console did not answer within {timeout_secs} seconds."
            ))
            .alternative("Raise [console].timeout_seconds or check the director load."),
            Self::Unexpected { .. } => Remediation::new(
                "The catalog answered without the expected confirmation; the volume was left alone.",
            )
            .alternative("Run the command by hand to see the full reply."),
        }
    }

    /// Command text and raw output, when the console produced any.
    #[must_use]
    pub fn transcript(&self) -> Option<(&str, &str)> {
        match self {
            Self::Exited {
                command, output, ..
            }
            | Self::Unexpected { command, output } => Some((command, output)),
            _ => None,
        }
    }
}

/// Errors raised while splitting a console listing into records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The console embedded an `ERR=` marker in its output
    #[error("console reported an error: {line}")]
    CommandError { line: String },

    /// A line inside a record has no `": "` separator
    #[error("malformed line (no \": \" separator): {line}")]
    MalformedLine { line: String },

    /// A lifecycle attribute holds a value of the wrong type
    #[error("media record {media_id} has unusable {key}: {value}")]
    InvalidValue {
        media_id: String,
        key: &'static str,
        value: String,
    },

    /// A record lacks a key every media entry must carry
    #[error("media record {media_id} has no {key}")]
    MissingKey { media_id: String, key: &'static str },
}

/// Volume file errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The volume name cannot be used as a file name under the device root
    #[error("volume name {name:?} is not a plain file name")]
    InvalidName { name: String },

    /// Probe succeeded but something the action needs is absent
    #[error("volume {volume}: {what} unavailable")]
    Unavailable { volume: String, what: &'static str },

    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Record contents that make a lifecycle action impossible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// No last-written time, so no protection deadline exists
    #[error("volume {volume} was never written; no protection deadline can be computed")]
    NeverWritten { volume: String },

    /// The record carries no usable retention
    #[error("volume {volume} has no usable volretention")]
    MissingRetention { volume: String },

    /// The last-written wall-clock time does not exist in the catalog time zone
    #[error("volume {volume}: {timestamp} does not exist in the catalog time zone")]
    NonexistentLocalTime {
        volume: String,
        timestamp: NaiveDateTime,
    },

    /// lastwritten + volretention is out of range
    #[error("volume {volume}: protection deadline is out of range")]
    DeadlineOverflow { volume: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(String),

    #[error("unknown numeric locale: {0}")]
    UnknownLocale(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ReadFailed { path, .. } => {
                Remediation::new(format!("Check that {} exists and is readable.", path.display()))
                    .command("Show effective config", "wormvol config")
            }
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in the config file.")
                .alternative("Remove unknown keys; every setting has a default."),
            Self::UnknownLocale(_) => {
                Remediation::new("Use one of: en_US, de_DE, fr_FR, C, POSIX.")
            }
            Self::Invalid(_) => Remediation::new("Correct the reported setting and retry.")
                .command("Show effective config", "wormvol config"),
        }
    }
}
