//! Error types for the pdfgate library.
//!
//! One enum, [`ConvertError`], covers every failure. Three variants carry the
//! classification callers branch on most often:
//!
//! * [`ConvertError::ImpossibleConversion`]: the source type is unsupported,
//!   or already a PDF. Permanent; no process was started.
//! * [`ConvertError::CommandTimeout`]: the external tool did not finish in
//!   time. The process group has been killed before this is returned.
//! * [`ConvertError::CommandExecution`]: the tool could not be started, or it
//!   ran to completion with a non-zero status.
//!
//! Orchestrators return runner errors unchanged, so these three stay
//! distinguishable all the way up to the caller. Nothing is retried.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfgate library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Classification ────────────────────────────────────────────────────
    /// The file type has no configured command, or is already a PDF.
    #[error("impossible conversion")]
    ImpossibleConversion,

    /// The external process outlived its configured timeout and was killed.
    #[error("command '{command}' reached the {timeout_secs} second(s) timeout")]
    CommandTimeout { command: String, timeout_secs: u64 },

    /// The external process failed to start or exited unsuccessfully.
    ///
    /// `status` is `None` when the process never started (e.g. the executable
    /// does not exist) or was terminated by a signal.
    #[error("command '{command}' failed ({}): {output}", describe_status(.status))]
    CommandExecution {
        command: String,
        status: Option<i32>,
        output: String,
    },

    /// The tool exited successfully but the expected file is not there.
    #[error("command '{command}' succeeded but produced no file at '{path}'")]
    MissingOutput { command: String, path: PathBuf },

    // ── Caller errors ─────────────────────────────────────────────────────
    /// The destination PDF is already present in the working directory.
    #[error("output '{path}' already exists")]
    OutputExists { path: PathBuf },

    /// `merge` was called with an empty list of inputs.
    #[error("merge requires at least one input file")]
    NoInputs,

    /// A staging directory inside the working directory could not be created.
    #[error("Failed to prepare working directory '{path}': {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A command template could not be parsed or uses placeholders wrongly.
    #[error("invalid command template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The configuration is structurally valid but semantically wrong.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be deserialised.
    #[error("Failed to parse configuration '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// True for [`ConvertError::CommandTimeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvertError::CommandTimeout { .. })
    }

    /// True for [`ConvertError::CommandExecution`].
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, ConvertError::CommandExecution { .. })
    }

    /// True for [`ConvertError::ImpossibleConversion`].
    pub fn is_impossible(&self) -> bool {
        matches!(self, ConvertError::ImpossibleConversion)
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impossible_conversion_display() {
        assert_eq!(
            ConvertError::ImpossibleConversion.to_string(),
            "impossible conversion"
        );
    }

    #[test]
    fn command_timeout_display() {
        let e = ConvertError::CommandTimeout {
            command: "echo hello".into(),
            timeout_secs: 30,
        };
        assert_eq!(
            e.to_string(),
            "command 'echo hello' reached the 30 second(s) timeout"
        );
        assert!(e.is_timeout());
        assert!(!e.is_execution_failure());
    }

    #[test]
    fn command_execution_display_with_status() {
        let e = ConvertError::CommandExecution {
            command: "false".into(),
            status: Some(1),
            output: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit status 1"), "got: {msg}");
        assert!(msg.contains("boom"), "got: {msg}");
        assert!(e.is_execution_failure());
    }

    #[test]
    fn command_execution_display_without_status() {
        let e = ConvertError::CommandExecution {
            command: "helloworld".into(),
            status: None,
            output: "No such file or directory".into(),
        };
        assert!(e.to_string().contains("no exit status"));
    }

    #[test]
    fn output_exists_display() {
        let e = ConvertError::OutputExists {
            path: PathBuf::from("/work/report.pdf"),
        };
        assert_eq!(e.to_string(), "output '/work/report.pdf' already exists");
        assert!(!e.is_impossible());
    }

    #[test]
    fn classification_helpers_are_exclusive() {
        let e = ConvertError::ImpossibleConversion;
        assert!(e.is_impossible());
        assert!(!e.is_timeout());
        assert!(!e.is_execution_failure());
    }
}
