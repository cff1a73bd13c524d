use std::io;

use thiserror::Error;

use crate::model::{EXIT_ABORTED, EXIT_LAUNCH, EXIT_TIMEOUT, EXIT_UNKNOWN};

/// Typed failure modes of the executor. Each variant knows its own
/// exit-code convention so the supervisor never has to duplicate that
/// mapping.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Could not start the shell or a teardown subprocess.
    #[error("failed to launch process: {0}")]
    Launch(#[source] io::Error),

    /// Step status reporting to the remote API failed.
    #[error("API call failed: {0}")]
    Api(String),

    /// A user step ended with a non-zero exit code.
    #[error("command exited with non-zero code")]
    Step,

    /// The build-wide timeout elapsed before the current step finished.
    #[error("build timed out")]
    Timeout,

    /// The process received SIGINT or SIGTERM.
    #[error("aborted by signal")]
    Aborted,

    /// A filesystem or reader I/O failure outside of script materialization.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The exit sentinel's digits could not be parsed.
    #[error("could not parse sentinel exit code: {0}")]
    Parse(String),

    /// The line reader failed before the sentinel was observed.
    #[error("reader error: {0}")]
    Reader(#[source] io::Error),
}

impl ExecutorError {
    /// The numeric exit code this error maps to.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Launch(_) => EXIT_LAUNCH,
            Self::Api(_) => EXIT_UNKNOWN,
            Self::Step => EXIT_UNKNOWN, // overridden by the sentinel's own code at the call site
            Self::Timeout => EXIT_TIMEOUT,
            Self::Aborted => EXIT_ABORTED,
            Self::Io(_) => EXIT_UNKNOWN,
            Self::Parse(_) => EXIT_UNKNOWN,
            Self::Reader(_) => EXIT_UNKNOWN,
        }
    }
}

impl From<io::Error> for ExecutorError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
