use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// One shell command belonging to a build.
///
/// `name` classifies the command: the default bucket is a user step; names
/// matching `^(pre|post)?teardown-.+` are user teardowns, and names matching
/// `^sd-teardown-.+` are system teardowns (see `Supervisor::partition`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDef {
    pub name: String,
    pub cmd: String,
}

/// An ordered list of commands belonging to one build.
pub type Build = Vec<CommandDef>;

/// Exit code conventions shared by steps and teardowns.
pub const EXIT_OK: i32 = 0;
pub const EXIT_UNKNOWN: i32 = 254;
pub const EXIT_LAUNCH: i32 = 255;
pub const EXIT_ABORTED: i32 = 1;
pub const EXIT_TIMEOUT: i32 = 3;

/// The result of running one step or teardown.
#[derive(Debug)]
pub struct StepOutcome {
    pub exit_code: i32,
    pub error: Option<ExecutorError>,
}

impl StepOutcome {
    pub const fn ok() -> Self {
        Self {
            exit_code: EXIT_OK,
            error: None,
        }
    }

    pub const fn new(exit_code: i32, error: Option<ExecutorError>) -> Self {
        Self { exit_code, error }
    }
}

/// Write-once, read-many slot for the first abnormal outcome of a build.
///
/// Once set, later calls to `set` are no-ops: the supervisor must report the
/// *first* failure, not the last.
#[derive(Default)]
pub struct FirstError {
    inner: Option<ExecutorError>,
}

impl FirstError {
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Records `err` if nothing has been recorded yet. Returns `true` if this
    /// call was the one that set it.
    pub fn set(&mut self, err: ExecutorError) -> bool {
        if self.inner.is_some() {
            return false;
        }
        self.inner = Some(err);
        true
    }

    pub const fn is_set(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self) -> Option<&ExecutorError> {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Option<ExecutorError> {
        self.inner
    }
}
