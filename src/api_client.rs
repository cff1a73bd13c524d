use std::sync::Mutex;

use crate::error::ExecutorError;

/// Remote status reporting for step start/stop. Failures here are fatal to
/// the executor: both methods return `Result` so the supervisor can
/// propagate them immediately.
pub trait StatusApi: Send + Sync {
    fn update_step_start(&self, build_id: &str, name: &str) -> Result<(), ExecutorError>;
    fn update_step_stop(&self, build_id: &str, name: &str, exit_code: i32) -> Result<(), ExecutorError>;
}

/// Production stand-in: logs each call the way this codebase's `println!`
/// diagnostics do elsewhere (`src/api_server.rs`), for the demonstration
/// binary in `src/bin/sdrun.rs`. A real launcher substitutes its own
/// `StatusApi` that actually talks to the remote API.
pub struct LoggingApi;

impl StatusApi for LoggingApi {
    fn update_step_start(&self, build_id: &str, name: &str) -> Result<(), ExecutorError> {
        println!("[{build_id}] step start: {name}");
        Ok(())
    }

    fn update_step_stop(&self, build_id: &str, name: &str, exit_code: i32) -> Result<(), ExecutorError> {
        println!("[{build_id}] step stop: {name} ({exit_code})");
        Ok(())
    }
}

/// Call record kept by `RecordingApi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Start(String),
    Stop(String, i32),
}

/// In-memory recorder for tests, asserting call order and pairing.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    fail_start_for: Mutex<Vec<String>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Makes `update_step_start` fail for the named step, to exercise the
    /// "APIError is fatal" path in tests.
    pub fn fail_start_for(&self, name: impl Into<String>) {
        self.fail_start_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.into());
    }
}

impl StatusApi for RecordingApi {
    fn update_step_start(&self, _build_id: &str, name: &str) -> Result<(), ExecutorError> {
        if self
            .fail_start_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|n| n == name)
        {
            return Err(ExecutorError::Api(format!("stepStart failed for {name}")));
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ApiCall::Start(name.to_string()));
        Ok(())
    }

    fn update_step_stop(&self, _build_id: &str, name: &str, exit_code: i32) -> Result<(), ExecutorError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ApiCall::Stop(name.to_string(), exit_code));
        Ok(())
    }
}
