use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the Supervisor's entry point needs, bundled the way
/// `src/tty_spawn.rs`'s `SpawnOptions` bundles a PTY spawn's inputs —
/// reduced here to the fields this subsystem actually consumes (no
/// terminal-size/detach knobs; those belong to the PTY-forwarding CLI this
/// crate was built from, not to the build step executor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Working directory the persistent shell is launched in.
    pub work_dir: PathBuf,
    /// Base environment handed to the shell, as `KEY=VALUE` pairs.
    pub env: Vec<(String, String)>,
    /// Identifier reported to the status API alongside each step.
    pub build_id: String,
    /// Path to the shell binary (e.g. `/bin/sh`).
    pub shell_bin: PathBuf,
    /// Build-wide wall-clock budget.
    pub timeout: Duration,
    /// Prefix from which `ExportFile`/`TmpFile` are derived by appending
    /// `_export`/`_tmp`.
    pub env_file_prefix: PathBuf,
    /// Working directory teardown subprocesses are launched in.
    pub source_dir: PathBuf,
    /// Path the script materializer writes each step's shell text to.
    /// Defaults to `/tmp/step.sh`;
    /// overridable so concurrent test runs (or, eventually, concurrent
    /// builds) don't collide on one host.
    pub step_script_path: PathBuf,
}

/// Fixed bound on how long a teardown subprocess waits for `ExportFile` to
/// appear before giving up and running without a sourced environment.
pub const TEARDOWN_EXPORT_WAIT: Duration = Duration::from_secs(5);

impl ExecutorConfig {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        env: Vec<(String, String)>,
        build_id: impl Into<String>,
        shell_bin: impl Into<PathBuf>,
        timeout: Duration,
        env_file_prefix: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            env,
            build_id: build_id.into(),
            shell_bin: shell_bin.into(),
            timeout,
            env_file_prefix: env_file_prefix.into(),
            source_dir: source_dir.into(),
            step_script_path: PathBuf::from("/tmp/step.sh"),
        }
    }

    pub fn export_file(&self) -> PathBuf {
        append_suffix(&self.env_file_prefix, "_export")
    }

    pub fn tmp_file(&self) -> PathBuf {
        append_suffix(&self.env_file_prefix, "_tmp")
    }
}

fn append_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
