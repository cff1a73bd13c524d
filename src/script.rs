use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::ExecutorError;

/// Writes a step's shell text to `path` as an executable script with a
/// shebang pointing at `shell_bin`. Overwrites whatever was there before —
/// the same fixed path is reused across steps (see `ExecutorConfig::step_script_path`).
pub fn write(path: &Path, shell_bin: &Path, cmd_text: &str) -> Result<(), ExecutorError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(path)
        .map_err(ExecutorError::Io)?;

    write!(file, "#!{} -e\n{cmd_text}", shell_bin.display()).map_err(ExecutorError::Io)?;
    file.flush().map_err(ExecutorError::Io)?;

    // OpenOptions::mode only applies at creation time; an existing file
    // keeps its old permissions, so enforce 0755 explicitly.
    let mut perms = file.metadata().map_err(ExecutorError::Io)?.permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(path, perms).map_err(ExecutorError::Io)?;

    Ok(())
}
