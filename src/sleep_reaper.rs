use std::process::Command;

use crate::config::ExecutorConfig;

/// Kills lingering `sleep` processes used as wait primitives elsewhere in
/// the launcher. `kill_all = false` preserves the last matched pid, assumed
/// to be the grace-period sleep that bounds teardown duration;
/// `kill_all = true` kills every match, used after a build timeout where no
/// grace period needs protecting.
///
/// A known-brittle heuristic (matches on command line containing `sleep`,
/// not on process group). Failures here are logged, never fatal.
pub fn reap(shell_bin: &std::path::Path, kill_all: bool) {
    let snippet = if kill_all {
        r#"ps -ef | awk '/[s]leep/ {print $2}' | xargs -r kill"#.to_string()
    } else {
        // Collect all matched pids onto one space-separated line, then drop
        // the last field (the grace-period sleep) before killing the rest.
        r#"ps -ef | awk '/[s]leep/ {print $2}' | tr '\n' ' ' | awk '{$NF=""}1' | xargs -r kill"#
            .to_string()
    };

    match Command::new(shell_bin).arg("-c").arg(&snippet).output() {
        Ok(output) if !output.status.success() => {
            eprintln!(
                "sleep reaper exited non-zero: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(_) => {}
        Err(err) => eprintln!("sleep reaper failed to launch: {err}"),
    }
}

pub fn reap_from_config(config: &ExecutorConfig, kill_all: bool) {
    reap(&config.shell_bin, kill_all);
}
