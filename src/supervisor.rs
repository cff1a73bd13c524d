use std::io::Write as _;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::api_client::StatusApi;
use crate::config::ExecutorConfig;
use crate::emitter::Emitter;
use crate::error::ExecutorError;
use crate::model::{Build, CommandDef, FirstError, StepOutcome};
use crate::script;
use crate::shell_session::{self, ShellSession};
use crate::sleep_reaper;
use crate::step_runner;
use crate::teardown;

fn user_teardown_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(pre|post)?teardown-.+").expect("static regex"))
}

fn sd_teardown_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sd-teardown-.+").expect("static regex"))
}

const TIMEOUT_BANNER: &str = "\
\r\n\
**********************************************\r\n\
*                                            *\r\n\
*              BUILD TIMED OUT               *\r\n\
*                                            *\r\n\
**********************************************\r\n";

/// Splits a build's commands into `(user, user_teardowns, sd_teardowns)`,
/// preserving each partition's original relative order.
fn partition(build: &Build) -> (Vec<&CommandDef>, Vec<&CommandDef>, Vec<&CommandDef>) {
    let mut user = Vec::new();
    let mut user_teardowns = Vec::new();
    let mut sd_teardowns = Vec::new();

    for cmd in build {
        if sd_teardown_pattern().is_match(&cmd.name) {
            sd_teardowns.push(cmd);
        } else if user_teardown_pattern().is_match(&cmd.name) {
            user_teardowns.push(cmd);
        } else {
            user.push(cmd);
        }
    }

    (user, user_teardowns, sd_teardowns)
}

/// What preempted a racing step, if anything.
enum RaceResult {
    Completed(StepOutcome),
    TimedOut,
    Signaled,
}

/// Top-level orchestrator. Owns the shell session for the duration
/// of one build and sequences user steps, then teardowns, against the
/// timeout and signal observers.
pub struct Supervisor<'a> {
    config: ExecutorConfig,
    emitter: &'a dyn Emitter,
    api: &'a dyn StatusApi,
}

impl<'a> Supervisor<'a> {
    pub const fn new(config: ExecutorConfig, emitter: &'a dyn Emitter, api: &'a dyn StatusApi) -> Self {
        Self { config, emitter, api }
    }

    /// Runs `build` to completion. Returns `Ok(())` if no step, teardown, or
    /// infrastructure failure occurred; otherwise the first recorded error.
    pub fn run(&self, build: &Build) -> Result<(), ExecutorError> {
        let (user, user_teardowns, sd_teardowns) = partition(build);

        let mut session = ShellSession::open(&self.config)?;
        session.setup(self.emitter, &self.config)?;

        let timeout_rx = Self::spawn_timeout_task(self.config.timeout);
        let signal_rx = Self::spawn_signal_task()?;

        let mut first_error = FirstError::new();
        let mut last_exit_code = 0;

        for cmd in &user {
            if first_error.is_set() {
                continue;
            }

            self.api.update_step_start(&self.config.build_id, &cmd.name)?;

            script::write(&self.config.step_script_path, &self.config.shell_bin, &cmd.cmd)?;
            let guid = step_runner::new_guid();
            self.emitter.start_cmd(&cmd.cmd).map_err(ExecutorError::Io)?;

            let invocation = step_runner::invocation_line(&guid, &self.config.step_script_path);
            {
                let handles = session.split_mut();
                handles.writer.write_all(invocation.as_bytes()).map_err(ExecutorError::Io)?;
                handles.writer.flush().map_err(ExecutorError::Io)?;
            }

            let outcome = self.race_step(&mut session, &guid, &timeout_rx, &signal_rx);
            last_exit_code = outcome.exit_code;
            if let Some(err) = outcome.error {
                first_error.set(err);
            }

            self.api.update_step_stop(&self.config.build_id, &cmd.name, last_exit_code)?;
        }

        let teardowns: Vec<&CommandDef> = user_teardowns.into_iter().chain(sd_teardowns).collect();
        for (idx, cmd) in teardowns.iter().enumerate() {
            if idx == 0 && !first_error.is_set() {
                session.close_shell()?;
            }

            self.api.update_step_start(&self.config.build_id, &cmd.name)?;
            let outcome = teardown::run_teardown(cmd, last_exit_code, &self.config, self.emitter);
            if outcome.exit_code != 0 {
                last_exit_code = outcome.exit_code;
                if let Some(err) = outcome.error {
                    first_error.set(err);
                }
            }
            self.api.update_step_stop(&self.config.build_id, &cmd.name, outcome.exit_code)?;
        }

        sleep_reaper::reap_from_config(&self.config, true);

        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Races one step's completion against the build-wide timeout and
    /// signal observers in a three-way select.
    fn race_step(
        &self,
        session: &mut ShellSession,
        guid: &str,
        timeout_rx: &crossbeam_channel::Receiver<()>,
        signal_rx: &crossbeam_channel::Receiver<()>,
    ) -> StepOutcome {
        let (result_tx, result_rx) = crossbeam_channel::bounded::<StepOutcome>(1);
        let emitter = self.emitter;

        let race = thread::scope(|scope| {
            let handles = session.split_mut();
            let reader = handles.reader;
            let writer = handles.writer;
            let child = handles.child;

            scope.spawn(move || {
                let outcome = step_runner::await_sentinel(reader, emitter, guid);
                let _ = result_tx.send(outcome);
            });

            crossbeam_channel::select! {
                recv(result_rx) -> outcome => {
                    match outcome {
                        Ok(outcome) => RaceResult::Completed(outcome),
                        Err(_) => RaceResult::Completed(StepOutcome::ok()),
                    }
                }
                recv(timeout_rx) -> _ => {
                    let _ = writer.write_all(TIMEOUT_BANNER.as_bytes());
                    let _ = writer.flush();
                    shell_session::abort_child(child);
                    sleep_reaper::reap_from_config(&self.config, true);
                    RaceResult::TimedOut
                }
                recv(signal_rx) -> _ => {
                    let _ = writer.write_all(&[shell_session::EOT]);
                    let _ = writer.flush();
                    shell_session::abort_child(child);
                    sleep_reaper::reap_from_config(&self.config, false);
                    RaceResult::Signaled
                }
            }
        });

        match race {
            RaceResult::Completed(outcome) => outcome,
            RaceResult::TimedOut => {
                let err = ExecutorError::Timeout;
                StepOutcome::new(err.exit_code(), Some(err))
            }
            RaceResult::Signaled => {
                let err = ExecutorError::Aborted;
                StepOutcome::new(err.exit_code(), Some(err))
            }
        }
    }

    /// One-per-build timer. Fires once after `timeout` elapses; a stale
    /// firing after the build ends is simply dropped (no receiver left).
    fn spawn_timeout_task(timeout: Duration) -> crossbeam_channel::Receiver<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            thread::sleep(timeout);
            let _ = tx.send(());
        });
        rx
    }

    /// One-per-build signal observer. Blocks on SIGINT/SIGTERM and
    /// publishes at most one abort event.
    fn spawn_signal_task() -> Result<crossbeam_channel::Receiver<()>, ExecutorError> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(ExecutorError::Io)?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            if signals.forever().next().is_some() {
                let _ = tx.send(());
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ApiCall, RecordingApi};
    use crate::emitter::RecordingEmitter;
    use std::path::PathBuf;

    fn test_config() -> ExecutorConfig {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("env");
        let script_path = dir.path().join("step.sh");
        std::mem::forget(dir);
        let mut config = ExecutorConfig::new(
            std::env::temp_dir(),
            vec![],
            "build-1",
            PathBuf::from("/bin/sh"),
            Duration::from_secs(30),
            prefix,
            std::env::temp_dir(),
        );
        config.step_script_path = script_path;
        config
    }

    #[test]
    fn happy_path_runs_one_step() {
        let config = test_config();
        let emitter = RecordingEmitter::new();
        let api = RecordingApi::new();
        let supervisor = Supervisor::new(config, &emitter, &api);
        let build: Build = vec![CommandDef { name: "a".into(), cmd: "echo hello".into() }];

        let result = supervisor.run(&build);

        assert!(result.is_ok());
        assert!(emitter.lines().contains(&"$ echo hello".to_string()));
        assert!(emitter.lines().contains(&"hello".to_string()));
        assert_eq!(
            api.calls(),
            vec![ApiCall::Start("a".into()), ApiCall::Stop("a".into(), 0)]
        );
    }

    #[test]
    fn non_zero_step_skips_remaining_steps() {
        let config = test_config();
        let emitter = RecordingEmitter::new();
        let api = RecordingApi::new();
        let supervisor = Supervisor::new(config, &emitter, &api);
        let build: Build = vec![
            CommandDef { name: "a".into(), cmd: "exit 7".into() },
            CommandDef { name: "b".into(), cmd: "echo unreached".into() },
        ];

        let result = supervisor.run(&build);

        assert!(result.is_err());
        assert_eq!(
            api.calls(),
            vec![ApiCall::Start("a".into()), ApiCall::Stop("a".into(), 7)]
        );
        assert!(!emitter.lines().iter().any(|l| l.contains("unreached")));
    }

    #[test]
    fn teardown_runs_after_step_failure() {
        let config = test_config();
        let emitter = RecordingEmitter::new();
        let api = RecordingApi::new();
        let supervisor = Supervisor::new(config, &emitter, &api);
        let build: Build = vec![
            CommandDef { name: "a".into(), cmd: "false".into() },
            CommandDef { name: "teardown-x".into(), cmd: "echo bye".into() },
        ];

        let result = supervisor.run(&build);

        assert!(result.is_err());
        assert!(emitter.lines().contains(&"bye".to_string()));
        assert!(api
            .calls()
            .contains(&ApiCall::Start("teardown-x".into())));
    }

    #[test]
    fn empty_build_succeeds_with_no_api_calls() {
        let config = test_config();
        let emitter = RecordingEmitter::new();
        let api = RecordingApi::new();
        let supervisor = Supervisor::new(config, &emitter, &api);
        let build: Build = vec![];

        let result = supervisor.run(&build);

        assert!(result.is_ok());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn partitions_by_name_prefix() {
        let build: Build = vec![
            CommandDef { name: "install".into(), cmd: "echo a".into() },
            CommandDef { name: "teardown-cleanup".into(), cmd: "echo b".into() },
            CommandDef { name: "preteardown-x".into(), cmd: "echo skip".into() },
            CommandDef { name: "sd-teardown-artifacts".into(), cmd: "echo c".into() },
        ];

        let (user, user_teardowns, sd_teardowns) = partition(&build);

        assert_eq!(user.len(), 1);
        assert_eq!(user[0].name, "install");
        assert_eq!(user_teardowns.len(), 2);
        assert_eq!(user_teardowns[0].name, "teardown-cleanup");
        assert_eq!(user_teardowns[1].name, "preteardown-x");
        assert_eq!(sd_teardowns.len(), 1);
        assert_eq!(sd_teardowns[0].name, "sd-teardown-artifacts");
    }

    #[test]
    fn pre_and_post_teardown_prefixes_are_user_teardowns() {
        let build: Build = vec![
            CommandDef { name: "preteardown-setup".into(), cmd: "echo a".into() },
            CommandDef { name: "postteardown-report".into(), cmd: "echo b".into() },
        ];

        let (user, user_teardowns, _sd) = partition(&build);

        assert!(user.is_empty());
        assert_eq!(user_teardowns.len(), 2);
    }
}
