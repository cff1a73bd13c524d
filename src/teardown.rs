use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use crate::config::{ExecutorConfig, TEARDOWN_EXPORT_WAIT};
use crate::emitter::Emitter;
use crate::error::ExecutorError;
use crate::line_reader;
use crate::model::{CommandDef, StepOutcome, EXIT_LAUNCH, EXIT_UNKNOWN};

/// Runs one teardown `CommandDef` in a fresh `<shell> -e -c "<wrapper>"`
/// subprocess (not the PTY session, which has already been closed). See
/// The wrapper waits up to `TEARDOWN_EXPORT_WAIT` for `ExportFile` to
/// appear and sources it if found, but proceeds regardless.
pub fn run_teardown(
    cmd: &CommandDef,
    step_exit_code: i32,
    config: &ExecutorConfig,
    emitter: &dyn Emitter,
) -> StepOutcome {
    emitter.start_cmd(&cmd.cmd).ok();

    let wrapper = build_wrapper(cmd, step_exit_code, config);

    let mut child = match Command::new(&config.shell_bin)
        .arg("-e")
        .arg("-c")
        .arg(&wrapper)
        .current_dir(&config.source_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => return StepOutcome::new(EXIT_LAUNCH, Some(ExecutorError::Launch(err))),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    std::thread::scope(|scope| {
        if let Some(stdout) = stdout {
            scope.spawn(|| stream_lines(stdout, emitter));
        }
        if let Some(stderr) = stderr {
            scope.spawn(|| stream_lines(stderr, emitter));
        }
    });

    match child.wait() {
        Ok(status) => {
            let code = status.code().unwrap_or(EXIT_UNKNOWN);
            if code == 0 {
                StepOutcome::ok()
            } else {
                StepOutcome::new(code, Some(ExecutorError::Step))
            }
        }
        Err(err) => StepOutcome::new(EXIT_UNKNOWN, Some(ExecutorError::Reader(err))),
    }
}

fn build_wrapper(cmd: &CommandDef, step_exit_code: i32, config: &ExecutorConfig) -> String {
    let export_file = config.export_file();
    format!(
        "export PATH=${{PATH}}:/opt/sd:/usr/sd/bin SD_STEP_EXIT_CODE={code}\n\
         && START=$(date +%s)\n\
         ; while ! [ -f {export} ] && [ $(($(date +%s)-$START)) -lt {wait} ]; do sleep 1; done\n\
         ; if [ -f {export} ]; then set +e; . {export}; set -e; fi\n\
         ; {body}",
        code = step_exit_code,
        export = export_file.display(),
        wait = TEARDOWN_EXPORT_WAIT.as_secs(),
        body = cmd.cmd,
    )
}

fn stream_lines<R: std::io::Read>(reader: R, emitter: &dyn Emitter) {
    let mut buffered = BufReader::new(reader);
    loop {
        match line_reader::read_line(&mut buffered) {
            Ok((_, true)) => break,
            Ok((line, false)) => {
                if emitter.write_line(&line).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
