use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;

use crate::emitter::Emitter;
use crate::error::ExecutorError;
use crate::line_reader;
use crate::model::{StepOutcome, EXIT_OK, EXIT_UNKNOWN};

fn sentinel_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^export SD_STEP_ID=").expect("static regex"))
}

fn sentinel_for(guid: &str) -> Regex {
    Regex::new(&format!(r"^{} (\d+)$", regex::escape(guid))).expect("guid-derived regex")
}

/// Reads lines from `stream` until one matches the exit sentinel `<guid>
/// <digits>`, forwarding everything else (minus internal wiring) to
/// `emitter`.
pub fn copy_until_sentinel<R: BufRead>(stream: &mut R, emitter: &dyn Emitter, guid: &str) -> StepOutcome {
    let sentinel = sentinel_for(guid);

    loop {
        let (line, eof) = match line_reader::read_line(stream) {
            Ok(pair) => pair,
            Err(err) => return StepOutcome::new(EXIT_UNKNOWN, Some(ExecutorError::Reader(err))),
        };

        if eof {
            // The shell died cleanly without ever emitting our sentinel.
            // Treated as success: any real failure will have been carried by
            // the supervisor's timeout/signal channels instead.
            return StepOutcome::ok();
        }

        if sentinel_prefix().is_match(&line) {
            continue;
        }

        if let Some(captures) = sentinel.captures(&line) {
            return match captures[1].parse::<i32>() {
                Ok(0) => StepOutcome::ok(),
                Ok(code) => StepOutcome::new(code, Some(ExecutorError::Step)),
                Err(_) => StepOutcome::new(
                    EXIT_UNKNOWN,
                    Some(ExecutorError::Parse(captures[1].to_string())),
                ),
            };
        }

        if let Err(err) = emitter.write_line(&line) {
            return StepOutcome::new(EXIT_UNKNOWN, Some(ExecutorError::Reader(err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use std::io::Cursor;

    #[test]
    fn forwards_plain_lines_and_stops_at_sentinel() {
        let guid = "11111111-1111-4111-8111-111111111111";
        let input = format!("hello\nworld\n{guid} 0\nunreached\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, EXIT_OK);
        assert!(outcome.error.is_none());
        assert_eq!(emitter.lines(), vec!["hello", "world"]);
    }

    #[test]
    fn non_zero_sentinel_is_an_error() {
        let guid = "22222222-2222-4222-8222-222222222222";
        let input = format!("{guid} 7\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, 7);
        assert!(matches!(outcome.error, Some(ExecutorError::Step)));
    }

    #[test]
    fn suppresses_step_id_export_marker() {
        let guid = "33333333-3333-4333-8333-333333333333";
        let input = format!("export SD_STEP_ID={guid} ;. /tmp/step.sh ;echo ;echo {guid} $?\n{guid} 0\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, EXIT_OK);
        assert!(emitter.lines().is_empty());
    }

    #[test]
    fn guid_mismatch_does_not_terminate_step() {
        let guid = "44444444-4444-4444-8444-444444444444";
        let other = "55555555-5555-4555-8555-555555555555";
        let input = format!("{other} 42\n{guid} 0\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, EXIT_OK);
        // The foreign sentinel line isn't internal wiring, so it's still logged.
        assert_eq!(emitter.lines(), vec![format!("{other} 42")]);
    }

    #[test]
    fn clean_eof_before_sentinel_is_ok() {
        let guid = "66666666-6666-4666-8666-666666666666";
        let mut cursor = Cursor::new(b"partial output\n".to_vec());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, EXIT_OK);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn unparseable_digits_yield_unknown() {
        // Not reachable via the anchored regex (\d+ only matches digits), but
        // guards the parse-error branch directly against a huge value that
        // still fails to fit in i32.
        let guid = "77777777-7777-4777-8777-777777777777";
        let input = format!("{guid} 99999999999999999999\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let emitter = RecordingEmitter::new();

        let outcome = copy_until_sentinel(&mut cursor, &emitter, guid);

        assert_eq!(outcome.exit_code, EXIT_UNKNOWN);
        assert!(matches!(outcome.error, Some(ExecutorError::Parse(_))));
    }
}
