use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use uuid::Uuid;

use crate::demux;
use crate::emitter::Emitter;
use crate::model::StepOutcome;

/// Mints a fresh step identifier. A plain v4 UUID, unique within a build
/// with overwhelming probability.
pub fn new_guid() -> String {
    Uuid::new_v4().to_string()
}

/// The single line that stamps the step id, sources the materialized
/// script, and appends the exit sentinel.
pub fn invocation_line(guid: &str, script_path: &Path) -> String {
    format!(
        "export SD_STEP_ID={guid} ;. {path} ;echo ;echo {guid} $?\n",
        path = script_path.display(),
    )
}

/// Blocks on the session's PTY reader until the step's sentinel (or EOF)
/// arrives. The supervisor calls this on a scoped thread, racing it against
/// timeout/signal events, after writing the invocation line synchronously.
pub fn await_sentinel(reader: &mut BufReader<File>, emitter: &dyn Emitter, guid: &str) -> StepOutcome {
    demux::copy_until_sentinel(reader, emitter, guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guids_are_unique() {
        let a = new_guid();
        let b = new_guid();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
