use std::io::{self, Write};
use std::sync::Mutex;

/// Write-only log sink. Writes are expected to be serialized by the
/// supervisor's step sequencing: only one step or teardown is ever active
/// at a time, so implementations don't need their own internal locking for
/// correctness — `Mutex` below is only to satisfy `Sync` for the trait
/// object, not to arbitrate concurrent writers.
pub trait Emitter: Send + Sync {
    /// Writes a single line, verbatim, with its own trailing newline.
    fn write_line(&self, line: &str) -> io::Result<()>;

    /// Marks a step transition, e.g. rendering a `$ <cmd>` banner.
    fn start_cmd(&self, cmd: &str) -> io::Result<()>;
}

/// Emitter backed by any `Write`, line-buffered the way `src/server.rs`'s
/// blocking handlers flush after each write.
pub struct WriterEmitter<W: Write + Send> {
    inner: Mutex<W>,
}

impl<W: Write + Send> WriterEmitter<W> {
    pub const fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> Emitter for WriterEmitter<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut w = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(w, "{line}")?;
        w.flush()
    }

    fn start_cmd(&self, cmd: &str) -> io::Result<()> {
        let mut w = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(w, "$ {cmd}")?;
        w.flush()
    }
}

/// In-memory emitter for tests: records every line and every `start_cmd`
/// marker in call order so assertions can check exact sequencing.
#[derive(Default)]
pub struct RecordingEmitter {
    lines: Mutex<Vec<String>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Emitter for RecordingEmitter {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        Ok(())
    }

    fn start_cmd(&self, cmd: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("$ {cmd}"));
        Ok(())
    }
}
