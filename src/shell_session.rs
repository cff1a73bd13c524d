use std::ffi::CString;
use std::fs::File;
use std::io::{BufReader, Write};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::ffi::OsStrExt;

use nix::libc;
use nix::pty::openpty;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{execvp, fork, setsid, ForkResult, Pid};

use crate::config::ExecutorConfig;
use crate::emitter::Emitter;
use crate::error::ExecutorError;

/// Byte the shell's line discipline treats as end-of-input, triggering its
/// EXIT trap the same way typing Ctrl-D would in an interactive terminal.
pub const EOT: u8 = 0x04;

const SETUP_ECHO_SENTINEL: &str = "echo ;";

/// Cross-platform `login_tty`: makes the given fd the calling process's
/// controlling terminal and binds it to stdin/stdout/stderr. Lifted from
/// `src/tty_spawn.rs`'s `login_tty_compat`, trimmed to the Linux/macOS
/// targets this subsystem ships on (no Windows PTY support exists).
unsafe fn login_tty_compat(fd: i32) -> nix::Result<()> {
    #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
    {
        if libc::login_tty(fd) == 0 {
            Ok(())
        } else {
            Err(nix::Error::last())
        }
    }
    #[cfg(not(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd")))]
    {
        setsid()?;
        #[cfg(target_os = "linux")]
        const TIOCSCTTY: libc::c_ulong = 0x540E;
        #[cfg(target_os = "linux")]
        if libc::ioctl(fd, TIOCSCTTY, 0) == -1 && libc::ioctl(fd, TIOCSCTTY, 1) == -1 {
            return Err(nix::Error::last());
        }
        if libc::dup2(fd, 0) == -1 || libc::dup2(fd, 1) == -1 || libc::dup2(fd, 2) == -1 {
            return Err(nix::Error::last());
        }
        if fd > 2 {
            libc::close(fd);
        }
        Ok(())
    }
}

/// Owns the long-lived shell child attached to a PTY master. Commands are
/// written as lines of shell source; the master is read (line by line, via
/// the Output demultiplexer) to observe their effect.
pub struct ShellSession {
    reader: BufReader<File>,
    writer: File,
    child: Pid,
}

impl ShellSession {
    /// Forks `config.shell_bin` attached to a freshly opened PTY.
    pub fn open(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let pty = openpty(None, None).map_err(|e| ExecutorError::Launch(e.into()))?;

        match unsafe { fork() }.map_err(|e| ExecutorError::Launch(e.into()))? {
            ForkResult::Parent { child } => {
                drop(pty.slave);
                let master_file = unsafe { File::from_raw_fd(pty.master.into_raw_fd()) };
                let writer = master_file.try_clone().map_err(ExecutorError::Launch)?;
                Ok(Self {
                    reader: BufReader::new(master_file),
                    writer,
                    child,
                })
            }
            ForkResult::Child => {
                drop(pty.master);
                let slave_fd = pty.slave.into_raw_fd();
                // Safety: we are the freshly forked child, about to exec.
                if unsafe { login_tty_compat(slave_fd) }.is_err() {
                    std::process::exit(crate::model::EXIT_LAUNCH);
                }

                std::env::set_current_dir(&config.work_dir).ok();
                // The child inherits the launcher process's full environment via
                // fork(); clear it so the step shell's environment is exactly
                // `config.env`, not that plus whatever the launcher happened to hold.
                for (key, _) in std::env::vars() {
                    std::env::remove_var(key);
                }
                for (key, value) in &config.env {
                    std::env::set_var(key, value);
                }

                let shell = CString::new(config.shell_bin.as_os_str().as_bytes())
                    .unwrap_or_else(|_| CString::new("/bin/sh").unwrap());
                let _ = execvp(&shell, &[shell.clone()]);
                // execvp only returns on failure.
                std::process::exit(crate::model::EXIT_LAUNCH);
            }
        }
    }

    /// Transmits the deterministic prelude and waits for its own echo
    /// to come back, forwarding every observed line to `emitter` along the
    /// way.
    pub fn setup(&mut self, emitter: &dyn Emitter, config: &ExecutorConfig) -> Result<(), ExecutorError> {
        let export_file = config.export_file();
        let tmp_file = config.tmp_file();
        let prelude = format!(
            "set -e\n\
             export PATH=${{PATH}}:/opt/sd:/usr/sd/bin\n\
             finish() {{ EXITCODE=$?; tmpfile={tmp}; exportfile={export}; \
             export -p | grep -vi \"PS1=\" > $tmpfile && mv -f $tmpfile $exportfile; \
             echo $SD_STEP_ID $EXITCODE; }}\n\
             trap finish ABRT EXIT\n\
             {SETUP_ECHO_SENTINEL}\n",
            tmp = tmp_file.display(),
            export = export_file.display(),
        );

        self.send(&prelude)?;

        loop {
            let (line, eof) = crate::line_reader::read_line(&mut self.reader).map_err(ExecutorError::Reader)?;
            if eof {
                return Err(ExecutorError::Launch(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "shell exited during setup",
                )));
            }
            emitter.write_line(&line).map_err(ExecutorError::Io)?;
            if line == SETUP_ECHO_SENTINEL {
                return Ok(());
            }
        }
    }

    /// Writes `text` to the PTY master.
    pub fn send(&mut self, text: &str) -> Result<(), ExecutorError> {
        self.writer.write_all(text.as_bytes()).map_err(ExecutorError::Io)?;
        self.writer.flush().map_err(ExecutorError::Io)
    }

    /// Writes a single EOT byte, causing the shell to see end-of-input and
    /// run its EXIT trap.
    pub fn close_shell(&mut self) -> Result<(), ExecutorError> {
        self.writer.write_all(&[EOT]).map_err(ExecutorError::Io)?;
        self.writer.flush().map_err(ExecutorError::Io)
    }

    /// Splits into independently-borrowable handles so the supervisor can
    /// hand the reader to a scoped step-runner thread while still writing
    /// control bytes (timeout banner, EOT) or signaling the child from the
    /// calling thread.
    pub fn split_mut(&mut self) -> StepHandles<'_> {
        StepHandles {
            reader: &mut self.reader,
            writer: &mut self.writer,
            child: self.child,
        }
    }
}

/// Disjoint borrow of a [`ShellSession`]'s fields, see [`ShellSession::split_mut`].
pub struct StepHandles<'a> {
    pub reader: &'a mut BufReader<File>,
    pub writer: &'a mut File,
    pub child: Pid,
}

/// Sends `SIGABRT` to the shell child, the one-kill-per-shell abort path
/// used by both the timeout and signal branches in the supervisor. Takes a
/// bare `Pid` rather than `&ShellSession` since the supervisor only has
/// `StepHandles::child` on hand while a step is racing.
pub fn abort_child(child: Pid) {
    let _ = kill(child, Signal::SIGABRT);
}
