use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::{PipeReader, PipeWriter};
use crate::error::{Error, Result};
use crate::posix;

/// Exit status of a child process, decoded from the raw wait-status word.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExitStatus {
    /// The process exited voluntarily with the given code.
    Exited(u32),

    /// The process was terminated by a signal.  The value is the
    /// shell-style code `signal_number | 0x80`.
    Signaled(u32),

    /// The process is known to have finished, but its status was
    /// collected by foreign code and is unavailable.
    ///
    /// This should not occur in normal operation.
    Undetermined,
}

impl ExitStatus {
    /// Decodes a raw wait-status word.
    ///
    /// A zero low nibble means a normal exit with the code in bits 8-15;
    /// anything else is a signal termination, reported as the signal
    /// number with bit 7 set, the encoding shells use for `$?`.
    pub fn from_wait_status(raw: i32) -> ExitStatus {
        if raw & 0x000F == 0 {
            ExitStatus::Exited(((raw >> 8) & 0xFF) as u32)
        } else {
            ExitStatus::Signaled(((raw & 0xFF) | 0x80) as u32)
        }
    }

    /// The shell-style exit code, if known.
    pub fn code(&self) -> Option<u32> {
        match *self {
            ExitStatus::Exited(code) | ExitStatus::Signaled(code) => Some(code),
            ExitStatus::Undetermined => None,
        }
    }

    /// The terminating signal number, if the process was signaled.
    pub fn signal(&self) -> Option<u32> {
        match *self {
            ExitStatus::Signaled(code) => Some(code & 0x7F),
            _ => None,
        }
    }

    /// True if the exit status of the process is 0.
    pub fn success(&self) -> bool {
        matches!(*self, ExitStatus::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(code) => write!(f, "signal {}", code & 0x7F),
            ExitStatus::Undetermined => write!(f, "undetermined exit status"),
        }
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handle to a spawned child process.
///
/// `ProcessHandle` is cheaply cloneable; clones share the underlying
/// state, so an exit status observed through one clone is visible to all.
/// Liveness is tracked by non-blocking `waitpid` polls: the handle starts
/// out running and transitions to exited exactly once, after which the
/// decoded exit status is cached and immutable.
///
/// The parent-side stream endpoints are held by the handle until taken
/// with [`take_stdin`](Self::take_stdin) and friends; streams not
/// redirected to a pipe have no endpoint.
#[derive(Clone)]
pub struct ProcessHandle(Arc<HandleInner>);

struct HandleInner {
    pid: u32,
    state: Mutex<Lifecycle>,
    streams: Mutex<StreamEndpoints>,
}

#[derive(Debug)]
enum Lifecycle {
    Running,
    Exited(ExitStatus),
}

#[derive(Debug, Default)]
pub(crate) struct StreamEndpoints {
    pub stdin: Option<PipeWriter>,
    pub stdout: Option<PipeReader>,
    pub stderr: Option<PipeReader>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, streams: StreamEndpoints) -> ProcessHandle {
        ProcessHandle(Arc::new(HandleInner {
            pid,
            state: Mutex::new(Lifecycle::Running),
            streams: Mutex::new(streams),
        }))
    }

    /// The operating-system process id of the child.
    pub fn pid(&self) -> u32 {
        self.0.pid
    }

    /// Takes the write end of the child's stdin pipe, if stdin was piped.
    ///
    /// Dropping the returned writer delivers end-of-input to the child.
    pub fn take_stdin(&self) -> Option<PipeWriter> {
        self.0.streams.lock().unwrap().stdin.take()
    }

    /// Takes the read end of the child's stdout pipe, if stdout was piped.
    pub fn take_stdout(&self) -> Option<PipeReader> {
        self.0.streams.lock().unwrap().stdout.take()
    }

    /// Takes the read end of the child's stderr pipe, if stderr was piped.
    pub fn take_stderr(&self) -> Option<PipeReader> {
        self.0.streams.lock().unwrap().stderr.take()
    }

    /// Polls the child once, without blocking, and reports whether it is
    /// still running.
    pub fn is_alive(&self) -> Result<bool> {
        let mut state = self.0.state.lock().unwrap();
        self.0.check_exit(&mut state)?;
        Ok(matches!(*state, Lifecycle::Running))
    }

    /// Returns the exit status, or [`Error::StillRunning`] if the child
    /// has not exited.  Performs one non-blocking poll first.
    pub fn exit_value(&self) -> Result<ExitStatus> {
        let mut state = self.0.state.lock().unwrap();
        self.0.check_exit(&mut state)?;
        match *state {
            Lifecycle::Exited(status) => Ok(status),
            Lifecycle::Running => Err(Error::StillRunning),
        }
    }

    /// Blocks until the child exits, polling on a fixed 100 ms interval.
    pub fn wait(&self) -> Result<ExitStatus> {
        loop {
            if let Some(status) = self.wait_once(WAIT_POLL_INTERVAL)? {
                return Ok(status);
            }
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`, returning
    /// `Ok(None)` if the child is still running.  The child itself is not
    /// affected by the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(status) = self.wait_once(remaining.min(WAIT_POLL_INTERVAL))? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    // One poll-then-sleep step shared by the wait loops.
    fn wait_once(&self, sleep: Duration) -> Result<Option<ExitStatus>> {
        {
            let mut state = self.0.state.lock().unwrap();
            self.0.check_exit(&mut state)?;
            if let Lifecycle::Exited(status) = *state {
                return Ok(Some(status));
            }
        }
        std::thread::sleep(sleep);
        Ok(None)
    }

    /// Sends SIGTERM to the child and blocks until it exits.
    pub fn terminate(&self) -> Result<ExitStatus> {
        self.send_signal(posix::SIGTERM)?;
        self.wait()
    }

    /// Sends SIGKILL to the child and blocks until it exits.
    pub fn kill(&self) -> Result<ExitStatus> {
        self.send_signal(posix::SIGKILL)?;
        self.wait()
    }

    fn send_signal(&self, signal: i32) -> Result<()> {
        let state = self.0.state.lock().unwrap();
        match *state {
            // Already reaped; the pid may have been reused, do not signal.
            Lifecycle::Exited(_) => Ok(()),
            Lifecycle::Running => Ok(posix::kill(self.0.pid, signal)?),
        }
    }
}

impl HandleInner {
    // One WNOHANG poll; transitions to Exited the first time the child is
    // reported gone.  ECHILD means foreign code collected the status.
    fn check_exit(&self, state: &mut Lifecycle) -> Result<()> {
        if matches!(*state, Lifecycle::Exited(_)) {
            return Ok(());
        }
        match posix::waitpid(self.pid, posix::WNOHANG) {
            Ok((0, _)) => {}
            Ok((_, raw)) => {
                let status = ExitStatus::from_wait_status(raw);
                debug!(pid = self.pid, raw, %status, "child exited");
                *state = Lifecycle::Exited(status);
            }
            Err(e) if e.raw_os_error() == Some(posix::EINTR) => {
                return Err(Error::Interrupted(e));
            }
            Err(e) if e.raw_os_error() == Some(posix::ECHILD) => {
                *state = Lifecycle::Exited(ExitStatus::Undetermined);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // Best-effort reap to avoid leaving a zombie behind.
        let state = self.state.get_mut().unwrap();
        if matches!(*state, Lifecycle::Running) {
            posix::waitpid(self.pid, posix::WNOHANG).ok();
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock().unwrap();
        f.debug_struct("ProcessHandle")
            .field("pid", &self.0.pid)
            .field("state", &*state)
            .finish()
    }
}
