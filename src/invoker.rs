use std::env;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::future::SettableFuture;
use crate::handle::{ProcessHandle, StreamEndpoints};
use crate::monitor::Monitor;
use crate::pipes::{PipeHandler, Redirect, StandardStream, StreamEnd};
use crate::spawn::{self, FdAction};

/// Cadence of the monitor loop: how often monitors are updated and the
/// child is polled for exit.
const MONITOR_TICK: Duration = Duration::from_millis(100);

/// A configured launch, ready to run.
///
/// Produced by [`Launch::create`].  [`call`](Self::call) runs the whole
/// launch-monitor-exit-complete cycle on the calling thread, while
/// [`future`](Self::future) hands out an asynchronous view that any
/// thread can block on for the started [`ProcessHandle`].
///
/// [`Launch::create`]: crate::Launch::create
#[must_use]
pub struct ProcessCall<T> {
    argv: Vec<OsString>,
    env: Option<Vec<(OsString, OsString)>>,
    stdin: Redirect,
    stdout: Redirect,
    stderr: Redirect,
    completion: Box<dyn FnOnce(&ProcessHandle) -> T + Send>,
    future: Arc<SettableFuture<ProcessHandle>>,
}

impl<T> ProcessCall<T> {
    pub(crate) fn new(
        argv: Vec<OsString>,
        env: Option<Vec<(OsString, OsString)>>,
        stdin: Redirect,
        stdout: Redirect,
        stderr: Redirect,
        completion: Box<dyn FnOnce(&ProcessHandle) -> T + Send>,
    ) -> ProcessCall<T> {
        ProcessCall {
            argv,
            env,
            stdin,
            stdout,
            stderr,
            completion,
            future: Arc::new(SettableFuture::new()),
        }
    }

    /// An asynchronous view of the launch, resolving to the running
    /// [`ProcessHandle`] once the spawn completes, or to the spawn
    /// failure.
    pub fn future(&self) -> ProcessFuture {
        ProcessFuture(Arc::clone(&self.future))
    }

    /// Runs the full cycle: set up redirections, spawn, publish the
    /// handle, pump the monitors until the child exits, release the
    /// channels, and return the completion function's result.
    ///
    /// A failed launch is reported without ever invoking the completion
    /// function; a monitor fault terminates the cycle and surfaces here.
    pub fn call(self) -> Result<T> {
        let ProcessCall {
            argv,
            env,
            stdin,
            stdout,
            stderr,
            completion,
            future,
        } = self;

        let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
        future.compute(|| start(argv, env, stdin, stdout, stderr, &mut monitors));
        let process = future.get()?;

        for monitor in &mut monitors {
            monitor.setup(&process)?;
        }
        let mut slots: Vec<(Box<dyn Monitor>, bool)> =
            monitors.into_iter().map(|m| (m, false)).collect();

        while process.is_alive()? {
            tick(&mut slots, &process)?;
            process.wait_timeout(MONITOR_TICK)?;
        }
        // The child can exit with bytes still buffered in its pipes; keep
        // pumping until every monitor has seen end of input.
        while !tick(&mut slots, &process)? {
            std::thread::sleep(MONITOR_TICK);
        }
        for (monitor, _) in &mut slots {
            monitor.cleanup(&process)?;
        }

        debug!(pid = process.pid(), "launch complete");
        Ok(completion(&process))
    }
}

// Updates every unfinished monitor; true once all have finished.
fn tick(slots: &mut [(Box<dyn Monitor>, bool)], process: &ProcessHandle) -> Result<bool> {
    let mut all_finished = true;
    for (monitor, finished) in slots.iter_mut() {
        if !*finished {
            *finished = monitor.update(process)?;
        }
        all_finished &= *finished;
    }
    Ok(all_finished)
}

fn start(
    argv: Vec<OsString>,
    env: Option<Vec<(OsString, OsString)>>,
    stdin: Redirect,
    stdout: Redirect,
    stderr: Redirect,
    monitors: &mut Vec<Box<dyn Monitor>>,
) -> Result<ProcessHandle> {
    let mut handlers = [
        (StandardStream::Input, PipeHandler::from_redirect(stdin)),
        (StandardStream::Output, PipeHandler::from_redirect(stdout)),
        (StandardStream::Error, PipeHandler::from_redirect(stderr)),
    ];

    let mut actions: Vec<FdAction> = Vec::new();
    for (stream, handler) in &mut handlers {
        actions.extend(handler.init(*stream)?);
    }

    // The child always receives a copy of the environment captured at
    // spawn time.
    let env = spawn::format_env(&env.unwrap_or_else(|| env::vars_os().collect()));

    let command = argv[0].to_string_lossy().into_owned();
    debug!(command = %command, "spawning");
    let pid = spawn::spawn(&argv, &env, &actions)
        .map_err(|source| Error::Spawn { command, source })?;

    let mut streams = StreamEndpoints::default();
    for (stream, handler) in &mut handlers {
        match (handler.after_spawn(*stream, monitors)?, *stream) {
            (Some(StreamEnd::Write(writer)), _) => streams.stdin = Some(writer),
            (Some(StreamEnd::Read(reader)), StandardStream::Output) => {
                streams.stdout = Some(reader)
            }
            (Some(StreamEnd::Read(reader)), _) => streams.stderr = Some(reader),
            (None, _) => {}
        }
    }

    Ok(ProcessHandle::new(pid, streams))
}

/// A cloneable, thread-safe view of a pending launch.
///
/// Obtained from [`ProcessCall::future`] before handing the call to
/// whatever thread runs it.
#[derive(Clone)]
pub struct ProcessFuture(Arc<SettableFuture<ProcessHandle>>);

impl ProcessFuture {
    /// Blocks until the process has been spawned and returns its handle.
    /// A recorded spawn failure is re-raised here on every call.
    pub fn get(&self) -> Result<ProcessHandle> {
        self.0.get()
    }

    /// Like [`get`](Self::get), but bounded by `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<ProcessHandle> {
        self.0.get_timeout(timeout)
    }
}
