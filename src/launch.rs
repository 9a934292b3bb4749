use std::ffi::{OsStr, OsString};

use crate::handle::ProcessHandle;
use crate::invoker::ProcessCall;
use crate::pipes::{Redirect, StandardStream};

/// A builder describing how to launch a child process.
///
/// All three standard streams default to [`Redirect::Pipe`]; each can be
/// redirected to a file or bridged to an external byte channel instead.
/// Configuration ends with [`create`](Self::create), which attaches the
/// completion function and yields a runnable [`ProcessCall`].
///
/// # Examples
///
/// ```no_run
/// # use prochelp::Launch;
/// # fn dummy() -> prochelp::Result<()> {
/// let status = Launch::cmd("umount").arg("/mnt").create(|p| p.exit_value()).call()??;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use]
pub struct Launch {
    argv: Vec<OsString>,
    env: Option<Vec<(OsString, OsString)>>,
    stdin: Redirect,
    stdout: Redirect,
    stderr: Redirect,
}

impl Launch {
    /// Starts describing a launch of `command`.
    ///
    /// The command is run directly, without an intervening shell, and is
    /// looked up in `PATH` unless it contains a slash.
    pub fn cmd(command: impl AsRef<OsStr>) -> Launch {
        Launch {
            argv: vec![command.as_ref().to_owned()],
            env: None,
            stdin: Redirect::Pipe,
            stdout: Redirect::Pipe,
            stderr: Redirect::Pipe,
        }
    }

    /// Runs `cmdstr` through the system shell, `sh -c`.
    ///
    /// Be careful not to interpolate untrusted input into `cmdstr`; prefer
    /// `Launch::cmd(..).arg(..)` for anything that comes from outside.
    pub fn shell(cmdstr: impl AsRef<OsStr>) -> Launch {
        Launch::cmd("sh").arg("-c").arg(cmdstr)
    }

    /// Appends `arg` to the argument list.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Launch {
        self.argv.push(arg.as_ref().to_owned());
        self
    }

    /// Extends the argument list with `args`.
    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Launch {
        self.argv
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    fn ensure_env(&mut self) -> &mut Vec<(OsString, OsString)> {
        self.env.get_or_insert_with(|| std::env::vars_os().collect())
    }

    /// Sets an environment variable in the child process.
    ///
    /// Other variables are inherited from a snapshot of the parent's
    /// environment taken at spawn time; call
    /// [`env_clear`](Self::env_clear) first if that is undesirable.  If
    /// the same variable is set more than once, the last value wins.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Launch {
        self.ensure_env()
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Starts the child with an empty environment.
    pub fn env_clear(mut self) -> Launch {
        self.env = Some(vec![]);
        self
    }

    /// Configures the child's standard input.
    ///
    /// # Panics
    ///
    /// Panics if given an output-only redirect (`Write`, `Append`, or
    /// `ToChannel`).
    pub fn stdin(mut self, redirect: Redirect) -> Launch {
        assert!(
            redirect.valid_for(StandardStream::Input),
            "{:?} is not valid for stdin",
            redirect
        );
        self.stdin = redirect;
        self
    }

    /// Configures the child's standard output.
    ///
    /// # Panics
    ///
    /// Panics if given an input-only redirect (`Read` or `FromChannel`).
    pub fn stdout(mut self, redirect: Redirect) -> Launch {
        assert!(
            redirect.valid_for(StandardStream::Output),
            "{:?} is not valid for stdout",
            redirect
        );
        self.stdout = redirect;
        self
    }

    /// Configures the child's standard error.
    ///
    /// # Panics
    ///
    /// Panics if given an input-only redirect (`Read` or `FromChannel`).
    pub fn stderr(mut self, redirect: Redirect) -> Launch {
        assert!(
            redirect.valid_for(StandardStream::Error),
            "{:?} is not valid for stderr",
            redirect
        );
        self.stderr = redirect;
        self
    }

    /// Finishes configuration, attaching the completion function that
    /// will receive the exited process.
    ///
    /// The completion function runs at the very end of a successful
    /// [`ProcessCall::call`], after the child has exited and every
    /// monitor has been cleaned up; its result becomes the call's result.
    pub fn create<T>(
        self,
        completion: impl FnOnce(&ProcessHandle) -> T + Send + 'static,
    ) -> ProcessCall<T> {
        ProcessCall::new(
            self.argv,
            self.env,
            self.stdin,
            self.stdout,
            self.stderr,
            Box::new(completion),
        )
    }
}
