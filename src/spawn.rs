use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;

use tracing::debug;

use crate::posix;

/// A descriptor action applied in the child between fork and exec, in the
/// order the pipe handlers emitted them.
#[derive(Debug, Copy, Clone)]
pub(crate) enum FdAction {
    /// Duplicate `fd` onto the conventional number of a standard stream.
    Dup { fd: RawFd, target: RawFd },

    /// Close the child's inherited copy of `fd`.
    Close { fd: RawFd },
}

impl FdAction {
    // Runs in the forked child: async-signal-safe calls only.
    fn apply(self) -> io::Result<()> {
        match self {
            FdAction::Dup { fd, target } if fd != target => posix::dup2(fd, target),
            FdAction::Dup { .. } => Ok(()),
            FdAction::Close { fd } => posix::close(fd),
        }
    }
}

/// Read exactly N bytes, or return None on immediate EOF.  Similar to
/// read_exact(), but distinguishes between no read and partial read
/// (which is treated as error).
fn read_exact_or_eof<const N: usize>(source: &mut File) -> io::Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut total_read = 0;
    while total_read < N {
        let n = source.read(&mut buf[total_read..])?;
        if n == 0 {
            break;
        }
        total_read += n;
    }
    match total_read {
        0 => Ok(None),
        n if n == N => Ok(Some(buf)),
        _ => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}

/// Formats the environment as the `KEY=VALUE` vector execve expects.
/// Later duplicates win.
pub(crate) fn format_env(env: &[(OsString, OsString)]) -> Vec<OsString> {
    let mut seen = HashSet::<&OsStr>::new();
    let mut formatted: Vec<_> = env
        .iter()
        .rev()
        .filter(|&(k, _)| seen.insert(k))
        .map(|(k, v)| {
            let mut fmt = k.clone();
            fmt.push("=");
            fmt.push(v);
            fmt
        })
        .collect();
    formatted.reverse();
    formatted
}

/// Forks and execs `argv[0]` with the given environment, applying
/// `actions` in the child before exec.  An exec failure is reported back
/// through a CLOEXEC pipe and surfaces as the returned error; a failure
/// leaves no child behind.
pub(crate) fn spawn(argv: &[OsString], env: &[OsString], actions: &[FdAction]) -> io::Result<u32> {
    let mut exec_fail_pipe = posix::pipe()?;
    posix::set_cloexec(&exec_fail_pipe.0)?;
    posix::set_cloexec(&exec_fail_pipe.1)?;

    let just_exec = posix::prep_exec(&argv[0], argv, env)?;

    let pid;
    unsafe {
        match posix::fork()? {
            Some(child_pid) => {
                pid = child_pid;
            }
            None => {
                drop(exec_fail_pipe.0);
                let result = apply_and_exec(actions, just_exec);
                let error_code = match result {
                    Ok(()) => unreachable!(),
                    Err(e) => e.raw_os_error().unwrap_or(-1),
                } as u32;
                exec_fail_pipe.1.write_all(&error_code.to_le_bytes()).ok();
                posix::_exit(127);
            }
        }
    }

    drop(exec_fail_pipe.1);
    match read_exact_or_eof::<4>(&mut exec_fail_pipe.0)? {
        None => {
            debug!(pid, "spawned child");
            Ok(pid)
        }
        Some(error_buf) => {
            let error_code = u32::from_le_bytes(error_buf);
            Err(io::Error::from_raw_os_error(error_code as i32))
        }
    }
}

fn apply_and_exec(actions: &[FdAction], just_exec: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
    for action in actions {
        action.apply()?;
    }
    posix::reset_sigpipe()?;
    just_exec()?;
    unreachable!();
}
