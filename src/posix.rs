use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io::{Error, Result};
use std::iter;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::ptr;
use std::time::Duration;

pub use libc::{ECHILD, EINTR, SIGKILL, SIGTERM, WNOHANG};

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// Create an anonymous pipe, returning `(read_end, write_end)`.
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

/// Fork the process, returning `Some(child_pid)` in the parent and `None`
/// in the child.
///
/// # Safety
///
/// In a multithreaded program the child may only call async-signal-safe
/// functions until it execs.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    Ok((pid != 0).then_some(pid as u32))
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    let bytes = s.as_bytes();
    if bytes.iter().any(|&b| b == 0) {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    }
    Ok(CString::new(bytes)
        // not expected to fail on Unix, as Unix strings *are* C strings
        .expect("converting Unix string to C string"))
}

fn cstring_ptr(s: &CString) -> *const libc::c_char {
    s.as_bytes_with_nul().as_ptr() as _
}

#[derive(Debug)]
struct CVec {
    // Individual C strings; they are not unused as rustc thinks, they
    // are pointed to by elements of self.ptrs.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers to data inside
    // self.strings.
    ptrs: Vec<*const libc::c_char>,
}

impl CVec {
    fn new<S>(slice: &[S]) -> Result<CVec>
    where
        S: AsRef<OsStr>,
    {
        let strings = slice
            .iter()
            .map(|x| os_to_cstring(x.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let ptrs: Vec<_> = strings
            .iter()
            .map(cstring_ptr)
            .chain(iter::once(ptr::null()))
            .collect();
        Ok(CVec { strings, ptrs })
    }

    fn as_c_vec(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// Prepare an exec of `cmd` with `args` and `env`.
///
/// All allocation and string conversion happens here, before the fork.
/// `execvpe` is not POSIX, so the `PATH` search is emulated by converting
/// every candidate path up front; the returned closure only issues
/// `execve` calls and is safe to run in the child of a multithreaded
/// parent.
pub fn prep_exec(
    cmd: &OsStr,
    args: &[OsString],
    env: &[OsString],
) -> Result<impl FnOnce() -> Result<()>> {
    let argvec = CVec::new(args)?;
    let envvec = CVec::new(env)?;

    let mut candidates = Vec::new();
    if cmd.as_bytes().contains(&b'/') {
        candidates.push(os_to_cstring(cmd)?);
    } else if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            candidates.push(os_to_cstring(dir.join(cmd).as_os_str())?);
        }
    }

    Ok(move || {
        for exe in &candidates {
            unsafe {
                libc::execve(cstring_ptr(exe), argvec.as_c_vec(), envvec.as_c_vec());
            }
        }
        Err(Error::from_raw_os_error(libc::ENOENT))
    })
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

/// Wait for a state change of the child, returning `(pid, raw_status)`.
/// With `WNOHANG`, a returned pid of 0 means no state change yet.
pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, i32)> {
    let mut status = 0 as libc::c_int;
    let pid_out = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid_out as u32, status))
}

pub fn kill(pid: u32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

pub fn close(fd: RawFd) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

pub fn set_cloexec(f: &File) -> Result<()> {
    let fd = f.as_raw_fd();
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

pub fn set_nonblocking(f: &File) -> Result<()> {
    let fd = f.as_raw_fd();
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFL, old | libc::O_NONBLOCK) })?;
    Ok(())
}

pub fn reset_sigpipe() -> Result<()> {
    // This is called after forking to reset SIGPIPE handling to the
    // defaults that Unix programs expect.  Quoting
    // std::process::Command::do_exec:
    //
    // """
    // libstd ignores SIGPIPE, and signal-handling libraries often set
    // a mask. Child processes inherit ignored signals and the signal
    // mask from their parent, but most UNIX programs do not reset
    // these things on their own, so we need to clean things up now to
    // avoid confusing the program we're about to run.
    // """

    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        check_err(libc::pthread_sigmask(
            libc::SIG_SETMASK,
            set.as_ptr(),
            ptr::null_mut(),
        ))?;
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

#[repr(transparent)]
pub struct PollFd<'a>(libc::pollfd, PhantomData<&'a File>);

impl<'a> PollFd<'a> {
    pub fn new(f: Option<&'a File>, events: i16) -> PollFd<'a> {
        PollFd(
            libc::pollfd {
                fd: f.map(File::as_raw_fd).unwrap_or(-1),
                events,
                revents: 0,
            },
            PhantomData,
        )
    }
}

pub use libc::{POLLIN, POLLOUT};

pub fn poll(fds: &mut [PollFd<'_>], timeout: Option<Duration>) -> Result<usize> {
    let timeout = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);
    let cnt = unsafe {
        check_err(libc::poll(
            fds.as_mut_ptr() as *mut libc::pollfd,
            fds.len() as libc::nfds_t,
            timeout,
        ))?
    };
    Ok(cnt as usize)
}
