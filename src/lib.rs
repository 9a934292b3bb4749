//! Execution of child processes with pluggable stream redirection.
//!
//! `prochelp` is a Unix process-execution layer that replaces the standard
//! library's spawning API with one built around three ideas:
//!
//! * **Pluggable redirection.**  Each standard stream of the child is
//!   connected by a per-stream handler: a pipe back to the parent (the
//!   default), a file opened for reading, writing, or appending, or an
//!   arbitrary byte channel ([`ReadChannel`] / [`WriteChannel`]) bridged
//!   by a copy loop.
//! * **Monitor-driven I/O.**  Channel bridges are [`Monitor`]s: units of
//!   recurring work updated on a fixed tick for as long as the child is
//!   alive, with a setup/update/cleanup lifecycle.
//! * **Asynchronous launch tracking.**  The spawned [`ProcessHandle`] is
//!   published through a single-assignment [`SettableFuture`], so any
//!   thread can block on [`ProcessFuture::get`] for the running process
//!   while the launching thread drives the monitor loop to completion.
//!
//! A launch is described with the [`Launch`] builder and run with
//! [`ProcessCall::call`], which spawns the child, pumps the monitors
//! until it exits, and hands the exited process to a completion function:
//!
//! ```no_run
//! use prochelp::Launch;
//!
//! fn main() -> prochelp::Result<()> {
//!     let call = Launch::cmd("echo").arg("hello").create(|p| p.exit_value());
//!     let future = call.future();
//!     let status = call.call()??;
//!     assert!(status.success());
//!     let process = future.get()?;
//!     // process.take_stdout() is the parent end of the stdout pipe
//!     Ok(())
//! }
//! ```
//!
//! Liveness is tracked by non-blocking `waitpid` polls on a fixed 100 ms
//! cadence, and exit statuses are decoded into the shell-style encoding:
//! a normal exit reports its exit code, a signal termination reports
//! `signal_number | 0x80`.
//!
//! This crate targets POSIX systems only.

mod channel;
mod error;
mod future;
mod handle;
mod invoker;
mod launch;
mod monitor;
mod pipes;
mod posix;
mod spawn;

#[cfg(test)]
mod tests;

pub use channel::{ByteSink, ByteSource, PipeReader, PipeWriter, ReadChannel, WriteChannel};
pub use error::{Error, Result};
pub use future::SettableFuture;
pub use handle::{ExitStatus, ProcessHandle};
pub use invoker::{ProcessCall, ProcessFuture};
pub use launch::Launch;
pub use monitor::{ChannelCopyMonitor, Monitor};
pub use pipes::{Redirect, StandardStream};
