use std::io;

use tracing::trace;

use crate::channel::{ReadChannel, WriteChannel};
use crate::error::{Error, Result};
use crate::handle::ProcessHandle;
use crate::pipes::StandardStream;

/// Size of the scratch buffer used by a single copy burst.
pub(crate) const COPY_BUF_SIZE: usize = 1024;

enum Drain {
    /// Everything buffered was accepted.
    Done,
    /// The destination is saturated; retry on the next tick.
    Blocked,
    /// The destination's reader is gone; the copy is over.
    Closed,
}

/// A recurring unit of work tied to a running child process.
///
/// Monitors are registered by pipe handlers during stream setup and driven
/// by the invoker: `setup` once before the first tick, `update` on every
/// tick, `cleanup` once after the child has exited.  Once `update` reports
/// finished the monitor is not updated again.
pub trait Monitor: Send {
    fn setup(&mut self, process: &ProcessHandle) -> Result<()>;

    /// Performs one bounded burst of work.  Returns `true` once the
    /// monitor has permanently finished.
    fn update(&mut self, process: &ProcessHandle) -> Result<bool>;

    fn cleanup(&mut self, process: &ProcessHandle) -> Result<()>;
}

/// Moves bytes from a source channel to a destination channel until the
/// source reports end of input or either channel closes.
///
/// Bridges a child's pipe with an externally supplied channel: for stdin
/// the source is the external channel and the destination the pipe, for
/// stdout and stderr the other way around.  On end of input both channels
/// are closed, which delivers EOF through a bridged stdin and guarantees
/// an external sink sees no further writes once copying is done.
pub struct ChannelCopyMonitor {
    source: Box<dyn ReadChannel>,
    dest: Box<dyn WriteChannel>,
    stream: StandardStream,
    // Bytes read but not yet accepted by the destination, carried across
    // ticks so a saturated destination never loses data.
    pending: Vec<u8>,
    pos: usize,
}

impl ChannelCopyMonitor {
    pub fn new(
        source: Box<dyn ReadChannel>,
        dest: Box<dyn WriteChannel>,
        stream: StandardStream,
    ) -> ChannelCopyMonitor {
        ChannelCopyMonitor {
            source,
            dest,
            stream,
            pending: Vec::new(),
            pos: 0,
        }
    }

    fn transfer_err(&self, source: io::Error) -> Error {
        Error::Transfer {
            stream: self.stream,
            source,
        }
    }

    /// Writes out buffered bytes.
    fn drain_pending(&mut self) -> Result<Drain> {
        while self.pos < self.pending.len() {
            match self.dest.try_write(&self.pending[self.pos..]) {
                Ok(n) => self.pos += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drain::Blocked),
                // The reader of the destination is gone; remaining bytes
                // have nowhere to go.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    self.pending.clear();
                    self.pos = 0;
                    return Ok(Drain::Closed);
                }
                Err(e) => return Err(self.transfer_err(e)),
            }
        }
        self.pending.clear();
        self.pos = 0;
        Ok(Drain::Done)
    }

    fn close_both(&mut self) -> Result<()> {
        let stream = self.stream;
        let cleanup_err = move |source| Error::Cleanup { stream, source };
        let dest_already_closed = !self.dest.is_open();
        if !dest_already_closed {
            self.dest.close().map_err(cleanup_err)?;
        }
        if self.source.is_open() {
            match self.source.close() {
                // Best-effort release: with the write side already gone
                // there is nothing left to lose on the read side.
                Err(_) if dest_already_closed => {}
                other => other.map_err(cleanup_err)?,
            }
        }
        Ok(())
    }
}

impl Monitor for ChannelCopyMonitor {
    fn setup(&mut self, _process: &ProcessHandle) -> Result<()> {
        // Channels arrive already open; nothing to prepare.
        Ok(())
    }

    fn update(&mut self, _process: &ProcessHandle) -> Result<bool> {
        if !self.source.is_open() || !self.dest.is_open() {
            // A channel closed from outside ends the copy; not an error.
            return Ok(true);
        }
        loop {
            match self.drain_pending()? {
                Drain::Done => {}
                Drain::Blocked => return Ok(false),
                Drain::Closed => {
                    self.close_both()?;
                    return Ok(true);
                }
            }
            let mut buf = [0u8; COPY_BUF_SIZE];
            match self.source.try_read(&mut buf) {
                Ok(0) => {
                    trace!(stream = %self.stream, "copy reached end of input");
                    self.close_both()?;
                    return Ok(true);
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(self.transfer_err(e)),
            }
        }
    }

    fn cleanup(&mut self, _process: &ProcessHandle) -> Result<()> {
        self.close_both()
    }
}
