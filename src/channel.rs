use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::IntoRawFd;

use crate::pipes::StandardStream;
use crate::posix;

/// Source side of a byte channel: something a copy monitor can drain.
///
/// `try_read` follows pipe conventions: `Ok(0)` signals end of input, and
/// `ErrorKind::WouldBlock` means nothing is available right now.  A closed
/// channel reads as end of input.
pub trait ReadChannel: Send {
    fn is_open(&self) -> bool;

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;
}

/// Sink side of a byte channel: something a copy monitor can fill.
///
/// `try_write` may accept fewer bytes than offered and may fail with
/// `ErrorKind::WouldBlock` when the destination is saturated.
pub trait WriteChannel: Send {
    fn is_open(&self) -> bool;

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;
}

/// Adapts any reader into a [`ReadChannel`], adding the open/closed state
/// the channel contract requires.
#[derive(Debug)]
pub struct ByteSource<R>(Option<R>);

impl<R: Read + Send> ByteSource<R> {
    pub fn new(inner: R) -> ByteSource<R> {
        ByteSource(Some(inner))
    }
}

impl<R: Read + Send> ReadChannel for ByteSource<R> {
    fn is_open(&self) -> bool {
        self.0.is_some()
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.0 = None;
        Ok(())
    }
}

/// Adapts any writer into a [`WriteChannel`].  The writer is flushed when
/// the channel is closed.
#[derive(Debug)]
pub struct ByteSink<W>(Option<W>);

impl<W: Write + Send> ByteSink<W> {
    pub fn new(inner: W) -> ByteSink<W> {
        ByteSink(Some(inner))
    }
}

impl<W: Write + Send> WriteChannel for ByteSink<W> {
    fn is_open(&self) -> bool {
        self.0.is_some()
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(inner) => inner.write(buf),
            None => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut inner) = self.0.take() {
            inner.flush()?;
        }
        Ok(())
    }
}

/// Read end of a pipe connected to a child's stdout or stderr.
///
/// The descriptor is non-blocking; the `Read` impl waits for readiness
/// with `poll(2)` so ordinary callers see blocking-stream behavior, while
/// the copy monitor uses [`try_read`](ReadChannel::try_read) and handles
/// `WouldBlock` itself.
pub struct PipeReader {
    file: Option<File>,
    stream: StandardStream,
}

impl PipeReader {
    pub(crate) fn new(file: File, stream: StandardStream) -> PipeReader {
        PipeReader {
            file: Some(file),
            stream,
        }
    }

    /// The standard stream of the child this end is connected to.
    pub fn stream(&self) -> StandardStream {
        self.stream
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.try_read(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let file = self.file.as_ref().expect("open pipe after WouldBlock");
                    posix::poll(&mut [posix::PollFd::new(Some(file), posix::POLLIN)], None)?;
                }
                other => return other,
            }
        }
    }
}

impl ReadChannel for PipeReader {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        close_fd(self.file.take())
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("stream", &self.stream)
            .field("open", &self.file.is_some())
            .finish()
    }
}

/// Write end of a pipe connected to a child's stdin.
///
/// Non-blocking like [`PipeReader`], with the same split between the
/// blocking `Write` impl and [`try_write`](WriteChannel::try_write).
/// Dropping or closing it delivers end-of-input to the child.
pub struct PipeWriter {
    file: Option<File>,
    stream: StandardStream,
}

impl PipeWriter {
    pub(crate) fn new(file: File, stream: StandardStream) -> PipeWriter {
        PipeWriter {
            file: Some(file),
            stream,
        }
    }

    /// The standard stream of the child this end is connected to.
    pub fn stream(&self) -> StandardStream {
        self.stream
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.try_write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let file = self.file.as_ref().expect("open pipe after WouldBlock");
                    posix::poll(&mut [posix::PollFd::new(Some(file), posix::POLLOUT)], None)?;
                }
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl WriteChannel for PipeWriter {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        close_fd(self.file.take())
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter")
            .field("stream", &self.stream)
            .field("open", &self.file.is_some())
            .finish()
    }
}

// Close via the raw descriptor so a failure is observable, unlike Drop.
fn close_fd(file: Option<File>) -> io::Result<()> {
    match file {
        Some(file) => posix::close(file.into_raw_fd()),
        None => Ok(()),
    }
}
