use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use crate::channel::{PipeReader, PipeWriter, ReadChannel, WriteChannel};
use crate::error::{Error, Result};
use crate::monitor::{ChannelCopyMonitor, Monitor};
use crate::posix;
use crate::spawn::FdAction;

/// One of the three standard streams of a child process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StandardStream {
    Input,
    Output,
    Error,
}

impl StandardStream {
    /// The conventional descriptor number of this stream in the child.
    pub fn fd_number(self) -> i32 {
        match self {
            StandardStream::Input => 0,
            StandardStream::Output => 1,
            StandardStream::Error => 2,
        }
    }

    /// True if the parent writes and the child reads, which holds only for
    /// stdin.
    pub fn parent_writes(self) -> bool {
        matches!(self, StandardStream::Input)
    }
}

impl fmt::Display for StandardStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StandardStream::Input => "stdin",
            StandardStream::Output => "stdout",
            StandardStream::Error => "stderr",
        })
    }
}

/// Instruction what to do with one standard stream of the child.
pub enum Redirect {
    /// Connect the stream to the parent through a pipe (the default).  The
    /// parent end is available on the [`ProcessHandle`] once the child is
    /// spawned.
    ///
    /// [`ProcessHandle`]: crate::ProcessHandle
    Pipe,

    /// The child reads the stream from the file at this path.
    Read(PathBuf),

    /// The child writes the stream to the file at this path, creating it
    /// if necessary.  An existing file is written over from the start, not
    /// truncated.
    Write(PathBuf),

    /// Like [`Redirect::Write`], but appending.
    Append(PathBuf),

    /// Feed the stream from an externally supplied channel.  A copy
    /// monitor pumps the channel into the child for as long as the child
    /// runs; the caller keeps no other view of the stream.
    FromChannel(Box<dyn ReadChannel>),

    /// Drain the stream into an externally supplied channel via a copy
    /// monitor.
    ToChannel(Box<dyn WriteChannel>),
}

impl Redirect {
    /// Feed the stream from `channel`.  Only valid for stdin.
    pub fn from_channel(channel: impl ReadChannel + 'static) -> Redirect {
        Redirect::FromChannel(Box::new(channel))
    }

    /// Drain the stream into `channel`.  Only valid for stdout and stderr.
    pub fn to_channel(channel: impl WriteChannel + 'static) -> Redirect {
        Redirect::ToChannel(Box::new(channel))
    }

    pub(crate) fn valid_for(&self, stream: StandardStream) -> bool {
        if stream.parent_writes() {
            matches!(
                self,
                Redirect::Pipe | Redirect::Read(_) | Redirect::FromChannel(_)
            )
        } else {
            matches!(
                self,
                Redirect::Pipe
                    | Redirect::Write(_)
                    | Redirect::Append(_)
                    | Redirect::ToChannel(_)
            )
        }
    }
}

impl Default for Redirect {
    fn default() -> Redirect {
        Redirect::Pipe
    }
}

impl fmt::Debug for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Redirect::Pipe => f.write_str("Pipe"),
            Redirect::Read(path) => f.debug_tuple("Read").field(path).finish(),
            Redirect::Write(path) => f.debug_tuple("Write").field(path).finish(),
            Redirect::Append(path) => f.debug_tuple("Append").field(path).finish(),
            Redirect::FromChannel(_) => f.write_str("FromChannel(..)"),
            Redirect::ToChannel(_) => f.write_str("ToChannel(..)"),
        }
    }
}

/// Parent-side end of a stream produced by a handler: the write end of a
/// stdin pipe, or the read end of a stdout/stderr pipe.
pub(crate) enum StreamEnd {
    Write(PipeWriter),
    Read(PipeReader),
}

/// Per-stream connection strategy, driven in two steps around the spawn:
/// `init` allocates descriptors and describes the actions the child must
/// apply before exec, `after_spawn` releases the child-side resource in
/// the parent and either hands back the parent-side end or registers a
/// monitor bridging it to an external channel.
///
/// A handler owns every descriptor it allocates until it explicitly hands
/// it off; a monitor it registers outlives it.
pub(crate) enum PipeHandler {
    Default(DefaultPipe),
    File(FilePipe),
    ReadableChannel {
        external: Option<Box<dyn ReadChannel>>,
        pipe: DefaultPipe,
    },
    WritableChannel {
        external: Option<Box<dyn WriteChannel>>,
        pipe: DefaultPipe,
    },
}

impl PipeHandler {
    pub(crate) fn from_redirect(redirect: Redirect) -> PipeHandler {
        match redirect {
            Redirect::Pipe => PipeHandler::Default(DefaultPipe::default()),
            Redirect::Read(path) => PipeHandler::File(FilePipe::new(path, FileMode::Read)),
            Redirect::Write(path) => PipeHandler::File(FilePipe::new(path, FileMode::Write)),
            Redirect::Append(path) => PipeHandler::File(FilePipe::new(path, FileMode::Append)),
            Redirect::FromChannel(channel) => PipeHandler::ReadableChannel {
                external: Some(channel),
                pipe: DefaultPipe::default(),
            },
            Redirect::ToChannel(channel) => PipeHandler::WritableChannel {
                external: Some(channel),
                pipe: DefaultPipe::default(),
            },
        }
    }

    pub(crate) fn init(&mut self, stream: StandardStream) -> Result<Vec<FdAction>> {
        match self {
            PipeHandler::Default(pipe)
            | PipeHandler::ReadableChannel { pipe, .. }
            | PipeHandler::WritableChannel { pipe, .. } => pipe.init(stream),
            PipeHandler::File(file) => file.init(stream),
        }
    }

    pub(crate) fn after_spawn(
        &mut self,
        stream: StandardStream,
        monitors: &mut Vec<Box<dyn Monitor>>,
    ) -> Result<Option<StreamEnd>> {
        match self {
            PipeHandler::Default(pipe) => Ok(Some(pipe.after_spawn(stream)?)),
            PipeHandler::File(file) => {
                file.after_spawn();
                Ok(None)
            }
            PipeHandler::ReadableChannel { external, pipe } => {
                let StreamEnd::Write(writer) = pipe.after_spawn(stream)? else {
                    unreachable!("stdin pipe yields the write side");
                };
                let source = external.take().expect("channel handler driven twice");
                monitors.push(Box::new(ChannelCopyMonitor::new(
                    source,
                    Box::new(writer),
                    stream,
                )));
                Ok(None)
            }
            PipeHandler::WritableChannel { external, pipe } => {
                let StreamEnd::Read(reader) = pipe.after_spawn(stream)? else {
                    unreachable!("stdout/stderr pipe yields the read side");
                };
                let sink = external.take().expect("channel handler driven twice");
                monitors.push(Box::new(ChannelCopyMonitor::new(
                    Box::new(reader),
                    sink,
                    stream,
                )));
                Ok(None)
            }
        }
    }
}

// For each stream connected through a pipe we have to: create the pipe,
// duplicate the child's side onto the stream number when spawning, close
// the parent's side in the child, close the child's side in the parent
// after the spawn, and wrap the parent's side as a usable channel.
#[derive(Debug, Default)]
pub(crate) struct DefaultPipe {
    parent: Option<File>,
    child: Option<File>,
}

impl DefaultPipe {
    fn init(&mut self, stream: StandardStream) -> Result<Vec<FdAction>> {
        let (read, write) = posix::pipe().map_err(|source| Error::Setup { stream, source })?;
        let (parent, child) = if stream.parent_writes() {
            (write, read)
        } else {
            (read, write)
        };
        let actions = vec![
            FdAction::Dup {
                fd: child.as_raw_fd(),
                target: stream.fd_number(),
            },
            FdAction::Close {
                fd: parent.as_raw_fd(),
            },
        ];
        self.parent = Some(parent);
        self.child = Some(child);
        Ok(actions)
    }

    fn after_spawn(&mut self, stream: StandardStream) -> Result<StreamEnd> {
        // Dropping the File closes the parent's copy of the child-side end.
        drop(self.child.take());
        let parent = self.parent.take().expect("init not called");
        posix::set_nonblocking(&parent).map_err(|source| Error::Setup { stream, source })?;
        Ok(if stream.parent_writes() {
            StreamEnd::Write(PipeWriter::new(parent, stream))
        } else {
            StreamEnd::Read(PipeReader::new(parent, stream))
        })
    }
}

#[derive(Debug)]
enum FileMode {
    Read,
    Write,
    Append,
}

#[derive(Debug)]
pub(crate) struct FilePipe {
    path: PathBuf,
    mode: FileMode,
    file: Option<File>,
}

impl FilePipe {
    fn new(path: PathBuf, mode: FileMode) -> FilePipe {
        FilePipe {
            path,
            mode,
            file: None,
        }
    }

    fn init(&mut self, stream: StandardStream) -> Result<Vec<FdAction>> {
        let mut options = OpenOptions::new();
        match self.mode {
            FileMode::Read => options.read(true),
            FileMode::Write => options.write(true).create(true),
            FileMode::Append => options.append(true).create(true),
        };
        let file = options.open(&self.path).map_err(|source| Error::OpenFile {
            path: self.path.clone(),
            source,
        })?;
        let action = FdAction::Dup {
            fd: file.as_raw_fd(),
            target: stream.fd_number(),
        };
        self.file = Some(file);
        Ok(vec![action])
    }

    fn after_spawn(&mut self) {
        // The child sees the file through the dup action; the parent has
        // no further use for the descriptor.
        drop(self.file.take());
    }
}
