use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::pipes::StandardStream;

/// Errors produced while launching or supervising a child process.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A file redirect target could not be opened.  Raised before the
    /// child is spawned; the launch is abandoned.
    #[error("failed to open {}: {}", .path.display(), .source)]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating or configuring a pipe for the given stream failed.
    #[error("failed to set up {stream}: {source}")]
    Setup {
        stream: StandardStream,
        #[source]
        source: io::Error,
    },

    /// The fork/exec of the command failed.
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Copying bytes for the given stream failed.  Transfer failures are
    /// fatal to the launch and are not retried.
    #[error("byte transfer failed on {stream}: {source}")]
    Transfer {
        stream: StandardStream,
        #[source]
        source: io::Error,
    },

    /// Releasing a channel for the given stream failed.
    #[error("failed to release {stream}: {source}")]
    Cleanup {
        stream: StandardStream,
        #[source]
        source: io::Error,
    },

    /// A bounded wait elapsed without the awaited value appearing.  The
    /// underlying operation keeps running; the timeout only bounds the
    /// wait.
    #[error("timed out waiting for the process")]
    Timeout,

    /// A wait was interrupted by a signal.
    #[error("interrupted while waiting for the process")]
    Interrupted(#[source] io::Error),

    /// The exit value was queried before the process exited.
    #[error("process has not exited")]
    StillRunning,

    /// The launch itself failed; re-raised by every read of the launch
    /// future, as opposed to a failure of the wait.
    #[error("process launch failed")]
    Execution(#[source] Arc<Error>),

    /// Any other operating system error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
