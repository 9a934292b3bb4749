mod launch;
mod monitor;
mod status;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::{Error, ExitStatus, ProcessFuture, ProcessHandle};

/// An observable in-memory sink shared between a test and a channel
/// redirect.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<ProcessHandle>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<ProcessFuture>();
    assert_send_sync::<Error>();
}
