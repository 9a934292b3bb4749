use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};

use super::SharedBuf;
use crate::channel::{ByteSink, ByteSource, ReadChannel, WriteChannel};
use crate::handle::StreamEndpoints;
use crate::monitor::{ChannelCopyMonitor, Monitor};
use crate::{Error, ProcessHandle, StandardStream};

// The copy monitor never consults the process; our own pid will do.
fn dummy_handle() -> ProcessHandle {
    ProcessHandle::new(std::process::id(), StreamEndpoints::default())
}

fn copy_monitor(
    source: impl ReadChannel + 'static,
    dest: impl WriteChannel + 'static,
) -> ChannelCopyMonitor {
    ChannelCopyMonitor::new(Box::new(source), Box::new(dest), StandardStream::Output)
}

#[test]
fn copies_all_bytes_and_reports_finished() {
    let buf = SharedBuf::default();
    let mut monitor = copy_monitor(
        ByteSource::new(Cursor::new(b"hello world".to_vec())),
        ByteSink::new(buf.clone()),
    );
    let handle = dummy_handle();
    monitor.setup(&handle).unwrap();
    assert!(monitor.update(&handle).unwrap());
    assert_eq!(buf.contents(), b"hello world");
    monitor.cleanup(&handle).unwrap();
}

#[test]
fn transfers_longer_than_one_buffer() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let buf = SharedBuf::default();
    let mut monitor = copy_monitor(
        ByteSource::new(Cursor::new(data.clone())),
        ByteSink::new(buf.clone()),
    );
    let handle = dummy_handle();
    assert!(monitor.update(&handle).unwrap());
    assert_eq!(buf.contents(), data);
}

#[test]
fn closed_source_finishes_immediately_without_error() {
    let buf = SharedBuf::default();
    let mut source = ByteSource::new(Cursor::new(b"never seen".to_vec()));
    source.close().unwrap();
    let mut monitor = copy_monitor(source, ByteSink::new(buf.clone()));
    let handle = dummy_handle();
    assert!(monitor.update(&handle).unwrap());
    assert!(buf.contents().is_empty());
    monitor.cleanup(&handle).unwrap();
}

// Yields WouldBlock once, then end of input.
struct StallingSource {
    stalled: bool,
}

impl ReadChannel for StallingSource {
    fn is_open(&self) -> bool {
        true
    }

    fn try_read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        if !self.stalled {
            self.stalled = true;
            Err(io::ErrorKind::WouldBlock.into())
        } else {
            Ok(0)
        }
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn pauses_the_tick_when_the_source_has_nothing_yet() {
    let buf = SharedBuf::default();
    let mut monitor = copy_monitor(StallingSource { stalled: false }, ByteSink::new(buf));
    let handle = dummy_handle();
    assert!(!monitor.update(&handle).unwrap());
    assert!(monitor.update(&handle).unwrap());
}

// Refuses the first write, accepts everything afterwards.
#[derive(Clone, Default)]
struct ChokeOnceSink(Arc<Mutex<(bool, Vec<u8>)>>);

impl WriteChannel for ChokeOnceSink {
    fn is_open(&self) -> bool {
        true
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        if !state.0 {
            state.0 = true;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        state.1.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn keeps_pending_bytes_while_the_sink_is_saturated() {
    let sink = ChokeOnceSink::default();
    let mut monitor = copy_monitor(
        ByteSource::new(Cursor::new(b"abc".to_vec())),
        sink.clone(),
    );
    let handle = dummy_handle();
    // First tick reads the data but the sink refuses it.
    assert!(!monitor.update(&handle).unwrap());
    assert!(sink.0.lock().unwrap().1.is_empty());
    // Second tick flushes the carried-over bytes and sees end of input.
    assert!(monitor.update(&handle).unwrap());
    assert_eq!(sink.0.lock().unwrap().1, b"abc");
}

struct FailingSource;

impl ReadChannel for FailingSource {
    fn is_open(&self) -> bool {
        true
    }

    fn try_read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device gone"))
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn read_failure_is_fatal_and_names_the_stream() {
    let mut monitor = copy_monitor(FailingSource, ByteSink::new(SharedBuf::default()));
    let handle = dummy_handle();
    match monitor.update(&handle) {
        Err(Error::Transfer { stream, .. }) => assert_eq!(stream, StandardStream::Output),
        other => panic!("expected transfer error, got {:?}", other),
    }
}
