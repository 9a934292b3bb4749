use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::thread;
use std::time::Duration;

use super::SharedBuf;
use crate::{ByteSink, ByteSource, Error, ExitStatus, Launch, Redirect};

fn read_whole_file<T: Read>(mut f: T) -> String {
    let mut content = String::new();
    f.read_to_string(&mut content).unwrap();
    content
}

#[test]
fn captures_echo_output_through_the_default_pipe() {
    let call = Launch::cmd("echo").arg("hello").create(|p| p.exit_value());
    let future = call.future();
    let status = call.call().unwrap().unwrap();
    assert_eq!(status, ExitStatus::Exited(0));
    let process = future.get().unwrap();
    assert_eq!(read_whole_file(process.take_stdout().unwrap()), "hello\n");
}

#[test]
fn missing_command_fails_without_running_the_completion() {
    let call = Launch::cmd("prochelp-no-such-command").create(|_| -> () {
        panic!("completion must not run for a failed launch")
    });
    let future = call.future();
    match call.call() {
        Err(Error::Execution(cause)) => assert!(matches!(*cause, Error::Spawn { .. })),
        other => panic!("expected spawn failure, got {:?}", other),
    }
    // the recorded failure re-surfaces on the future as well
    assert!(matches!(future.get(), Err(Error::Execution(..))));
}

#[test]
fn reports_nonzero_exit_codes() {
    let status = Launch::shell("exit 13")
        .create(|p| p.exit_value())
        .call()
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Exited(13));
}

#[test]
fn self_inflicted_signal_reports_shell_style_code() {
    let status = Launch::shell("kill -9 $$")
        .create(|p| p.exit_value())
        .call()
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Signaled(137));
    assert_eq!(status.signal(), Some(9));
}

#[test]
fn write_redirect_creates_the_file() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("out");
    let status = Launch::cmd("echo")
        .arg("to file")
        .stdout(Redirect::Write(path.clone()))
        .create(|p| p.exit_value())
        .call()
        .unwrap()
        .unwrap();
    assert!(status.success());
    assert_eq!(read_whole_file(File::open(&path).unwrap()), "to file\n");
}

#[test]
fn append_redirect_accumulates_across_runs() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("log");
    for _ in 0..2 {
        let status = Launch::cmd("echo")
            .arg("run")
            .stdout(Redirect::Append(path.clone()))
            .create(|p| p.exit_value())
            .call()
            .unwrap()
            .unwrap();
        assert!(status.success());
    }
    assert_eq!(read_whole_file(File::open(&path).unwrap()), "run\nrun\n");
}

#[test]
fn read_redirect_feeds_stdin_from_a_file() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("input");
    File::create(&path)
        .unwrap()
        .write_all(b"from a file")
        .unwrap();
    let call = Launch::cmd("cat")
        .stdin(Redirect::Read(path))
        .create(|p| p.exit_value());
    let future = call.future();
    assert!(call.call().unwrap().unwrap().success());
    let process = future.get().unwrap();
    assert_eq!(read_whole_file(process.take_stdout().unwrap()), "from a file");
}

#[test]
fn open_failure_aborts_before_spawning() {
    let call = Launch::cmd("cat")
        .stdin(Redirect::Read("/definitely/not/a/real/path".into()))
        .create(|_| -> () { panic!("completion must not run") });
    match call.call() {
        Err(Error::Execution(cause)) => assert!(matches!(*cause, Error::OpenFile { .. })),
        other => panic!("expected open failure, got {:?}", other),
    }
}

#[test]
fn external_sink_observes_every_byte_the_child_writes() {
    let buf = SharedBuf::default();
    let status = Launch::shell("printf abc; sleep 0.2; printf def")
        .stdout(Redirect::to_channel(ByteSink::new(buf.clone())))
        .create(|p| p.exit_value())
        .call()
        .unwrap()
        .unwrap();
    assert!(status.success());
    assert_eq!(buf.contents(), b"abcdef");
}

#[test]
fn external_source_feeds_stdin_through_the_bridge() {
    let buf = SharedBuf::default();
    let status = Launch::cmd("cat")
        .stdin(Redirect::from_channel(ByteSource::new(Cursor::new(
            b"pumped through".to_vec(),
        ))))
        .stdout(Redirect::to_channel(ByteSink::new(buf.clone())))
        .create(|p| p.exit_value())
        .call()
        .unwrap()
        .unwrap();
    assert!(status.success());
    assert_eq!(buf.contents(), b"pumped through");
}

#[test]
fn env_overrides_reach_the_child() {
    let call = Launch::shell("printf %s \"$PROCHELP_TEST_VAR\"")
        .env("PROCHELP_TEST_VAR", "xyzzy")
        .create(|p| p.exit_value());
    let future = call.future();
    assert!(call.call().unwrap().unwrap().success());
    let process = future.get().unwrap();
    assert_eq!(read_whole_file(process.take_stdout().unwrap()), "xyzzy");
}

#[test]
fn future_resolves_while_the_call_is_still_running() {
    let call = Launch::cmd("sleep").arg("0.3").create(|p| p.exit_value());
    let future = call.future();
    let watcher = thread::spawn(move || {
        let process = future.get().unwrap();
        assert!(process.is_alive().unwrap());
        assert!(matches!(process.exit_value(), Err(Error::StillRunning)));
        process.pid()
    });
    let status = call.call().unwrap().unwrap();
    assert!(status.success());
    assert!(watcher.join().unwrap() > 0);
}

#[test]
fn wait_timeout_returns_none_while_running() {
    let call = Launch::cmd("sleep").arg("0.5").create(|p| p.exit_value());
    let future = call.future();
    let runner = thread::spawn(move || call.call());
    let process = future.get().unwrap();
    assert_eq!(
        process.wait_timeout(Duration::from_millis(100)).unwrap(),
        None
    );
    assert_eq!(process.wait().unwrap(), ExitStatus::Exited(0));
    assert!(runner.join().unwrap().unwrap().unwrap().success());
}

#[test]
fn terminate_blocks_until_the_child_is_gone() {
    let call = Launch::cmd("sleep").arg("10").create(|p| p.exit_value());
    let future = call.future();
    let runner = thread::spawn(move || call.call());
    let process = future.get().unwrap();
    let status = process.terminate().unwrap();
    assert_eq!(status, ExitStatus::Signaled(143));
    assert_eq!(status.signal(), Some(15));
    // the invoker observes the same cached status
    assert_eq!(
        runner.join().unwrap().unwrap().unwrap(),
        ExitStatus::Signaled(143)
    );
}

#[test]
fn writing_to_a_piped_stdin() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("copy");
    let call = Launch::cmd("cat")
        .stdout(Redirect::Write(path.clone()))
        .create(|p| p.exit_value());
    let future = call.future();
    let runner = thread::spawn(move || call.call());
    let process = future.get().unwrap();
    let mut stdin = process.take_stdin().unwrap();
    stdin.write_all(b"fed by hand").unwrap();
    // closing stdin delivers EOF and lets cat exit
    drop(stdin);
    assert!(runner.join().unwrap().unwrap().unwrap().success());
    assert_eq!(read_whole_file(File::open(&path).unwrap()), "fed by hand");
}

#[test]
#[should_panic(expected = "not valid for stdin")]
fn rejects_output_redirects_for_stdin() {
    let _ = Launch::cmd("cat").stdin(Redirect::Write("/tmp/x".into()));
}

#[test]
#[should_panic(expected = "not valid for stdout")]
fn rejects_input_redirects_for_stdout() {
    let _ = Launch::cmd("cat").stdout(Redirect::Read("/tmp/x".into()));
}

#[test]
fn get_timeout_on_the_future_is_bounded() {
    // The future of a call that is never run stays unresolved.
    let call = Launch::cmd("true").create(|p| p.exit_value());
    let future = call.future();
    match future.get_timeout(Duration::from_millis(50)) {
        Err(Error::Timeout) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    drop(call);
}
