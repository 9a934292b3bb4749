use crate::ExitStatus;

#[test]
fn normal_exit_takes_code_from_bits_8_to_15() {
    assert_eq!(ExitStatus::from_wait_status(0x0000), ExitStatus::Exited(0));
    assert_eq!(ExitStatus::from_wait_status(0x0D00), ExitStatus::Exited(13));
    assert_eq!(ExitStatus::from_wait_status(0x7F00), ExitStatus::Exited(127));
    assert_eq!(ExitStatus::from_wait_status(0xFF00), ExitStatus::Exited(255));
}

#[test]
fn signal_termination_sets_bit_7() {
    // SIGKILL
    assert_eq!(ExitStatus::from_wait_status(0x0009), ExitStatus::Signaled(0x89));
    // SIGTERM
    assert_eq!(ExitStatus::from_wait_status(0x000F), ExitStatus::Signaled(0x8F));
    // SIGSEGV with the core-dump bit already set in the status word
    assert_eq!(ExitStatus::from_wait_status(0x008B), ExitStatus::Signaled(0x8B));
}

#[test]
fn signal_termination_is_flagged() {
    let status = ExitStatus::from_wait_status(0x000F);
    assert_eq!(status.code(), Some(143));
    assert_eq!(status.signal(), Some(15));
    assert!(!status.success());

    let status = ExitStatus::from_wait_status(0x0D00);
    assert_eq!(status.code(), Some(13));
    assert_eq!(status.signal(), None);
}

#[test]
fn success_means_exit_code_zero() {
    assert!(ExitStatus::Exited(0).success());
    assert!(!ExitStatus::Exited(1).success());
    assert!(!ExitStatus::Signaled(0x89).success());
    assert!(!ExitStatus::Undetermined.success());
}

#[test]
fn undetermined_has_no_code() {
    assert_eq!(ExitStatus::Undetermined.code(), None);
    assert_eq!(ExitStatus::Undetermined.signal(), None);
}
