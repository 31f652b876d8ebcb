//! Session behavior against a scripted loopback device.

use nxt_link::loopback;
use nxt_link::{
    ConnectionError, ExecuteError, Session, SessionConfig, SessionState, TransportError,
};
use nxt_protocol::{
    BatteryLevel, Command, ErrorCode, FrameCodec, OpCode, ProtocolError, Response, ResponseBody,
};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Helper to build a session config with a short reply timeout.
fn fast_config(timeout_ms: u64) -> SessionConfig {
    SessionConfig {
        reply_timeout_ms: timeout_ms,
        read_poll_ms: 10,
        ..SessionConfig::default()
    }
}

fn battery_reply(millivolts: u16) -> Response {
    Response::new(
        OpCode::GetBatteryLevel,
        ErrorCode::Success,
        ResponseBody::BatteryLevel(BatteryLevel {
            millivolts: Some(millivolts),
        }),
    )
}

// ============================================================================
// Request/Reply
// ============================================================================

#[test]
fn test_battery_level_round_trip() {
    let (transport, device) = loopback::pair("session-battery");
    let _device = device.serve(|command| match command.opcode() {
        OpCode::GetBatteryLevel => Some(battery_reply(5096)),
        other => Some(Response::acknowledged(other)),
    });

    let mut session =
        Session::with_transport(transport, fast_config(500)).expect("session should open");
    let response = session
        .execute(&Command::battery_level())
        .expect("battery level should succeed");

    assert_eq!(response.status, ErrorCode::Success);
    assert!(response.received_at.is_some());
    match response.body {
        ResponseBody::BatteryLevel(level) => {
            assert_eq!(level.millivolts, Some(5096));
            assert_eq!(level.volts(), Some(5.096));
        }
        other => panic!("unexpected body {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_device_status_is_returned_not_raised() {
    let (transport, device) = loopback::pair("session-status");
    let _device = device.serve(|command| {
        Some(Response::new(
            command.opcode(),
            ErrorCode::NoActiveProgram,
            ResponseBody::Status,
        ))
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    let command = Command::current_program_name();

    let response = session.execute(&command).unwrap();
    assert_eq!(response.status, ErrorCode::NoActiveProgram);
    assert_eq!(response.program_name(), None);

    let err = session.execute_checked(&command).unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Device {
            opcode: OpCode::GetCurrentProgramName,
            status: ErrorCode::NoActiveProgram,
        }
    ));
}

#[test]
fn test_no_reply_command_returns_immediately() {
    let (transport, device) = loopback::pair("session-no-reply");
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let _device = device.serve(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });

    let mut session = Session::with_transport(transport, fast_config(2000)).unwrap();
    let started = Instant::now();
    let response = session.execute(&Command::play_tone(440, 100)).unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(response.opcode, OpCode::PlayTone);
    assert!(response.is_success());
    assert!(response.received_at.is_none());
    assert_eq!(session.state(), SessionState::Idle);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
#[serial]
fn test_timeout_leaves_session_reusable() {
    let (transport, device) = loopback::pair("session-timeout");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _device = device.serve(move |command| {
        // Stay silent for the first command only.
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            None
        } else {
            Some(Response::acknowledged(command.opcode()))
        }
    });

    let mut session = Session::with_transport(transport, fast_config(100)).unwrap();
    let err = session.execute(&Command::keep_alive()).unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Transport(TransportError::TimedOut {
            opcode: OpCode::KeepAlive,
            ..
        })
    ));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Failed);

    let response = session
        .execute(&Command::keep_alive())
        .expect("session should be reusable after a timeout");
    assert!(response.is_success());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_opcode_mismatch_breaks_session() {
    let (transport, device) = loopback::pair("session-mismatch");
    // Answer every command as if it were GetBatteryLevel.
    let _device = device.serve(|_| Some(battery_reply(7000)));

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    let err = session.execute(&Command::keep_alive()).unwrap_err();
    match err {
        ExecuteError::Transport(TransportError::ProtocolViolation { opcode, source }) => {
            assert_eq!(opcode, OpCode::KeepAlive);
            assert!(matches!(source, ProtocolError::MalformedResponse { .. }));
        }
        other => panic!("expected protocol violation, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Broken);

    let err = session.execute(&Command::battery_level()).unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Connection(ConnectionError::NotConnected { .. })
    ));
}

#[test]
fn test_oversized_frame_breaks_session() {
    let (transport, device) = loopback::pair("session-desync");
    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();

    let responder = std::thread::spawn(move || {
        let mut device = device;
        let command = device.recv_command(Duration::from_secs(2));
        assert!(command.is_some());
        // Length prefix of 0x1302 cannot be a frame.
        device.send_raw(&[0x02, 0x13, 0x02, 0x0B, 0x00]).unwrap();
        device
    });

    let err = session.execute(&Command::battery_level()).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        ExecuteError::Transport(TransportError::ProtocolViolation {
            source: ProtocolError::FrameTooLong { .. },
            ..
        })
    ));
    let _device = responder.join().unwrap();
}

#[test]
fn test_busy_when_output_pending() {
    let (transport, device) = loopback::pair("session-busy");
    device.set_pending_output(12);
    let mut session = Session::with_transport(transport, fast_config(100)).unwrap();

    let err = session.execute(&Command::battery_level()).unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Transport(TransportError::Busy {
            opcode: OpCode::GetBatteryLevel
        })
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_stale_reply_is_discarded() {
    let (transport, device) = loopback::pair("session-stale");
    // A reply nobody asked for is already waiting.
    device
        .reply(&Response::acknowledged(OpCode::KeepAlive))
        .unwrap();
    let _device = device.serve(|command| match command.opcode() {
        OpCode::GetBatteryLevel => Some(battery_reply(6200)),
        other => Some(Response::acknowledged(other)),
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    // Give the reader thread time to queue the stale frame.
    std::thread::sleep(Duration::from_millis(50));

    let response = session.execute(&Command::battery_level()).unwrap();
    assert_eq!(response.opcode, OpCode::GetBatteryLevel);
}

#[test]
#[serial]
fn test_stale_and_partial_frames_are_discarded() {
    let (transport, device) = loopback::pair("session-stale-partial");
    let payload = Response::acknowledged(OpCode::KeepAlive).encode().unwrap();
    let stale = FrameCodec::encode(&payload).unwrap();
    // One whole unsolicited reply, then the first bytes of another.
    device.send_raw(&stale).unwrap();
    device.send_raw(&stale[..3]).unwrap();
    let _device = device.serve(|command| match command.opcode() {
        OpCode::GetBatteryLevel => Some(battery_reply(6400)),
        other => Some(Response::acknowledged(other)),
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let response = session.execute(&Command::battery_level()).unwrap();
    assert_eq!(response.opcode, OpCode::GetBatteryLevel);
    assert_eq!(
        response.body,
        ResponseBody::BatteryLevel(BatteryLevel {
            millivolts: Some(6400)
        })
    );
    assert_eq!(session.state(), SessionState::Idle);

    // Nothing left over for the next exchange either.
    let response = session.execute(&Command::keep_alive()).unwrap();
    assert_eq!(response.opcode, OpCode::KeepAlive);
}

#[test]
fn test_second_open_of_same_port_fails() {
    let (first, _first_device) = loopback::pair("session-shared");
    let (second, _second_device) = loopback::pair("session-shared");

    let session = Session::with_transport(first, SessionConfig::default()).unwrap();
    let err = Session::with_transport(second, SessionConfig::default()).unwrap_err();
    assert!(matches!(err, ConnectionError::AlreadyOpen { ref port } if port == "session-shared"));

    session.close();
    let (third, _third_device) = loopback::pair("session-shared");
    assert!(Session::with_transport(third, SessionConfig::default()).is_ok());
}

#[test]
fn test_device_hangup_is_io_error() {
    let (transport, device) = loopback::pair("session-hangup");
    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    drop(device);

    let err = session.execute(&Command::battery_level()).unwrap_err();
    assert!(matches!(err, ExecuteError::Transport(TransportError::Io { .. })));
    assert_eq!(session.state(), SessionState::Broken);
}

// ============================================================================
// Retries
// ============================================================================

#[test]
fn test_retries_on_transient_status() {
    let (transport, device) = loopback::pair("session-retry");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _device = device.serve(move |command| {
        let status = if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            ErrorCode::SpecifiedChannelOrConnectionIsNotConfiguredOrBusy
        } else {
            ErrorCode::Success
        };
        Some(Response::new(command.opcode(), status, ResponseBody::Status))
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    let command = Command::play_tone(880, 50).with_try_count(3);
    assert!(command.wants_response());

    let response = session.execute_with_retries(&command).unwrap();
    assert!(response.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_retries_stop_at_try_count() {
    let (transport, device) = loopback::pair("session-retry-limit");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _device = device.serve(move |command| {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(Response::new(
            command.opcode(),
            ErrorCode::FileIsBusy,
            ResponseBody::Status,
        ))
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    let command = Command::play_tone(880, 50).with_try_count(2);
    let err = session.execute_with_retries(&command).unwrap_err();

    assert_eq!(err.status(), Some(ErrorCode::FileIsBusy));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_single_try_does_not_retry() {
    let (transport, device) = loopback::pair("session-no-retry");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _device = device.serve(move |command| {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(Response::new(
            command.opcode(),
            ErrorCode::PendingCommunicationTransactionInProgress,
            ResponseBody::Status,
        ))
    });

    let mut session = Session::with_transport(transport, fast_config(500)).unwrap();
    let err = session
        .execute_with_retries(&Command::battery_level())
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
