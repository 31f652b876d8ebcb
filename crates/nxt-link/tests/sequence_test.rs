//! Command sequence replay against a scripted loopback device.

use nxt_link::loopback;
use nxt_link::{
    CommandOutcome, CommandSequence, ConnectionError, ExecuteError, SequenceRunner, Session,
    SessionConfig,
};
use nxt_protocol::{BatteryLevel, Command, ErrorCode, OpCode, Response, ResponseBody, SensorPort};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Device that fails GetInputValues and answers everything else.
fn open_device(name: &str, calls: Arc<AtomicUsize>) -> Session {
    let (transport, device) = loopback::pair(name);
    let _device = device.serve(move |command| {
        calls.fetch_add(1, Ordering::SeqCst);
        let opcode = command.opcode();
        Some(match opcode {
            OpCode::GetBatteryLevel => Response::new(
                opcode,
                ErrorCode::Success,
                ResponseBody::BatteryLevel(BatteryLevel {
                    millivolts: Some(7400),
                }),
            ),
            OpCode::GetInputValues => {
                Response::new(opcode, ErrorCode::BadInputOrOutputSpecified, ResponseBody::Status)
            }
            _ => Response::acknowledged(opcode),
        })
    });

    let config = SessionConfig {
        reply_timeout_ms: 500,
        read_poll_ms: 10,
        ..SessionConfig::default()
    };
    Session::with_transport(transport, config).expect("session should open")
}

fn mixed_commands() -> Vec<Command> {
    vec![
        Command::battery_level(),
        Command::input_values(SensorPort::S1),
        Command::keep_alive(),
    ]
}

#[test]
fn test_failure_aborts_rest_of_cycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-abort", Arc::clone(&calls));
    let mut runner = SequenceRunner::new(CommandSequence::new(mixed_commands()));

    let report = runner.run_once(&mut session).expect("cycle should run");
    assert!(report.aborted);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failures(), 1);
    match &report.outcomes[1] {
        CommandOutcome::Failed {
            index,
            opcode,
            status,
            ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(*opcode, OpCode::GetInputValues);
            assert_eq!(*status, Some(ErrorCode::BadInputOrOutputSpecified));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_continue_on_error_runs_every_command() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-continue", Arc::clone(&calls));
    let sequence = CommandSequence::new(mixed_commands()).with_continue_on_error(true);
    let mut runner = SequenceRunner::new(sequence);

    let report = runner.run_once(&mut session).unwrap();
    assert!(!report.aborted);
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[2].is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_one_shot_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-once", Arc::clone(&calls));
    let mut runner = SequenceRunner::new(CommandSequence::new(vec![Command::battery_level()]));
    let stop = AtomicBool::new(false);

    let mut reports = Vec::new();
    let cycles = runner
        .run(&mut session, Some(10), &stop, |report| reports.push(report.clone()))
        .unwrap();

    assert_eq!(cycles, 1);
    assert_eq!(reports.len(), 1);
    assert_eq!(runner.average_polling_ms(), None);
}

#[test]
fn test_zero_cycle_limit_sends_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-zero", Arc::clone(&calls));
    let sequence = CommandSequence::new(vec![Command::keep_alive()]).with_poll_interval_ms(20);
    let mut runner = SequenceRunner::new(sequence);
    let stop = AtomicBool::new(false);

    let mut reports = 0;
    let cycles = runner
        .run(&mut session, Some(0), &stop, |_| reports += 1)
        .unwrap();

    assert_eq!(cycles, 0);
    assert_eq!(reports, 0);
    assert_eq!(runner.cycles(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn test_periodic_run_tracks_average_period() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-periodic", Arc::clone(&calls));
    let sequence = CommandSequence::new(vec![Command::keep_alive()]).with_poll_interval_ms(20);
    let mut runner = SequenceRunner::new(sequence);
    let stop = AtomicBool::new(false);

    let cycles = runner.run(&mut session, Some(4), &stop, |_| {}).unwrap();

    assert_eq!(cycles, 4);
    assert_eq!(runner.cycles(), 4);
    let average = runner.average_polling_ms().expect("average after several cycles");
    assert!(average >= 19.0, "average period {} below interval", average);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_stop_flag_ends_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = open_device("seq-stop", Arc::clone(&calls));
    let sequence = CommandSequence::new(vec![Command::keep_alive()]).with_poll_interval_ms(5);
    let mut runner = SequenceRunner::new(sequence);
    let stop = AtomicBool::new(false);

    let cycles = runner
        .run(&mut session, None, &stop, |report| {
            if report.index == 2 {
                stop.store(true, Ordering::Release);
            }
        })
        .unwrap();
    assert_eq!(cycles, 3);
}

#[test]
fn test_broken_session_stops_run() {
    let (transport, device) = loopback::pair("seq-broken");
    // Every reply echoes the wrong opcode.
    let _device = device.serve(|_| Some(Response::acknowledged(OpCode::StopProgram)));
    let mut session = Session::with_transport(transport, SessionConfig::default()).unwrap();

    let sequence = CommandSequence::new(vec![Command::battery_level(), Command::keep_alive()])
        .with_continue_on_error(true)
        .with_poll_interval_ms(10);
    let mut runner = SequenceRunner::new(sequence);
    let stop = AtomicBool::new(false);

    let err = runner.run(&mut session, Some(3), &stop, |_| {}).unwrap_err();
    assert_eq!(err.cycle, 0);
    assert_eq!(err.index, 0);
    assert_eq!(err.opcode, OpCode::GetBatteryLevel);
    assert!(err.source.is_fatal());

    let err = runner.run_once(&mut session).unwrap_err();
    assert!(matches!(
        err.source,
        ExecuteError::Connection(ConnectionError::NotConnected { .. })
    ));
}
