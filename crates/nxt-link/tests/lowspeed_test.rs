//! Low-speed bus exchanges against a scripted loopback device.

use nxt_link::loopback;
use nxt_link::{
    BusError, BusStage, BusState, LowSpeedController, PollConfig, Session, SessionConfig,
};
use nxt_protocol::{
    CommandBody, ErrorCode, LowSpeedRequest, LsRead, LsStatus, Response, ResponseBody,
    SensorPort,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// What the scripted device saw.
#[derive(Debug, Default)]
struct BusLog {
    writes: Vec<(SensorPort, Vec<u8>, u8)>,
    polls: usize,
    reads: usize,
}

/// Start a device whose LsGetStatus replies follow `statuses` (status,
/// bytes_ready), repeating the last entry, and whose LsRead returns `data`.
fn scripted_bus(
    name: &str,
    statuses: Vec<(ErrorCode, u8)>,
    data: Vec<u8>,
) -> (Session, Arc<Mutex<BusLog>>) {
    let (transport, device) = loopback::pair(name);
    let log = Arc::new(Mutex::new(BusLog::default()));
    let device_log = Arc::clone(&log);

    let _device = device.serve(move |command| {
        let mut log = device_log.lock();
        let opcode = command.opcode();
        match command.body() {
            CommandBody::LsWrite {
                port,
                tx_data,
                rx_len,
            } => {
                log.writes.push((*port, tx_data.clone(), *rx_len));
                Some(Response::acknowledged(opcode))
            }
            CommandBody::LsGetStatus { .. } => {
                let (status, ready) = statuses
                    .get(log.polls)
                    .or(statuses.last())
                    .copied()
                    .unwrap_or((ErrorCode::Success, 0));
                log.polls += 1;
                Some(Response::new(
                    opcode,
                    status,
                    ResponseBody::LsStatus(LsStatus {
                        bytes_ready: Some(ready),
                    }),
                ))
            }
            CommandBody::LsRead { .. } => {
                log.reads += 1;
                Some(Response::new(
                    opcode,
                    ErrorCode::Success,
                    ResponseBody::LsRead(LsRead {
                        bytes_read: Some(data.len() as u8),
                        window: data.clone(),
                    }),
                ))
            }
            _ => Some(Response::acknowledged(opcode)),
        }
    });

    let config = SessionConfig {
        reply_timeout_ms: 500,
        read_poll_ms: 10,
        ..SessionConfig::default()
    };
    let session = Session::with_transport(transport, config).expect("session should open");
    (session, log)
}

fn quick_polls(max_polls: u32) -> PollConfig {
    PollConfig {
        max_polls,
        poll_interval_ms: 1,
        deadline_ms: None,
    }
}

#[test]
fn test_write_poll_read_path() {
    let statuses = vec![
        (ErrorCode::Success, 0),
        (ErrorCode::Success, 0),
        (ErrorCode::Success, 1),
    ];
    let (mut session, log) = scripted_bus("bus-basic", statuses, vec![42]);

    let request = LowSpeedRequest::new(SensorPort::S1, 0x02, vec![0x42], 1);
    let mut bus = LowSpeedController::with_config(&mut session, quick_polls(10));
    let data = bus.transact(&request).expect("exchange should succeed");

    assert_eq!(data, vec![42]);
    assert_eq!(bus.polls(), 3);
    assert_eq!(bus.state(), BusState::Idle);

    let log = log.lock();
    assert_eq!(log.writes, vec![(SensorPort::S1, vec![0x02, 0x42], 1)]);
    assert_eq!(log.polls, 3);
    assert_eq!(log.reads, 1);
}

#[test]
fn test_pending_status_keeps_polling() {
    let statuses = vec![
        (ErrorCode::PendingCommunicationTransactionInProgress, 0),
        (ErrorCode::PendingCommunicationTransactionInProgress, 0),
        (ErrorCode::Success, 1),
    ];
    let (mut session, _log) = scripted_bus("bus-pending", statuses, vec![17]);

    let mut bus = LowSpeedController::with_config(&mut session, quick_polls(10));
    let distance = bus
        .read_sonar_distance(SensorPort::S4)
        .expect("pending status is not an error");
    assert_eq!(distance, 17);
    assert_eq!(bus.polls(), 3);
}

#[test]
fn test_device_not_responding() {
    let (mut session, log) = scripted_bus("bus-silent", vec![(ErrorCode::Success, 0)], vec![]);

    let mut bus = LowSpeedController::with_config(&mut session, quick_polls(4));
    let err = bus
        .transact(&LowSpeedRequest::sonar_distance(SensorPort::S2))
        .unwrap_err();

    match err {
        BusError::DeviceNotResponding { port, polls, .. } => {
            assert_eq!(port, SensorPort::S2);
            assert_eq!(polls, 4);
        }
        other => panic!("expected DeviceNotResponding, got {:?}", other),
    }
    assert_eq!(bus.state(), BusState::Polling);
    assert_eq!(log.lock().reads, 0);
}

#[test]
fn test_bus_error_during_poll_is_fatal() {
    let statuses = vec![(ErrorCode::CommunicationBusError, 0)];
    let (mut session, log) = scripted_bus("bus-error", statuses, vec![]);

    let mut bus = LowSpeedController::with_config(&mut session, quick_polls(10));
    let err = bus
        .transact(&LowSpeedRequest::identity(SensorPort::S3))
        .unwrap_err();

    assert!(matches!(
        err,
        BusError::Device {
            stage: BusStage::Poll,
            status: ErrorCode::CommunicationBusError,
            ..
        }
    ));
    assert_eq!(bus.polls(), 1);
    assert_eq!(log.lock().polls, 1);
}

#[test]
fn test_write_only_skips_read() {
    let (mut session, log) = scripted_bus("bus-write-only", vec![(ErrorCode::Success, 0)], vec![]);

    let mut bus = LowSpeedController::with_config(&mut session, quick_polls(10));
    bus.set_sonar_mode(SensorPort::S1, 0x02)
        .expect("command write should succeed");

    let log = log.lock();
    assert_eq!(log.writes[0].1, vec![0x02, 0x41, 0x02]);
    assert_eq!(log.polls, 1);
    assert_eq!(log.reads, 0);
}

#[test]
fn test_identity_read() {
    let block = b"LEGO\0\0\0\0Sonar\0\0\0".to_vec();
    assert_eq!(block.len(), 16);
    let statuses = vec![(ErrorCode::Success, 16)];
    let (mut session, _log) = scripted_bus("bus-identity", statuses, block);

    let mut bus = LowSpeedController::new(&mut session);
    let identity = bus.read_identity(SensorPort::S4).unwrap();
    assert_eq!(identity.manufacturer, "LEGO");
    assert_eq!(identity.sensor_type, "Sonar");
    assert_eq!(bus.polls(), 1);
}

#[test]
fn test_rejected_write() {
    let (transport, device) = loopback::pair("bus-rejected");
    let _device = device.serve(|command| {
        Some(Response::new(
            command.opcode(),
            ErrorCode::SpecifiedChannelOrConnectionIsNotValid,
            ResponseBody::Status,
        ))
    });
    let mut session = Session::with_transport(transport, SessionConfig::default()).unwrap();

    let mut bus = LowSpeedController::new(&mut session);
    let err = bus
        .transact(&LowSpeedRequest::sonar_distance(SensorPort::S1))
        .unwrap_err();
    assert!(matches!(
        err,
        BusError::Device {
            stage: BusStage::Write,
            ..
        }
    ));
    assert_eq!(bus.state(), BusState::Idle);
}
