//! Write-poll-read exchanges with devices on the low-speed (I2C) bus.
//!
//! ```text
//! Idle -> Written -> Polling -> Ready -> Read -> Idle
//! ```
//!
//! The brick forwards the LsWrite bytes to the device, then reports through
//! LsGetStatus how many answer bytes it has collected. Status 0x20 while
//! polling means the bus transaction is still running.

use crate::error::{BusError, BusStage};
use crate::session::Session;
use nxt_metrics::{metric_defs, LinkLabels};
use nxt_protocol::{
    Command, ErrorCode, LowSpeedRequest, Response, ResponseBody, SensorIdentity, SensorPort,
    SONAR_REG_COMMAND_STATE,
};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Bound on the status polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Status polls before giving up.
    pub max_polls: u32,
    /// Pause between polls.
    pub poll_interval_ms: u64,
    /// Optional wall-clock limit on polling.
    pub deadline_ms: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_polls: 10,
            poll_interval_ms: 10,
            deadline_ms: None,
        }
    }
}

impl PollConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Progress of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BusState {
    Idle,
    /// LsWrite accepted.
    Written,
    /// Waiting for the device to produce data.
    Polling,
    /// Enough bytes are buffered on the brick.
    Ready,
    /// LsRead answered.
    Read,
}

/// Drives low-speed exchanges over a borrowed session.
///
/// After a failure [`state`](Self::state) and [`polls`](Self::polls) still
/// describe where the exchange stopped; the next call starts over.
pub struct LowSpeedController<'a> {
    session: &'a mut Session,
    config: PollConfig,
    state: BusState,
    polls: u32,
}

impl<'a> LowSpeedController<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        LowSpeedController::with_config(session, PollConfig::default())
    }

    pub fn with_config(session: &'a mut Session, config: PollConfig) -> Self {
        LowSpeedController {
            session,
            config,
            state: BusState::Idle,
            polls: 0,
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    /// Status polls issued by the current or last exchange.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Run one exchange and return the bytes the device answered with.
    ///
    /// With `rx_len == 0` the controller waits for the bus to go idle and
    /// skips the read.
    pub fn transact(&mut self, request: &LowSpeedRequest) -> Result<Vec<u8>, BusError> {
        self.state = BusState::Idle;
        self.polls = 0;

        let labels = LinkLabels::new(self.session.port().to_string());
        let result = self.run(request);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(BusError::DeviceNotResponding { .. }) => "not_responding",
            Err(BusError::Device { .. }) => "device_error",
            Err(_) => "failed",
        };
        metrics::counter!(
            metric_defs::LOWSPEED_TRANSACTIONS.name,
            &labels.with(&[("outcome", outcome.to_string())])
        )
        .increment(1);
        result
    }

    fn run(&mut self, request: &LowSpeedRequest) -> Result<Vec<u8>, BusError> {
        let port = request.port;
        debug!(
            port = %port,
            tx = %hex::encode(request.tx_bytes()),
            rx_len = request.rx_len,
            "low-speed exchange"
        );

        let written = self.session.execute(&request.to_command())?;
        expect_success(&written, port, BusStage::Write)?;
        self.state = BusState::Written;

        self.wait_ready(port, request.rx_len)?;
        self.state = BusState::Ready;

        if request.rx_len == 0 {
            self.state = BusState::Idle;
            return Ok(Vec::new());
        }

        let read = self.session.execute(&Command::ls_read(port))?;
        expect_success(&read, port, BusStage::Read)?;
        self.state = BusState::Read;

        let data = match read.body {
            ResponseBody::LsRead(ls) => ls.data().to_vec(),
            _ => Vec::new(),
        };
        if data.len() < request.rx_len as usize {
            return Err(BusError::ShortRead {
                port,
                expected: request.rx_len,
                actual: data.len() as u8,
            });
        }
        trace!(port = %port, rx = %hex::encode(&data), "low-speed data");

        self.state = BusState::Idle;
        Ok(data)
    }

    fn wait_ready(&mut self, port: SensorPort, rx_len: u8) -> Result<(), BusError> {
        self.state = BusState::Polling;
        let started = Instant::now();
        let status = Command::ls_status(port);

        loop {
            let elapsed = started.elapsed();
            let past_deadline = self.config.deadline().is_some_and(|d| elapsed >= d);
            if self.polls >= self.config.max_polls || past_deadline {
                debug!(port = %port, polls = self.polls, ?elapsed, "device not responding");
                return Err(BusError::DeviceNotResponding {
                    port,
                    polls: self.polls,
                    elapsed,
                });
            }

            self.polls += 1;
            let reply = self.session.execute(&status)?;
            match reply.status {
                ErrorCode::Success => {
                    let ready = match &reply.body {
                        ResponseBody::LsStatus(s) => s.bytes_ready.unwrap_or_default(),
                        _ => 0,
                    };
                    if ready >= rx_len {
                        metrics::histogram!(
                            metric_defs::LOWSPEED_POLLS.name,
                            &LinkLabels::new(self.session.port().to_string()).to_labels()
                        )
                        .record(self.polls as f64);
                        return Ok(());
                    }
                    trace!(port = %port, ready, rx_len, "waiting for data");
                }
                status if status.is_pending() => {
                    trace!(port = %port, "bus transaction in progress");
                }
                status => {
                    return Err(BusError::Device {
                        port,
                        stage: BusStage::Poll,
                        status,
                    });
                }
            }

            thread::sleep(self.config.poll_interval());
        }
    }

    /// Read the manufacturer and type strings of a digital sensor.
    pub fn read_identity(&mut self, port: SensorPort) -> Result<SensorIdentity, BusError> {
        let request = LowSpeedRequest::identity(port);
        let data = self.transact(&request)?;
        SensorIdentity::decode(&data).ok_or(BusError::ShortRead {
            port,
            expected: request.rx_len,
            actual: data.len() as u8,
        })
    }

    /// Read the first distance measurement of an ultrasonic sensor, in cm.
    pub fn read_sonar_distance(&mut self, port: SensorPort) -> Result<u8, BusError> {
        let data = self.transact(&LowSpeedRequest::sonar_distance(port))?;
        data.first().copied().ok_or(BusError::ShortRead {
            port,
            expected: 1,
            actual: 0,
        })
    }

    /// Write the ultrasonic command register (e.g. 0x02 for continuous mode).
    pub fn set_sonar_mode(&mut self, port: SensorPort, mode: u8) -> Result<(), BusError> {
        self.transact(&LowSpeedRequest::send_command(
            port,
            SONAR_REG_COMMAND_STATE,
            mode,
        ))
        .map(|_| ())
    }
}

fn expect_success(response: &Response, port: SensorPort, stage: BusStage) -> Result<(), BusError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(BusError::Device {
            port,
            stage,
            status: response.status,
        })
    }
}
