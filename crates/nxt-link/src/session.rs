//! The transport session: one open channel, one request in flight.
//!
//! ## State machine
//!
//! ```text
//! Idle   -> Sending -> AwaitingReply -> Idle    (reply matched)
//! Idle   -> Sending -> AwaitingReply -> Failed  (timed out)
//! Failed -> Sending -> ...                      (next command)
//! any    -> Broken                              (protocol violation, I/O error)
//! ```
//!
//! Replies carry no request id. Because only one command is outstanding at a
//! time, the next frame to arrive is the reply; a frame with the wrong kind
//! or opcode means the stream is out of step and the session is given up.

use crate::error::{ConnectionError, ExecuteError, TransportError};
use crate::transport::{FrameReader, Inbound, SerialTransport, Transport};
use chrono::Utc;
use crossbeam_channel::RecvTimeoutError;
use nxt_metrics::{metric_defs, LinkLabels};
use nxt_protocol::{frame_command, Command, OpCode, Response};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Ports held by sessions in this process.
static OPEN_PORTS: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

/// Registration of a port name in [`OPEN_PORTS`], released on drop.
#[derive(Debug)]
struct PortGuard(String);

impl PortGuard {
    fn acquire(port: &str) -> Result<PortGuard, ConnectionError> {
        let mut open = OPEN_PORTS.lock();
        if open.iter().any(|p| p == port) {
            return Err(ConnectionError::AlreadyOpen {
                port: port.to_string(),
            });
        }
        open.push(port.to_string());
        Ok(PortGuard(port.to_string()))
    }
}

impl Drop for PortGuard {
    fn drop(&mut self) {
        OPEN_PORTS.lock().retain(|p| p != &self.0);
    }
}

/// Channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Line speed; ignored by Bluetooth SPP and USB CDC links.
    pub baud_rate: u32,
    /// How long `execute` waits for a reply.
    pub reply_timeout_ms: u64,
    /// Read timeout of the reader thread; bounds how quickly it notices
    /// shutdown.
    pub read_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            baud_rate: 9600,
            reply_timeout_ms: 1500,
            read_poll_ms: 50,
        }
    }
}

impl SessionConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}

/// Where the session is in its request/reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Ready for a command.
    Idle,
    /// Writing a frame.
    Sending,
    /// Waiting for the reply frame.
    AwaitingReply,
    /// The last exchange timed out. The next command resynchronizes and
    /// starts over.
    Failed,
    /// Framing was lost or the channel failed; the session must be reopened.
    Broken,
}

/// An open channel to a brick.
pub struct Session {
    port: String,
    config: SessionConfig,
    transport: Box<dyn Transport>,
    reader: FrameReader,
    state: SessionState,
    labels: LinkLabels,
    _guard: PortGuard,
}

impl Session {
    /// Open a serial port.
    pub fn open(port: &str, config: SessionConfig) -> Result<Session, ConnectionError> {
        let guard = PortGuard::acquire(port)?;
        let transport = SerialTransport::open(port, config.baud_rate, config.read_poll())
            .map_err(|source| ConnectionError::Unavailable {
                port: port.to_string(),
                source,
            })?;
        Session::start(Box::new(transport), config, guard)
    }

    /// Run a session over any transport.
    pub fn with_transport<T>(transport: T, config: SessionConfig) -> Result<Session, ConnectionError>
    where
        T: Transport + 'static,
    {
        let guard = PortGuard::acquire(transport.name())?;
        Session::start(Box::new(transport), config, guard)
    }

    fn start(
        mut transport: Box<dyn Transport>,
        config: SessionConfig,
        guard: PortGuard,
    ) -> Result<Session, ConnectionError> {
        let port = transport.name().to_string();
        let reader = transport
            .take_reader()
            .and_then(|reader| FrameReader::spawn(&port, reader))
            .map_err(|source| ConnectionError::Io {
                port: port.clone(),
                source,
            })?;

        metrics::gauge!(metric_defs::OPEN_SESSIONS.name).increment(1.0);
        info!(port = %port, "session opened");

        Ok(Session {
            labels: LinkLabels::new(port.clone()),
            port,
            config,
            transport,
            reader,
            state: SessionState::Idle,
            _guard: guard,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send a command and wait up to the configured reply timeout.
    pub fn execute(&mut self, command: &Command) -> Result<Response, ExecuteError> {
        let timeout = self.config.reply_timeout();
        self.execute_with_timeout(command, timeout)
    }

    /// Send a command and wait up to `timeout` for its reply.
    ///
    /// A reply with a non-success status is returned as `Ok`; use
    /// [`Session::execute_checked`] to turn it into an error. A command
    /// that does not want a reply returns a synthetic success as soon as
    /// it is written.
    pub fn execute_with_timeout(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Response, ExecuteError> {
        if self.state == SessionState::Broken {
            return Err(ConnectionError::NotConnected {
                port: self.port.clone(),
            }
            .into());
        }

        let opcode = command.opcode();
        let frame = frame_command(command)?;

        match self.transport.pending_output() {
            Ok(0) => {}
            Ok(pending) => {
                debug!(port = %self.port, %opcode, pending, "previous write not drained");
                metrics::counter!(
                    metric_defs::BUSY_REJECTIONS.name,
                    &self.labels.with_opcode(format!("{:?}", opcode))
                )
                .increment(1);
                return Err(TransportError::Busy { opcode }.into());
            }
            Err(source) => return Err(self.broken(opcode, source)),
        }

        self.resync(opcode)?;

        self.state = SessionState::Sending;
        trace!(port = %self.port, tx = %hex::encode(&frame), "sending {}", opcode);
        if let Err(source) = self.transport.write_frame(&frame) {
            return Err(self.broken(opcode, source));
        }
        let op_labels = self.labels.with_opcode(format!("{:?}", opcode));
        metrics::counter!(metric_defs::COMMANDS_SENT.name, &op_labels).increment(1);
        metrics::counter!(metric_defs::BYTES_WRITTEN.name, &self.labels.to_labels())
            .increment(frame.len() as u64);

        if !command.wants_response() {
            self.state = SessionState::Idle;
            return Ok(Response::acknowledged(opcode));
        }

        self.state = SessionState::AwaitingReply;
        let started = Instant::now();
        match self.await_reply(opcode, timeout) {
            Ok(response) => {
                self.state = SessionState::Idle;
                metrics::histogram!(metric_defs::ROUND_TRIP_TIME.name, &op_labels)
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                metrics::counter!(
                    metric_defs::REPLIES_RECEIVED.name,
                    &self.labels.with(&[
                        ("opcode", format!("{:?}", opcode)),
                        ("status", format!("0x{:02X}", response.status.code())),
                    ])
                )
                .increment(1);
                Ok(response)
            }
            Err(err @ TransportError::TimedOut { .. }) => {
                self.state = SessionState::Failed;
                debug!(port = %self.port, %opcode, ?timeout, "reply timed out");
                metrics::counter!(metric_defs::TIMEOUTS.name, &op_labels).increment(1);
                Err(err.into())
            }
            Err(err) => {
                if matches!(err, TransportError::ProtocolViolation { .. }) {
                    metrics::counter!(metric_defs::PROTOCOL_VIOLATIONS.name, &op_labels)
                        .increment(1);
                }
                warn!(port = %self.port, error = %err, "session broken");
                self.state = SessionState::Broken;
                Err(err.into())
            }
        }
    }

    /// Like [`Session::execute`], but a non-success status is an error.
    pub fn execute_checked(&mut self, command: &Command) -> Result<Response, ExecuteError> {
        let response = self.execute(command)?;
        if !response.is_success() {
            return Err(ExecuteError::Device {
                opcode: response.opcode,
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Submit `command` up to its `try_count` times.
    ///
    /// Resubmits after a timeout or a transient device status; every other
    /// failure is returned at once.
    pub fn execute_with_retries(&mut self, command: &Command) -> Result<Response, ExecuteError> {
        let attempts = command.try_count().max(1);
        let mut attempt = 1;
        loop {
            match self.execute_checked(command) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    debug!(
                        port = %self.port,
                        opcode = %command.opcode(),
                        attempt,
                        attempts,
                        error = %err,
                        "retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Close the channel.
    pub fn close(self) {
        drop(self);
    }

    /// Discard leftovers of an earlier exchange before writing.
    ///
    /// OS buffers go first so the reader thread cannot pick up more stale
    /// bytes once its partial frame is cleared; whatever it already queued
    /// is drained last.
    fn resync(&mut self, opcode: OpCode) -> Result<(), ExecuteError> {
        if let Err(source) = self.transport.discard_input() {
            return Err(self.broken(opcode, source));
        }
        self.reader.clear_partial();

        let mut stale = 0u64;
        while let Ok(msg) = self.reader.inbound.try_recv() {
            match msg {
                Inbound::Frame(payload) => {
                    debug!(port = %self.port, stale = %hex::encode(&payload), "discarding unread frame");
                    stale += 1;
                }
                Inbound::Malformed(err) => {
                    debug!(port = %self.port, error = %err, "discarding malformed input");
                    stale += 1;
                }
                Inbound::Failed(source) => return Err(self.broken(opcode, source)),
                Inbound::Closed => return Err(self.broken(opcode, channel_closed())),
            }
        }
        if stale > 0 {
            metrics::counter!(metric_defs::STALE_FRAMES_DISCARDED.name, &self.labels.to_labels())
                .increment(stale);
        }
        Ok(())
    }

    fn await_reply(&mut self, opcode: OpCode, timeout: Duration) -> Result<Response, TransportError> {
        match self.reader.inbound.recv_timeout(timeout) {
            Ok(Inbound::Frame(payload)) => {
                trace!(port = %self.port, rx = %hex::encode(&payload), "reply frame");
                let mut response = Response::decode(opcode, &payload)
                    .map_err(|source| TransportError::ProtocolViolation { opcode, source })?;
                response.received_at = Some(Utc::now());
                Ok(response)
            }
            Ok(Inbound::Malformed(source)) => {
                Err(TransportError::ProtocolViolation { opcode, source })
            }
            Ok(Inbound::Failed(source)) => Err(TransportError::Io { opcode, source }),
            Ok(Inbound::Closed) | Err(RecvTimeoutError::Disconnected) => Err(TransportError::Io {
                opcode,
                source: channel_closed(),
            }),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::TimedOut { opcode, timeout }),
        }
    }

    fn broken(&mut self, opcode: OpCode, source: io::Error) -> ExecuteError {
        warn!(port = %self.port, %opcode, error = %source, "channel failed");
        self.state = SessionState::Broken;
        TransportError::Io { opcode, source }.into()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.shutdown();
        metrics::gauge!(metric_defs::OPEN_SESSIONS.name).decrement(1.0);
        info!(port = %self.port, "session closed");
    }
}

fn channel_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "channel closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_guard_rejects_second_holder() {
        let first = PortGuard::acquire("guard-test").unwrap();
        assert!(matches!(
            PortGuard::acquire("guard-test"),
            Err(ConnectionError::AlreadyOpen { .. })
        ));
        drop(first);
        assert!(PortGuard::acquire("guard-test").is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.reply_timeout(), Duration::from_millis(1500));
        let parsed: SessionConfig = serde_yaml::from_str("reply_timeout_ms: 200").unwrap();
        assert_eq!(parsed.reply_timeout_ms, 200);
        assert_eq!(parsed.baud_rate, 9600);
    }
}
