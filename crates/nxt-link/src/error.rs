//! Error types for the link layer.

use nxt_protocol::{EncodeError, ErrorCode, OpCode, ProtocolError, SensorPort};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Problems with the channel itself.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The port could not be opened.
    #[error("cannot open {port}: {source}")]
    Unavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// This process already holds a session on the port.
    #[error("{port} is already open")]
    AlreadyOpen { port: String },

    /// The session was closed or broken by an earlier failure.
    #[error("session on {port} is not connected")]
    NotConnected { port: String },

    /// Setting up the channel failed after the port was opened.
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// Failures of a single request/reply exchange.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The previous write has not drained yet.
    #[error("{opcode}: channel busy, previous write still pending")]
    Busy { opcode: OpCode },

    /// No reply arrived before the deadline.
    #[error("{opcode}: no reply within {timeout:?}")]
    TimedOut { opcode: OpCode, timeout: Duration },

    /// A frame arrived that cannot be the reply to the command sent. The
    /// session is unusable afterwards.
    #[error("{opcode}: protocol violation: {source}")]
    ProtocolViolation {
        opcode: OpCode,
        #[source]
        source: ProtocolError,
    },

    /// Reading or writing the channel failed.
    #[error("{opcode}: I/O error: {source}")]
    Io {
        opcode: OpCode,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub fn opcode(&self) -> OpCode {
        match self {
            TransportError::Busy { opcode }
            | TransportError::TimedOut { opcode, .. }
            | TransportError::ProtocolViolation { opcode, .. }
            | TransportError::Io { opcode, .. } => *opcode,
        }
    }
}

/// Everything [`Session::execute`](crate::Session::execute) and its
/// variants can fail with.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A well-formed reply carrying a non-success status.
    #[error("{opcode} failed: {status}")]
    Device { opcode: OpCode, status: ErrorCode },
}

impl ExecuteError {
    /// Opcode of the command that failed, when known.
    pub fn opcode(&self) -> Option<OpCode> {
        match self {
            ExecuteError::Connection(_) => None,
            ExecuteError::Encode(e) => Some(e.opcode()),
            ExecuteError::Transport(e) => Some(e.opcode()),
            ExecuteError::Device { opcode, .. } => Some(*opcode),
        }
    }

    /// Device status, for [`ExecuteError::Device`].
    pub fn status(&self) -> Option<ErrorCode> {
        match self {
            ExecuteError::Device { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether resubmitting the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecuteError::Transport(TransportError::TimedOut { .. }) => true,
            ExecuteError::Device { status, .. } => status.is_retryable(),
            _ => false,
        }
    }

    /// Whether the session must be reopened before further use.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExecuteError::Connection(_)
                | ExecuteError::Transport(TransportError::ProtocolViolation { .. })
                | ExecuteError::Transport(TransportError::Io { .. })
        )
    }
}

/// Step of a low-speed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStage {
    Write,
    Poll,
    Read,
}

impl std::fmt::Display for BusStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BusStage::Write => "write",
            BusStage::Poll => "poll",
            BusStage::Read => "read",
        })
    }
}

/// Failures of a low-speed (I2C) exchange.
#[derive(Error, Debug)]
pub enum BusError {
    #[error(transparent)]
    Execute(#[from] ExecuteError),

    /// The brick reported an error for one of the steps.
    #[error("{port} {stage}: {status}")]
    Device {
        port: SensorPort,
        stage: BusStage,
        status: ErrorCode,
    },

    /// Data never became ready within the poll bound.
    #[error("{port}: device not responding after {polls} polls ({elapsed:?})")]
    DeviceNotResponding {
        port: SensorPort,
        polls: u32,
        elapsed: Duration,
    },

    /// The read returned fewer bytes than requested.
    #[error("{port}: read returned {actual} of {expected} bytes")]
    ShortRead {
        port: SensorPort,
        expected: u8,
        actual: u8,
    },
}

/// A sequence run stopped by an error the session cannot recover from.
#[derive(Error, Debug)]
#[error("cycle {cycle}, command {index} ({opcode}): {source}")]
pub struct SequenceError {
    pub cycle: u64,
    pub index: usize,
    pub opcode: OpCode,
    #[source]
    pub source: ExecuteError,
}
