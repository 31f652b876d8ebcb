//! Protocol error types.

use crate::types::OpCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while framing or decoding protocol bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Frame is too long.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Opcode byte does not name any command.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Byte 0 carries a kind that is not valid in this position.
    #[error("unexpected kind byte 0x{0:02X}")]
    UnexpectedKind(u8),

    /// Reply bytes cannot be interpreted as a reply to `opcode`.
    #[error("malformed reply to {opcode}: {reason}")]
    MalformedResponse {
        /// Opcode the reply was decoded against.
        opcode: OpCode,
        /// What was wrong with it.
        reason: MalformedReason,
    },

    /// Command bytes are shorter than the fixed part of their layout.
    #[error("malformed {opcode} command: expected at least {expected} bytes, got {actual}")]
    MalformedCommand {
        /// Opcode of the command.
        opcode: OpCode,
        /// Minimum length of the layout.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Command field byte outside the values its type accepts.
    #[error("{opcode}: field `{field}` has invalid value 0x{value:02X}")]
    InvalidField {
        /// Opcode of the command.
        opcode: OpCode,
        /// Field name.
        field: &'static str,
        /// Byte as received.
        value: u8,
    },
}

impl ProtocolError {
    /// Opcode the error relates to, when known.
    pub fn opcode(&self) -> Option<OpCode> {
        match self {
            ProtocolError::MalformedResponse { opcode, .. }
            | ProtocolError::MalformedCommand { opcode, .. }
            | ProtocolError::InvalidField { opcode, .. } => Some(*opcode),
            _ => None,
        }
    }
}

/// Why a reply was rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Fewer than the three header bytes.
    TooShort {
        /// Bytes received.
        actual: usize,
    },
    /// Byte 0 does not carry the reply kind.
    NotAReply {
        /// Byte 0 as received.
        kind_byte: u8,
    },
    /// Byte 1 echoes a different opcode.
    OpcodeMismatch {
        /// Opcode byte as received.
        actual: u8,
    },
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::TooShort { actual } => {
                write!(f, "{} bytes is shorter than the reply header", actual)
            }
            MalformedReason::NotAReply { kind_byte } => {
                write!(f, "kind byte 0x{:02X} is not a reply", kind_byte)
            }
            MalformedReason::OpcodeMismatch { actual } => {
                write!(f, "echoed opcode 0x{:02X} does not match", actual)
            }
        }
    }
}

/// A command field that cannot be represented in its wire layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// String or byte field longer than its slot.
    #[error("{opcode}: field `{field}` holds {actual} bytes, at most {max} fit")]
    FieldTooLong {
        /// Opcode being encoded.
        opcode: OpCode,
        /// Field name.
        field: &'static str,
        /// Width of the slot.
        max: usize,
        /// Length supplied.
        actual: usize,
    },

    /// String field with characters outside ASCII.
    #[error("{opcode}: field `{field}` is not ASCII")]
    NotAscii {
        /// Opcode being encoded.
        opcode: OpCode,
        /// Field name.
        field: &'static str,
    },

    /// Numeric field outside its declared range.
    #[error("{opcode}: field `{field}` = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Opcode being encoded.
        opcode: OpCode,
        /// Field name.
        field: &'static str,
        /// Value supplied.
        value: i64,
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },

    /// Encoded payload exceeds the transport limit.
    #[error("{opcode}: payload of {actual} bytes exceeds {max}")]
    PayloadTooLong {
        /// Opcode being encoded.
        opcode: OpCode,
        /// Transport limit.
        max: usize,
        /// Encoded length.
        actual: usize,
    },
}

impl EncodeError {
    /// Opcode of the command that failed to encode.
    pub fn opcode(&self) -> OpCode {
        match self {
            EncodeError::FieldTooLong { opcode, .. }
            | EncodeError::NotAscii { opcode, .. }
            | EncodeError::OutOfRange { opcode, .. }
            | EncodeError::PayloadTooLong { opcode, .. } => *opcode,
        }
    }
}

/// Status byte carried at offset 2 of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Success,
    PendingCommunicationTransactionInProgress,
    SpecifiedMailboxQueueIsEmpty,
    NoMoreHandles,
    NoSpace,
    NoMoreFiles,
    EndOfFileExpected,
    EndOfFile,
    NotALinearFile,
    FileNotFound,
    HandleAlreadyClosed,
    NoLinearSpace,
    UndefinedError,
    FileIsBusy,
    NoWriteBuffers,
    AppendNotPossible,
    FileIsFull,
    FileExists,
    ModuleNotFound,
    OutOfBoundary,
    IllegalFileName,
    IllegalHandle,
    RequestFailedFileNotFound,
    UnknownCommandOpcode,
    InsanePacket,
    DataContainsOutOfRangeValues,
    CommunicationBusError,
    NoFreeMemoryInCommunicationBuffer,
    SpecifiedChannelOrConnectionIsNotValid,
    SpecifiedChannelOrConnectionIsNotConfiguredOrBusy,
    NoActiveProgram,
    IllegalSizeSpecified,
    IllegalMailboxQueueIdSpecified,
    AttemptedToAccessInvalidFieldOfAStructure,
    BadInputOrOutputSpecified,
    InsufficientMemoryAvailable,
    BadArguments,
    /// Status byte outside the documented table.
    Unknown(u8),
}

impl ErrorCode {
    /// Numeric status byte.
    pub fn code(self) -> u8 {
        self.into()
    }

    /// True for status 0x00.
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// True for the low-speed "still working" status.
    pub fn is_pending(self) -> bool {
        self == ErrorCode::PendingCommunicationTransactionInProgress
    }

    /// Statuses that describe a transient condition worth resubmitting for.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::PendingCommunicationTransactionInProgress
                | ErrorCode::SpecifiedChannelOrConnectionIsNotConfiguredOrBusy
                | ErrorCode::FileIsBusy
        )
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Success
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorCode::Success => "success",
            ErrorCode::PendingCommunicationTransactionInProgress => {
                "pending communication transaction in progress"
            }
            ErrorCode::SpecifiedMailboxQueueIsEmpty => "specified mailbox queue is empty",
            ErrorCode::NoMoreHandles => "no more handles",
            ErrorCode::NoSpace => "no space",
            ErrorCode::NoMoreFiles => "no more files",
            ErrorCode::EndOfFileExpected => "end of file expected",
            ErrorCode::EndOfFile => "end of file",
            ErrorCode::NotALinearFile => "not a linear file",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::HandleAlreadyClosed => "handle already closed",
            ErrorCode::NoLinearSpace => "no linear space",
            ErrorCode::UndefinedError => "undefined error",
            ErrorCode::FileIsBusy => "file is busy",
            ErrorCode::NoWriteBuffers => "no write buffers",
            ErrorCode::AppendNotPossible => "append not possible",
            ErrorCode::FileIsFull => "file is full",
            ErrorCode::FileExists => "file exists",
            ErrorCode::ModuleNotFound => "module not found",
            ErrorCode::OutOfBoundary => "out of boundary",
            ErrorCode::IllegalFileName => "illegal file name",
            ErrorCode::IllegalHandle => "illegal handle",
            ErrorCode::RequestFailedFileNotFound => "request failed (file not found)",
            ErrorCode::UnknownCommandOpcode => "unknown command opcode",
            ErrorCode::InsanePacket => "insane packet",
            ErrorCode::DataContainsOutOfRangeValues => "data contains out-of-range values",
            ErrorCode::CommunicationBusError => "communication bus error",
            ErrorCode::NoFreeMemoryInCommunicationBuffer => {
                "no free memory in communication buffer"
            }
            ErrorCode::SpecifiedChannelOrConnectionIsNotValid => {
                "specified channel or connection is not valid"
            }
            ErrorCode::SpecifiedChannelOrConnectionIsNotConfiguredOrBusy => {
                "specified channel or connection is not configured or busy"
            }
            ErrorCode::NoActiveProgram => "no active program",
            ErrorCode::IllegalSizeSpecified => "illegal size specified",
            ErrorCode::IllegalMailboxQueueIdSpecified => "illegal mailbox queue id specified",
            ErrorCode::AttemptedToAccessInvalidFieldOfAStructure => {
                "attempted to access invalid field of a structure"
            }
            ErrorCode::BadInputOrOutputSpecified => "bad input or output specified",
            ErrorCode::InsufficientMemoryAvailable => "insufficient memory available",
            ErrorCode::BadArguments => "bad arguments",
            ErrorCode::Unknown(code) => return write!(f, "unknown status (0x{:02X})", code),
        };
        write!(f, "{} (0x{:02X})", text, self.code())
    }
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        use crate::constants::*;
        match code {
            STATUS_SUCCESS => ErrorCode::Success,
            STATUS_PENDING_COMMUNICATION => ErrorCode::PendingCommunicationTransactionInProgress,
            STATUS_MAILBOX_EMPTY => ErrorCode::SpecifiedMailboxQueueIsEmpty,
            STATUS_NO_MORE_HANDLES => ErrorCode::NoMoreHandles,
            STATUS_NO_SPACE => ErrorCode::NoSpace,
            STATUS_NO_MORE_FILES => ErrorCode::NoMoreFiles,
            STATUS_END_OF_FILE_EXPECTED => ErrorCode::EndOfFileExpected,
            STATUS_END_OF_FILE => ErrorCode::EndOfFile,
            STATUS_NOT_A_LINEAR_FILE => ErrorCode::NotALinearFile,
            STATUS_FILE_NOT_FOUND => ErrorCode::FileNotFound,
            STATUS_HANDLE_ALREADY_CLOSED => ErrorCode::HandleAlreadyClosed,
            STATUS_NO_LINEAR_SPACE => ErrorCode::NoLinearSpace,
            STATUS_UNDEFINED_ERROR => ErrorCode::UndefinedError,
            STATUS_FILE_IS_BUSY => ErrorCode::FileIsBusy,
            STATUS_NO_WRITE_BUFFERS => ErrorCode::NoWriteBuffers,
            STATUS_APPEND_NOT_POSSIBLE => ErrorCode::AppendNotPossible,
            STATUS_FILE_IS_FULL => ErrorCode::FileIsFull,
            STATUS_FILE_EXISTS => ErrorCode::FileExists,
            STATUS_MODULE_NOT_FOUND => ErrorCode::ModuleNotFound,
            STATUS_OUT_OF_BOUNDARY => ErrorCode::OutOfBoundary,
            STATUS_ILLEGAL_FILE_NAME => ErrorCode::IllegalFileName,
            STATUS_ILLEGAL_HANDLE => ErrorCode::IllegalHandle,
            STATUS_REQUEST_FAILED_FILE_NOT_FOUND => ErrorCode::RequestFailedFileNotFound,
            STATUS_UNKNOWN_COMMAND_OPCODE => ErrorCode::UnknownCommandOpcode,
            STATUS_INSANE_PACKET => ErrorCode::InsanePacket,
            STATUS_DATA_OUT_OF_RANGE => ErrorCode::DataContainsOutOfRangeValues,
            STATUS_COMMUNICATION_BUS_ERROR => ErrorCode::CommunicationBusError,
            STATUS_NO_FREE_COMMUNICATION_BUFFER => ErrorCode::NoFreeMemoryInCommunicationBuffer,
            STATUS_CHANNEL_NOT_VALID => ErrorCode::SpecifiedChannelOrConnectionIsNotValid,
            STATUS_CHANNEL_NOT_CONFIGURED_OR_BUSY => {
                ErrorCode::SpecifiedChannelOrConnectionIsNotConfiguredOrBusy
            }
            STATUS_NO_ACTIVE_PROGRAM => ErrorCode::NoActiveProgram,
            STATUS_ILLEGAL_SIZE => ErrorCode::IllegalSizeSpecified,
            STATUS_ILLEGAL_MAILBOX => ErrorCode::IllegalMailboxQueueIdSpecified,
            STATUS_INVALID_FIELD => ErrorCode::AttemptedToAccessInvalidFieldOfAStructure,
            STATUS_BAD_INPUT_OUTPUT => ErrorCode::BadInputOrOutputSpecified,
            STATUS_INSUFFICIENT_MEMORY => ErrorCode::InsufficientMemoryAvailable,
            STATUS_BAD_ARGUMENTS => ErrorCode::BadArguments,
            _ => ErrorCode::Unknown(code),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        use crate::constants::*;
        match code {
            ErrorCode::Success => STATUS_SUCCESS,
            ErrorCode::PendingCommunicationTransactionInProgress => STATUS_PENDING_COMMUNICATION,
            ErrorCode::SpecifiedMailboxQueueIsEmpty => STATUS_MAILBOX_EMPTY,
            ErrorCode::NoMoreHandles => STATUS_NO_MORE_HANDLES,
            ErrorCode::NoSpace => STATUS_NO_SPACE,
            ErrorCode::NoMoreFiles => STATUS_NO_MORE_FILES,
            ErrorCode::EndOfFileExpected => STATUS_END_OF_FILE_EXPECTED,
            ErrorCode::EndOfFile => STATUS_END_OF_FILE,
            ErrorCode::NotALinearFile => STATUS_NOT_A_LINEAR_FILE,
            ErrorCode::FileNotFound => STATUS_FILE_NOT_FOUND,
            ErrorCode::HandleAlreadyClosed => STATUS_HANDLE_ALREADY_CLOSED,
            ErrorCode::NoLinearSpace => STATUS_NO_LINEAR_SPACE,
            ErrorCode::UndefinedError => STATUS_UNDEFINED_ERROR,
            ErrorCode::FileIsBusy => STATUS_FILE_IS_BUSY,
            ErrorCode::NoWriteBuffers => STATUS_NO_WRITE_BUFFERS,
            ErrorCode::AppendNotPossible => STATUS_APPEND_NOT_POSSIBLE,
            ErrorCode::FileIsFull => STATUS_FILE_IS_FULL,
            ErrorCode::FileExists => STATUS_FILE_EXISTS,
            ErrorCode::ModuleNotFound => STATUS_MODULE_NOT_FOUND,
            ErrorCode::OutOfBoundary => STATUS_OUT_OF_BOUNDARY,
            ErrorCode::IllegalFileName => STATUS_ILLEGAL_FILE_NAME,
            ErrorCode::IllegalHandle => STATUS_ILLEGAL_HANDLE,
            ErrorCode::RequestFailedFileNotFound => STATUS_REQUEST_FAILED_FILE_NOT_FOUND,
            ErrorCode::UnknownCommandOpcode => STATUS_UNKNOWN_COMMAND_OPCODE,
            ErrorCode::InsanePacket => STATUS_INSANE_PACKET,
            ErrorCode::DataContainsOutOfRangeValues => STATUS_DATA_OUT_OF_RANGE,
            ErrorCode::CommunicationBusError => STATUS_COMMUNICATION_BUS_ERROR,
            ErrorCode::NoFreeMemoryInCommunicationBuffer => STATUS_NO_FREE_COMMUNICATION_BUFFER,
            ErrorCode::SpecifiedChannelOrConnectionIsNotValid => STATUS_CHANNEL_NOT_VALID,
            ErrorCode::SpecifiedChannelOrConnectionIsNotConfiguredOrBusy => {
                STATUS_CHANNEL_NOT_CONFIGURED_OR_BUSY
            }
            ErrorCode::NoActiveProgram => STATUS_NO_ACTIVE_PROGRAM,
            ErrorCode::IllegalSizeSpecified => STATUS_ILLEGAL_SIZE,
            ErrorCode::IllegalMailboxQueueIdSpecified => STATUS_ILLEGAL_MAILBOX,
            ErrorCode::AttemptedToAccessInvalidFieldOfAStructure => STATUS_INVALID_FIELD,
            ErrorCode::BadInputOrOutputSpecified => STATUS_BAD_INPUT_OUTPUT,
            ErrorCode::InsufficientMemoryAvailable => STATUS_INSUFFICIENT_MEMORY,
            ErrorCode::BadArguments => STATUS_BAD_ARGUMENTS,
            ErrorCode::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_status_byte_round_trips() {
        for byte in 0..=u8::MAX {
            let code = ErrorCode::from(byte);
            assert_eq!(u8::from(code), byte);
        }
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        assert_eq!(ErrorCode::from(0x41), ErrorCode::Unknown(0x41));
        assert_eq!(ErrorCode::from(0xEC), ErrorCode::NoActiveProgram);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ErrorCode::from(0x20).is_retryable());
        assert!(ErrorCode::from(0xE0).is_retryable());
        assert!(ErrorCode::from(0x8B).is_retryable());
        assert!(!ErrorCode::from(0x87).is_retryable());
        assert!(!ErrorCode::Success.is_retryable());
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(ErrorCode::FileNotFound.to_string(), "file not found (0x87)");
        assert_eq!(ErrorCode::Unknown(0x07).to_string(), "unknown status (0x07)");
    }
}
