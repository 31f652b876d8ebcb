//! Command catalog: the static shape of every opcode.
//!
//! Lengths are full payload lengths (kind and opcode bytes included). Reply
//! lengths are advisory; the decoder never rejects a reply for being longer
//! or shorter than listed here.

use crate::types::{CommandKind, OpCode};
use serde::Serialize;

/// Whether a command must be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolicy {
    /// Always sent with a reply request; the caller cannot suppress it.
    Required,
    /// The caller chooses; defaults to no reply.
    Optional,
}

/// Payload length of a request or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    Fixed(usize),
    /// Content-dependent length within bounds.
    Variable { min: usize, max: usize },
}

impl Length {
    /// Smallest length the shape allows.
    pub const fn min(self) -> usize {
        match self {
            Length::Fixed(n) => n,
            Length::Variable { min, .. } => min,
        }
    }

    /// Largest length the shape allows.
    pub const fn max(self) -> usize {
        match self {
            Length::Fixed(n) => n,
            Length::Variable { max, .. } => max,
        }
    }

    /// True when `len` fits the shape.
    pub const fn accepts(self, len: usize) -> bool {
        len >= self.min() && len <= self.max()
    }
}

/// Catalog row for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub opcode: OpCode,
    pub kind: CommandKind,
    /// Request payload length.
    pub request: Length,
    /// Reply payload length.
    pub reply: Length,
    pub reply_policy: ReplyPolicy,
}

const fn row(opcode: OpCode, request: Length, reply: Length, reply_policy: ReplyPolicy) -> CatalogEntry {
    CatalogEntry {
        opcode,
        kind: opcode.kind(),
        request,
        reply,
        reply_policy,
    }
}

use Length::{Fixed, Variable};
use ReplyPolicy::{Optional, Required};

/// Status-only reply: kind, opcode, status.
const STATUS: Length = Fixed(3);

/// Every opcode, in the declaration order of [`OpCode`].
pub static CATALOG: [CatalogEntry; 44] = [
    // Direct commands
    row(OpCode::StartProgram, Fixed(22), STATUS, Optional),
    row(OpCode::StopProgram, Fixed(2), STATUS, Optional),
    row(OpCode::PlaySoundFile, Fixed(23), STATUS, Optional),
    row(OpCode::PlayTone, Fixed(6), STATUS, Optional),
    row(OpCode::SetOutputState, Fixed(12), STATUS, Optional),
    row(OpCode::SetInputMode, Fixed(5), STATUS, Optional),
    row(OpCode::GetOutputState, Fixed(3), Fixed(25), Required),
    row(OpCode::GetInputValues, Fixed(3), Fixed(16), Required),
    row(OpCode::ResetInputScaledValue, Fixed(3), STATUS, Optional),
    row(OpCode::MessageWrite, Variable { min: 5, max: 63 }, STATUS, Optional),
    row(OpCode::ResetMotorPosition, Fixed(4), STATUS, Optional),
    row(OpCode::GetBatteryLevel, Fixed(2), Fixed(5), Required),
    row(OpCode::StopSoundPlayback, Fixed(2), STATUS, Optional),
    row(OpCode::KeepAlive, Fixed(2), Fixed(7), Required),
    row(OpCode::LsGetStatus, Fixed(3), Fixed(4), Required),
    row(OpCode::LsWrite, Variable { min: 5, max: 21 }, STATUS, Optional),
    row(OpCode::LsRead, Fixed(3), Fixed(20), Required),
    row(OpCode::GetCurrentProgramName, Fixed(2), Fixed(23), Required),
    row(OpCode::MessageRead, Fixed(5), Fixed(64), Required),
    // System commands
    row(OpCode::OpenRead, Fixed(22), Fixed(8), Required),
    row(OpCode::OpenWrite, Fixed(26), Fixed(4), Required),
    row(OpCode::Read, Fixed(5), Variable { min: 6, max: 64 }, Required),
    row(OpCode::Write, Variable { min: 3, max: 64 }, Fixed(6), Required),
    row(OpCode::Close, Fixed(3), Fixed(4), Required),
    row(OpCode::Delete, Fixed(22), Fixed(23), Required),
    row(OpCode::FindFirst, Fixed(22), Fixed(28), Required),
    row(OpCode::FindNext, Fixed(3), Fixed(28), Required),
    row(OpCode::GetFirmwareVersion, Fixed(2), Fixed(7), Required),
    row(OpCode::OpenWriteLinear, Fixed(26), Fixed(4), Required),
    row(OpCode::OpenReadLinear, Fixed(22), Fixed(7), Required),
    row(OpCode::OpenWriteData, Fixed(26), Fixed(4), Required),
    row(OpCode::OpenAppendData, Fixed(22), Fixed(8), Required),
    row(OpCode::RequestFirstModule, Fixed(22), Fixed(34), Required),
    row(OpCode::RequestNextModule, Fixed(3), Fixed(34), Required),
    row(OpCode::CloseModuleHandle, Fixed(3), Fixed(4), Required),
    row(OpCode::ReadIoMap, Fixed(10), Variable { min: 9, max: 64 }, Required),
    row(OpCode::WriteIoMap, Variable { min: 10, max: 64 }, Fixed(9), Required),
    row(OpCode::BootCommand, Fixed(21), Fixed(7), Required),
    row(OpCode::SetBrickName, Fixed(18), STATUS, Required),
    row(OpCode::GetDeviceInfo, Fixed(2), Fixed(33), Required),
    row(OpCode::DeleteUserFlash, Fixed(2), STATUS, Required),
    row(OpCode::PollCommandLength, Fixed(3), Fixed(5), Required),
    row(OpCode::PollCommand, Fixed(4), Variable { min: 5, max: 64 }, Required),
    row(OpCode::BluetoothFactoryReset, Fixed(2), STATUS, Required),
];

/// Catalog row for `opcode`.
pub fn entry(opcode: OpCode) -> &'static CatalogEntry {
    // Rows follow the enum's declaration order.
    &CATALOG[opcode as usize]
}

impl OpCode {
    /// Catalog row for this opcode.
    pub fn entry(self) -> &'static CatalogEntry {
        entry(self)
    }

    /// True when the device must always be asked for a reply.
    pub fn reply_required(self) -> bool {
        entry(self).reply_policy == ReplyPolicy::Required
    }
}
