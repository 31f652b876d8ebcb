//! Replies sent by the brick.
//!
//! Every reply starts with the reply kind byte, the echoed opcode and a
//! status byte. The remaining fields are only meaningful when the status is
//! [`ErrorCode::Success`]; fields the buffer is too short to hold decode as
//! `None` instead of failing.

use crate::catalog::Length;
use crate::constants::*;
use crate::error::{EncodeError, ErrorCode, MalformedReason, ProtocolError};
use crate::field::{FieldReader, FieldWriter};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Battery level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatteryLevel {
    /// Battery voltage in millivolts.
    pub millivolts: Option<u16>,
}

impl BatteryLevel {
    /// Battery voltage in volts.
    pub fn volts(&self) -> Option<f64> {
        self.millivolts.map(|mv| mv as f64 / 1000.0)
    }
}

/// KeepAlive reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeepAlive {
    /// Configured sleep timeout in milliseconds.
    pub sleep_time_ms: Option<u32>,
}

/// Protocol and firmware versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub protocol_minor: Option<u8>,
    pub protocol_major: Option<u8>,
    pub firmware_minor: Option<u8>,
    pub firmware_major: Option<u8>,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |v: Option<u8>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "protocol {}.{}, firmware {}.{:02}",
            part(self.protocol_major),
            part(self.protocol_minor),
            part(self.firmware_major),
            self.firmware_minor.unwrap_or_default()
        )
    }
}

/// Device name, Bluetooth address and free memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Brick name.
    pub name: Option<String>,
    /// Bluetooth address; the seventh byte is always zero.
    pub bluetooth_address: Option<[u8; BLUETOOTH_ADDRESS_WIDTH]>,
    /// Bluetooth signal strength.
    pub signal_strength: Option<u32>,
    /// Free user flash in bytes.
    pub free_flash: Option<u32>,
}

impl DeviceInfo {
    /// Bluetooth address as `AA:BB:CC:DD:EE:FF`.
    pub fn bluetooth_address_string(&self) -> Option<String> {
        self.bluetooth_address.map(|addr| {
            addr[..6]
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(":")
        })
    }
}

/// Output port state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputState {
    pub port: Option<MotorPort>,
    pub power: Option<i8>,
    pub mode: Option<OutputMode>,
    pub regulation: Option<RegulationMode>,
    pub turn_ratio: Option<i8>,
    pub run_state: Option<RunState>,
    pub tacho_limit: Option<u32>,
    /// Position since the last reset of the motor counter.
    pub tacho_count: Option<i32>,
    /// Position relative to the last programmed movement.
    pub block_tacho_count: Option<i32>,
    /// Position relative to the last reset of the rotation sensor.
    pub rotation_count: Option<i32>,
}

/// Sensor port readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InputValues {
    pub port: Option<SensorPort>,
    /// True when the readings are valid.
    pub valid: Option<bool>,
    /// True when a calibration file was found and applied.
    pub calibrated: Option<bool>,
    pub sensor_type: Option<SensorType>,
    pub mode: Option<SensorMode>,
    /// Raw A/D value.
    pub raw: Option<u16>,
    /// Normalized A/D value (0-1023).
    pub normalized: Option<u16>,
    /// Value after mode translation.
    pub scaled: Option<i16>,
    /// Value after calibration; currently unused by the firmware.
    pub calibrated_value: Option<i16>,
}

/// Low-speed bus status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LsStatus {
    /// Bytes waiting to be read from the secondary device.
    pub bytes_ready: Option<u8>,
}

/// Low-speed bus read.
///
/// The device always sends a 16-byte window; only the first `bytes_read`
/// bytes hold secondary-device data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LsRead {
    pub bytes_read: Option<u8>,
    /// The window as received, padding included.
    pub window: Vec<u8>,
}

impl LsRead {
    /// The valid prefix of the window.
    pub fn data(&self) -> &[u8] {
        let n = self.bytes_read.unwrap_or_default() as usize;
        &self.window[..n.min(self.window.len())]
    }
}

/// File name reply (current program, deleted file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileName {
    pub file_name: Option<String>,
}

/// Mailbox read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageRead {
    pub local_inbox: Option<u8>,
    /// Message size including the terminator.
    pub size: Option<u8>,
    /// Message bytes, limited to `size`.
    pub data: Vec<u8>,
}

impl MessageRead {
    /// Message as text, without the terminator.
    pub fn text(&self) -> String {
        crate::field::decode_ascii(&self.data)
    }
}

/// Reply carrying only a handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Handle {
    pub handle: Option<u8>,
}

/// Handle plus a size (file size for OpenRead, free space for OpenAppendData).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandleSize {
    pub handle: Option<u8>,
    pub size: Option<u32>,
}

/// OpenReadLinear reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinearPointer {
    /// Flash address of the file.
    pub pointer: Option<u32>,
}

/// File read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileRead {
    pub handle: Option<u8>,
    pub count: Option<u16>,
    pub data: Vec<u8>,
}

/// File write acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileWrite {
    pub handle: Option<u8>,
    /// Bytes written.
    pub count: Option<u16>,
}

/// File search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub handle: Option<u8>,
    pub file_name: Option<String>,
    pub size: Option<u32>,
}

/// Firmware module search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleEntry {
    pub handle: Option<u8>,
    pub module_name: Option<String>,
    pub module_id: Option<u32>,
    pub module_size: Option<u32>,
    pub io_map_size: Option<u16>,
}

/// IO map read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IoMapRead {
    pub module_id: Option<u32>,
    pub count: Option<u16>,
    pub data: Vec<u8>,
}

impl IoMapRead {
    /// Interpret the data as the UI module's button bytes.
    pub fn button_state(&self) -> Option<ButtonState> {
        ButtonState::from_io_map(&self.data)
    }
}

/// IO map write acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IoMapWrite {
    pub module_id: Option<u32>,
    pub count: Option<u16>,
}

/// Boot command reply; the firmware answers "Yes".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Boot {
    pub reply: Option<String>,
}

/// Poll buffer length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollLength {
    pub buffer: Option<u8>,
    pub length: Option<u8>,
}

/// Poll buffer contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Poll {
    pub buffer: Option<u8>,
    pub length: Option<u8>,
    pub data: Vec<u8>,
}

/// Opcode-specific reply fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Nothing beyond the status byte.
    Status,
    BatteryLevel(BatteryLevel),
    KeepAlive(KeepAlive),
    FirmwareVersion(FirmwareVersion),
    DeviceInfo(DeviceInfo),
    OutputState(OutputState),
    InputValues(InputValues),
    LsStatus(LsStatus),
    LsRead(LsRead),
    FileName(FileName),
    MessageRead(MessageRead),
    Handle(Handle),
    HandleSize(HandleSize),
    LinearPointer(LinearPointer),
    Read(FileRead),
    Write(FileWrite),
    FileEntry(FileEntry),
    Module(ModuleEntry),
    IoMapRead(IoMapRead),
    IoMapWrite(IoMapWrite),
    Boot(Boot),
    PollLength(PollLength),
    Poll(Poll),
}

impl ResponseBody {
    fn decode(opcode: OpCode, r: &FieldReader) -> ResponseBody {
        match opcode {
            OpCode::StartProgram
            | OpCode::StopProgram
            | OpCode::PlaySoundFile
            | OpCode::PlayTone
            | OpCode::SetOutputState
            | OpCode::SetInputMode
            | OpCode::ResetInputScaledValue
            | OpCode::MessageWrite
            | OpCode::ResetMotorPosition
            | OpCode::StopSoundPlayback
            | OpCode::LsWrite
            | OpCode::SetBrickName
            | OpCode::DeleteUserFlash
            | OpCode::BluetoothFactoryReset => ResponseBody::Status,

            OpCode::GetBatteryLevel => ResponseBody::BatteryLevel(BatteryLevel {
                millivolts: r.u16(3),
            }),

            OpCode::KeepAlive => ResponseBody::KeepAlive(KeepAlive {
                sleep_time_ms: r.u32(3),
            }),

            OpCode::GetFirmwareVersion => ResponseBody::FirmwareVersion(FirmwareVersion {
                protocol_minor: r.u8(3),
                protocol_major: r.u8(4),
                firmware_minor: r.u8(5),
                firmware_major: r.u8(6),
            }),

            OpCode::GetDeviceInfo => ResponseBody::DeviceInfo(DeviceInfo {
                name: r.ascii(3, DEVICE_NAME_WIDTH),
                bluetooth_address: r.array(18),
                signal_strength: r.u32(25),
                free_flash: r.u32(29),
            }),

            OpCode::GetOutputState => ResponseBody::OutputState(OutputState {
                port: r.u8(3).and_then(MotorPort::from_index),
                power: r.i8(4),
                mode: r.u8(5).map(OutputMode),
                regulation: r.u8(6).map(RegulationMode::from),
                turn_ratio: r.i8(7),
                run_state: r.u8(8).map(RunState::from),
                tacho_limit: r.u32(9),
                tacho_count: r.i32(13),
                block_tacho_count: r.i32(17),
                rotation_count: r.i32(21),
            }),

            OpCode::GetInputValues => ResponseBody::InputValues(InputValues {
                port: r.u8(3).and_then(SensorPort::from_index),
                valid: r.u8(4).map(|b| b != 0),
                calibrated: r.u8(5).map(|b| b != 0),
                sensor_type: r.u8(6).map(SensorType::from),
                mode: r.u8(7).map(SensorMode::from),
                raw: r.u16(8),
                normalized: r.u16(10),
                scaled: r.i16(12),
                calibrated_value: r.i16(14),
            }),

            OpCode::LsGetStatus => ResponseBody::LsStatus(LsStatus {
                bytes_ready: r.u8(3),
            }),

            OpCode::LsRead => ResponseBody::LsRead(LsRead {
                bytes_read: r.u8(3),
                window: r.tail(4, LS_MAX_DATA).to_vec(),
            }),

            OpCode::GetCurrentProgramName | OpCode::Delete => ResponseBody::FileName(FileName {
                file_name: r.ascii(3, FILE_NAME_WIDTH),
            }),

            OpCode::MessageRead => {
                let size = r.u8(4);
                let window = r.tail(5, MESSAGE_WINDOW);
                let len = (size.unwrap_or_default() as usize).min(window.len());
                ResponseBody::MessageRead(MessageRead {
                    local_inbox: r.u8(3),
                    size,
                    data: window[..len].to_vec(),
                })
            }

            OpCode::OpenWrite
            | OpCode::OpenWriteLinear
            | OpCode::OpenWriteData
            | OpCode::Close
            | OpCode::CloseModuleHandle => ResponseBody::Handle(Handle { handle: r.u8(3) }),

            OpCode::OpenRead | OpCode::OpenAppendData => ResponseBody::HandleSize(HandleSize {
                handle: r.u8(3),
                size: r.u32(4),
            }),

            OpCode::OpenReadLinear => ResponseBody::LinearPointer(LinearPointer {
                pointer: r.u32(3),
            }),

            OpCode::Read => {
                let count = r.u16(4);
                ResponseBody::Read(FileRead {
                    handle: r.u8(3),
                    count,
                    data: r.tail(6, count.unwrap_or_default() as usize).to_vec(),
                })
            }

            OpCode::Write => ResponseBody::Write(FileWrite {
                handle: r.u8(3),
                count: r.u16(4),
            }),

            OpCode::FindFirst | OpCode::FindNext => ResponseBody::FileEntry(FileEntry {
                handle: r.u8(3),
                file_name: r.ascii(4, FILE_NAME_WIDTH),
                size: r.u32(24),
            }),

            OpCode::RequestFirstModule | OpCode::RequestNextModule => {
                ResponseBody::Module(ModuleEntry {
                    handle: r.u8(3),
                    module_name: r.ascii(4, FILE_NAME_WIDTH),
                    module_id: r.u32(24),
                    module_size: r.u32(28),
                    io_map_size: r.u16(32),
                })
            }

            OpCode::ReadIoMap => {
                let count = r.u16(7);
                ResponseBody::IoMapRead(IoMapRead {
                    module_id: r.u32(3),
                    count,
                    data: r.tail(9, count.unwrap_or_default() as usize).to_vec(),
                })
            }

            OpCode::WriteIoMap => ResponseBody::IoMapWrite(IoMapWrite {
                module_id: r.u32(3),
                count: r.u16(7),
            }),

            OpCode::BootCommand => ResponseBody::Boot(Boot {
                reply: r.ascii(3, BOOT_REPLY_WIDTH),
            }),

            OpCode::PollCommandLength => ResponseBody::PollLength(PollLength {
                buffer: r.u8(3),
                length: r.u8(4),
            }),

            OpCode::PollCommand => {
                let length = r.u8(4);
                ResponseBody::Poll(Poll {
                    buffer: r.u8(3),
                    length,
                    data: r.tail(5, length.unwrap_or_default() as usize).to_vec(),
                })
            }
        }
    }

    fn encode_fields(&self, w: &mut FieldWriter) -> Result<(), EncodeError> {
        fn or0<T: Default + Copy>(v: Option<T>) -> T {
            v.unwrap_or_default()
        }
        fn name(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or_default()
        }

        match self {
            ResponseBody::Status => {}
            ResponseBody::BatteryLevel(b) => {
                w.u16(or0(b.millivolts));
            }
            ResponseBody::KeepAlive(k) => {
                w.u32(or0(k.sleep_time_ms));
            }
            ResponseBody::FirmwareVersion(v) => {
                w.u8(or0(v.protocol_minor))
                    .u8(or0(v.protocol_major))
                    .u8(or0(v.firmware_minor))
                    .u8(or0(v.firmware_major));
            }
            ResponseBody::DeviceInfo(d) => {
                w.ascii("name", name(&d.name), DEVICE_NAME_WIDTH)?;
                w.padded(
                    "bluetooth_address",
                    &d.bluetooth_address.unwrap_or_default(),
                    BLUETOOTH_ADDRESS_WIDTH,
                )?;
                w.u32(or0(d.signal_strength)).u32(or0(d.free_flash));
            }
            ResponseBody::OutputState(o) => {
                w.u8(o.port.map_or(0, MotorPort::index))
                    .i8(or0(o.power))
                    .u8(or0(o.mode).0)
                    .u8(o.regulation.map_or(0, u8::from))
                    .i8(or0(o.turn_ratio))
                    .u8(o.run_state.map_or(0, u8::from))
                    .u32(or0(o.tacho_limit))
                    .i32(or0(o.tacho_count))
                    .i32(or0(o.block_tacho_count))
                    .i32(or0(o.rotation_count));
            }
            ResponseBody::InputValues(i) => {
                w.u8(i.port.map_or(0, SensorPort::index))
                    .u8(or0(i.valid) as u8)
                    .u8(or0(i.calibrated) as u8)
                    .u8(i.sensor_type.map_or(0, u8::from))
                    .u8(i.mode.map_or(0, u8::from))
                    .u16(or0(i.raw))
                    .u16(or0(i.normalized))
                    .i16(or0(i.scaled))
                    .i16(or0(i.calibrated_value));
            }
            ResponseBody::LsStatus(s) => {
                w.u8(or0(s.bytes_ready));
            }
            ResponseBody::LsRead(l) => {
                w.u8(or0(l.bytes_read));
                w.padded("window", &l.window, LS_MAX_DATA)?;
            }
            ResponseBody::FileName(n) => {
                w.ascii("file_name", name(&n.file_name), FILE_NAME_WIDTH)?;
            }
            ResponseBody::MessageRead(m) => {
                w.u8(or0(m.local_inbox))
                    .u8(m.size.unwrap_or(m.data.len() as u8));
                w.padded("data", &m.data, MESSAGE_WINDOW)?;
            }
            ResponseBody::Handle(h) => {
                w.u8(or0(h.handle));
            }
            ResponseBody::HandleSize(h) => {
                w.u8(or0(h.handle)).u32(or0(h.size));
            }
            ResponseBody::LinearPointer(p) => {
                w.u32(or0(p.pointer));
            }
            ResponseBody::Read(rd) => {
                w.u8(or0(rd.handle))
                    .u16(rd.count.unwrap_or(rd.data.len() as u16));
                w.bytes("data", &rd.data, MAX_PAYLOAD_SIZE - 6)?;
            }
            ResponseBody::Write(wr) => {
                w.u8(or0(wr.handle)).u16(or0(wr.count));
            }
            ResponseBody::FileEntry(e) => {
                w.u8(or0(e.handle));
                w.ascii("file_name", name(&e.file_name), FILE_NAME_WIDTH)?
                    .u32(or0(e.size));
            }
            ResponseBody::Module(m) => {
                w.u8(or0(m.handle));
                w.ascii("module_name", name(&m.module_name), FILE_NAME_WIDTH)?
                    .u32(or0(m.module_id))
                    .u32(or0(m.module_size))
                    .u16(or0(m.io_map_size));
            }
            ResponseBody::IoMapRead(io) => {
                w.u32(or0(io.module_id))
                    .u16(io.count.unwrap_or(io.data.len() as u16));
                w.bytes("data", &io.data, MAX_PAYLOAD_SIZE - 9)?;
            }
            ResponseBody::IoMapWrite(io) => {
                w.u32(or0(io.module_id)).u16(or0(io.count));
            }
            ResponseBody::Boot(b) => {
                w.ascii("reply", name(&b.reply), BOOT_REPLY_WIDTH)?;
            }
            ResponseBody::PollLength(p) => {
                w.u8(or0(p.buffer)).u8(or0(p.length));
            }
            ResponseBody::Poll(p) => {
                w.u8(or0(p.buffer))
                    .u8(p.length.unwrap_or(p.data.len() as u8));
                w.bytes("data", &p.data, MAX_PAYLOAD_SIZE - 5)?;
            }
        }
        Ok(())
    }
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Opcode echoed by the device.
    pub opcode: OpCode,
    /// Status byte.
    pub status: ErrorCode,
    /// Opcode-specific fields; only meaningful when `status` is success.
    pub body: ResponseBody,
    /// Payload length as received.
    pub wire_len: usize,
    /// When the reply arrived; set by the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl Response {
    /// Decode a reply payload against the opcode of the command that was sent.
    ///
    /// Fails only when the buffer cannot hold the header, does not carry
    /// the reply kind, or echoes a different opcode. Length differences from
    /// the catalog are tolerated.
    pub fn decode(opcode: OpCode, payload: &[u8]) -> Result<Response, ProtocolError> {
        let malformed = |reason| ProtocolError::MalformedResponse { opcode, reason };

        if payload.len() < MIN_REPLY_SIZE {
            return Err(malformed(MalformedReason::TooShort {
                actual: payload.len(),
            }));
        }
        if payload[0] & KIND_MASK != KIND_REPLY {
            return Err(malformed(MalformedReason::NotAReply {
                kind_byte: payload[0],
            }));
        }
        if payload[OPCODE_OFFSET] != opcode.code() {
            return Err(malformed(MalformedReason::OpcodeMismatch {
                actual: payload[OPCODE_OFFSET],
            }));
        }

        let expected = opcode.entry().reply;
        if !expected.accepts(payload.len()) {
            log::debug!(
                "{} reply is {} bytes, catalog lists {:?}",
                opcode,
                payload.len(),
                expected
            );
        }

        let reader = FieldReader::new(payload);
        Ok(Response {
            opcode,
            status: ErrorCode::from(payload[STATUS_OFFSET]),
            body: ResponseBody::decode(opcode, &reader),
            wire_len: payload.len(),
            received_at: None,
        })
    }

    /// Build a reply from its parts, as a device would.
    pub fn new(opcode: OpCode, status: ErrorCode, body: ResponseBody) -> Self {
        Response {
            opcode,
            status,
            body,
            wire_len: 0,
            received_at: None,
        }
    }

    /// Synthetic reply for a command sent without a reply request.
    pub fn acknowledged(opcode: OpCode) -> Self {
        Response::new(opcode, ErrorCode::Success, ResponseBody::Status)
    }

    /// Encode the reply payload (without frame header).
    ///
    /// Absent fields are written as zeros.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut writer = FieldWriter::new(self.opcode, KIND_REPLY);
        writer.u8(self.status.into());
        self.body.encode_fields(&mut writer)?;
        writer.finish()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `Ok` on success, the status otherwise.
    pub fn check(&self) -> Result<&Self, ErrorCode> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.status)
        }
    }

    /// Catalog length for this reply.
    pub fn expected_len(&self) -> Length {
        self.opcode.entry().reply
    }

    /// Name of the running program, `None` when no program runs.
    pub fn program_name(&self) -> Option<&str> {
        match (&self.body, self.status) {
            (ResponseBody::FileName(n), ErrorCode::Success) => n.file_name.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_level_reply() {
        let resp = Response::decode(OpCode::GetBatteryLevel, &[0x02, 0x0B, 0x00, 0xE8, 0x13]).unwrap();
        assert_eq!(resp.status, ErrorCode::Success);
        match resp.body {
            ResponseBody::BatteryLevel(b) => {
                assert_eq!(b.millivolts, Some(5096));
                assert_eq!(b.volts(), Some(5.096));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let err = Response::decode(OpCode::GetBatteryLevel, &[0x02, 0x0B]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedResponse {
                opcode: OpCode::GetBatteryLevel,
                reason: MalformedReason::TooShort { actual: 2 }
            }
        );
    }

    #[test]
    fn test_non_reply_kind_is_malformed() {
        let err = Response::decode(OpCode::GetBatteryLevel, &[0x00, 0x0B, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedResponse {
                reason: MalformedReason::NotAReply { kind_byte: 0x00 },
                ..
            }
        ));
    }

    #[test]
    fn test_opcode_mismatch_is_malformed() {
        let err = Response::decode(OpCode::GetBatteryLevel, &[0x02, 0x0D, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedResponse {
                reason: MalformedReason::OpcodeMismatch { actual: 0x0D },
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_fields_are_absent() {
        // Error reply: status only, nothing after it.
        let resp = Response::decode(OpCode::OpenRead, &[0x02, 0x80, 0x87]).unwrap();
        assert_eq!(resp.status, ErrorCode::FileNotFound);
        assert_eq!(
            resp.body,
            ResponseBody::HandleSize(HandleSize {
                handle: None,
                size: None
            })
        );
    }

    #[test]
    fn test_ls_read_window() {
        let mut payload = vec![0x02, 0x10, 0x00, 0x01, 0x2A];
        payload.extend_from_slice(&[0u8; 15]);
        let resp = Response::decode(OpCode::LsRead, &payload).unwrap();
        match resp.body {
            ResponseBody::LsRead(ls) => {
                assert_eq!(ls.window.len(), 16);
                assert_eq!(ls.data(), &[0x2A]);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_input_values_reply() {
        let payload = [
            0x02, 0x07, 0x00, 0x01, 0x01, 0x00, 0x05, 0x80, 0x10, 0x02, 0x00, 0x02, 0x2D, 0x00,
            0x00, 0x00,
        ];
        let resp = Response::decode(OpCode::GetInputValues, &payload).unwrap();
        match resp.body {
            ResponseBody::InputValues(v) => {
                assert_eq!(v.port, Some(SensorPort::S2));
                assert_eq!(v.valid, Some(true));
                assert_eq!(v.sensor_type, Some(SensorType::LightActive));
                assert_eq!(v.mode, Some(SensorMode::new(SensorTranslation::PercentFullScale)));
                assert_eq!(v.raw, Some(0x0210));
                assert_eq!(v.normalized, Some(0x0200));
                assert_eq!(v.scaled, Some(45));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_device_info_trims_padding() {
        let reply = Response::new(
            OpCode::GetDeviceInfo,
            ErrorCode::Success,
            ResponseBody::DeviceInfo(DeviceInfo {
                name: Some("NXT".into()),
                bluetooth_address: Some([0x00, 0x16, 0x53, 0x01, 0x02, 0x03, 0x00]),
                signal_strength: Some(0),
                free_flash: Some(64_000),
            }),
        );
        let mut payload = reply.encode().unwrap();
        assert_eq!(payload.len(), 33);
        // Firmware pads unused name bytes with '?' on some versions.
        payload[6] = b'?';
        let decoded = Response::decode(OpCode::GetDeviceInfo, &payload).unwrap();
        match decoded.body {
            ResponseBody::DeviceInfo(d) => {
                assert_eq!(d.name.as_deref(), Some("NXT"));
                assert_eq!(d.bluetooth_address_string().as_deref(), Some("00:16:53:01:02:03"));
                assert_eq!(d.free_flash, Some(64_000));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_message_read_is_limited_to_size() {
        let reply = Response::new(
            OpCode::MessageRead,
            ErrorCode::Success,
            ResponseBody::MessageRead(MessageRead {
                local_inbox: Some(0),
                size: Some(6),
                data: b"hello\0".to_vec(),
            }),
        );
        let payload = reply.encode().unwrap();
        assert_eq!(payload.len(), 64);
        let decoded = Response::decode(OpCode::MessageRead, &payload).unwrap();
        match decoded.body {
            ResponseBody::MessageRead(m) => {
                assert_eq!(m.data.len(), 6);
                assert_eq!(m.text(), "hello");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_no_active_program() {
        let resp = Response::decode(OpCode::GetCurrentProgramName, &[0x02, 0x11, 0xEC]).unwrap();
        assert_eq!(resp.status, ErrorCode::NoActiveProgram);
        assert_eq!(resp.program_name(), None);
    }

    #[test]
    fn test_acknowledged_is_success() {
        let resp = Response::acknowledged(OpCode::PlayTone);
        assert!(resp.is_success());
        assert_eq!(resp.body, ResponseBody::Status);
        assert_eq!(resp.encode().unwrap(), vec![0x02, 0x03, 0x00]);
    }
}
