//! Commands that can be sent to the brick.

use crate::constants::*;
use crate::error::{EncodeError, ProtocolError};
use crate::field::{FieldReader, FieldWriter};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Largest transfer a single Read reply can carry.
pub const MAX_READ_COUNT: u16 = (MAX_PAYLOAD_SIZE - 6) as u16;
/// Largest transfer a single ReadIoMap reply can carry.
pub const MAX_IO_MAP_READ: u16 = (MAX_PAYLOAD_SIZE - 9) as u16;
/// Largest chunk a single Write command can carry.
pub const MAX_WRITE_CHUNK: usize = MAX_PAYLOAD_SIZE - 3;
/// Largest chunk a single WriteIoMap command can carry.
pub const MAX_IO_MAP_WRITE: usize = MAX_PAYLOAD_SIZE - 10;
/// Most retries a command may ask for.
pub const MAX_TRY_COUNT: u8 = 20;

/// Opcode-specific command fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommandBody {
    /// Start a program stored on the brick.
    StartProgram {
        /// Program file name.
        file_name: String,
    },

    /// Stop the running program.
    StopProgram,

    /// Play a sound file stored on the brick.
    PlaySoundFile {
        /// Sound file name.
        file_name: String,
        /// Repeat until stopped.
        #[serde(default)]
        repeat: bool,
    },

    /// Play a tone. Values outside the speaker's range are clamped.
    PlayTone {
        /// Frequency in Hz (200-14000).
        frequency_hz: u16,
        /// Duration in milliseconds (1-30000).
        duration_ms: u16,
    },

    /// Configure an output port.
    SetOutputState {
        /// Output port, or all outputs.
        port: MotorPort,
        /// Power set point (-100 to 100).
        power: i8,
        /// Mode flags.
        #[serde(default)]
        mode: OutputMode,
        /// Regulation mode.
        regulation: RegulationMode,
        /// Turn ratio for synchronized outputs (-100 to 100).
        #[serde(default)]
        turn_ratio: i8,
        /// Run state.
        run_state: RunState,
        /// Tachometer limit, 0 for unlimited.
        #[serde(default)]
        tacho_limit: u32,
    },

    /// Configure a sensor port.
    SetInputMode {
        port: SensorPort,
        sensor_type: SensorType,
        mode: SensorMode,
    },

    /// Read an output port.
    GetOutputState { port: MotorPort },

    /// Read a sensor port.
    GetInputValues { port: SensorPort },

    /// Reset the scaled value of a sensor port.
    ResetInputScaledValue { port: SensorPort },

    /// Write to a program mailbox.
    MessageWrite {
        /// Mailbox (0-9).
        inbox: u8,
        /// Message text, at most 58 bytes.
        message: String,
    },

    /// Reset a motor tachometer.
    ResetMotorPosition {
        port: MotorPort,
        /// Reset the position relative to the last movement instead of the
        /// program start.
        #[serde(default)]
        relative: bool,
    },

    /// Read the battery level.
    GetBatteryLevel,

    /// Stop sound playback.
    StopSoundPlayback,

    /// Keep the brick awake.
    KeepAlive,

    /// Query the bytes ready on a low-speed port.
    LsGetStatus { port: SensorPort },

    /// Write to a low-speed port.
    LsWrite {
        port: SensorPort,
        /// Bytes to transmit, secondary address first (at most 16).
        tx_data: Vec<u8>,
        /// Bytes the secondary device is expected to answer with (at most 16).
        rx_len: u8,
    },

    /// Read the answer of a low-speed port.
    LsRead { port: SensorPort },

    /// Name of the running program.
    GetCurrentProgramName,

    /// Read from a program mailbox.
    MessageRead {
        /// Remote mailbox (0-19).
        remote_inbox: u8,
        /// Local mailbox (0-9).
        local_inbox: u8,
        /// Remove the message from the mailbox.
        #[serde(default)]
        remove: bool,
    },

    /// Open a file for reading.
    OpenRead { file_name: String },

    /// Open a fragmented file for writing.
    OpenWrite { file_name: String, size: u32 },

    /// Read from an open file.
    Read { handle: u8, count: u16 },

    /// Write to an open file.
    Write { handle: u8, data: Vec<u8> },

    /// Close a file handle.
    Close { handle: u8 },

    /// Delete a file.
    Delete { file_name: String },

    /// Start a file search; the pattern accepts `*` wildcards.
    FindFirst { pattern: String },

    /// Continue a file search.
    FindNext { handle: u8 },

    /// Protocol and firmware versions.
    GetFirmwareVersion,

    /// Open a linear file for writing.
    OpenWriteLinear { file_name: String, size: u32 },

    /// Open a linear file for reading.
    OpenReadLinear { file_name: String },

    /// Open a data file for writing.
    OpenWriteData { file_name: String, size: u32 },

    /// Open a data file for appending.
    OpenAppendData { file_name: String },

    /// Start a firmware module search.
    RequestFirstModule { pattern: String },

    /// Continue a firmware module search.
    RequestNextModule { handle: u8 },

    /// Close a module search handle.
    CloseModuleHandle { handle: u8 },

    /// Read a module's IO map.
    ReadIoMap { module_id: u32, offset: u16, count: u16 },

    /// Write a module's IO map.
    WriteIoMap {
        module_id: u32,
        offset: u16,
        data: Vec<u8>,
    },

    /// Reboot into the firmware update loader.
    BootCommand,

    /// Rename the brick.
    SetBrickName { name: String },

    /// Name, Bluetooth address and free memory.
    GetDeviceInfo,

    /// Erase user flash.
    DeleteUserFlash,

    /// Length of a pending command in a poll buffer.
    PollCommandLength { buffer: u8 },

    /// Read a pending command from a poll buffer.
    PollCommand { buffer: u8, length: u8 },

    /// Reset the Bluetooth module to factory settings.
    BluetoothFactoryReset,
}

impl CommandBody {
    /// Opcode for this body.
    pub fn opcode(&self) -> OpCode {
        match self {
            CommandBody::StartProgram { .. } => OpCode::StartProgram,
            CommandBody::StopProgram => OpCode::StopProgram,
            CommandBody::PlaySoundFile { .. } => OpCode::PlaySoundFile,
            CommandBody::PlayTone { .. } => OpCode::PlayTone,
            CommandBody::SetOutputState { .. } => OpCode::SetOutputState,
            CommandBody::SetInputMode { .. } => OpCode::SetInputMode,
            CommandBody::GetOutputState { .. } => OpCode::GetOutputState,
            CommandBody::GetInputValues { .. } => OpCode::GetInputValues,
            CommandBody::ResetInputScaledValue { .. } => OpCode::ResetInputScaledValue,
            CommandBody::MessageWrite { .. } => OpCode::MessageWrite,
            CommandBody::ResetMotorPosition { .. } => OpCode::ResetMotorPosition,
            CommandBody::GetBatteryLevel => OpCode::GetBatteryLevel,
            CommandBody::StopSoundPlayback => OpCode::StopSoundPlayback,
            CommandBody::KeepAlive => OpCode::KeepAlive,
            CommandBody::LsGetStatus { .. } => OpCode::LsGetStatus,
            CommandBody::LsWrite { .. } => OpCode::LsWrite,
            CommandBody::LsRead { .. } => OpCode::LsRead,
            CommandBody::GetCurrentProgramName => OpCode::GetCurrentProgramName,
            CommandBody::MessageRead { .. } => OpCode::MessageRead,
            CommandBody::OpenRead { .. } => OpCode::OpenRead,
            CommandBody::OpenWrite { .. } => OpCode::OpenWrite,
            CommandBody::Read { .. } => OpCode::Read,
            CommandBody::Write { .. } => OpCode::Write,
            CommandBody::Close { .. } => OpCode::Close,
            CommandBody::Delete { .. } => OpCode::Delete,
            CommandBody::FindFirst { .. } => OpCode::FindFirst,
            CommandBody::FindNext { .. } => OpCode::FindNext,
            CommandBody::GetFirmwareVersion => OpCode::GetFirmwareVersion,
            CommandBody::OpenWriteLinear { .. } => OpCode::OpenWriteLinear,
            CommandBody::OpenReadLinear { .. } => OpCode::OpenReadLinear,
            CommandBody::OpenWriteData { .. } => OpCode::OpenWriteData,
            CommandBody::OpenAppendData { .. } => OpCode::OpenAppendData,
            CommandBody::RequestFirstModule { .. } => OpCode::RequestFirstModule,
            CommandBody::RequestNextModule { .. } => OpCode::RequestNextModule,
            CommandBody::CloseModuleHandle { .. } => OpCode::CloseModuleHandle,
            CommandBody::ReadIoMap { .. } => OpCode::ReadIoMap,
            CommandBody::WriteIoMap { .. } => OpCode::WriteIoMap,
            CommandBody::BootCommand => OpCode::BootCommand,
            CommandBody::SetBrickName { .. } => OpCode::SetBrickName,
            CommandBody::GetDeviceInfo => OpCode::GetDeviceInfo,
            CommandBody::DeleteUserFlash => OpCode::DeleteUserFlash,
            CommandBody::PollCommandLength { .. } => OpCode::PollCommandLength,
            CommandBody::PollCommand { .. } => OpCode::PollCommand,
            CommandBody::BluetoothFactoryReset => OpCode::BluetoothFactoryReset,
        }
    }

    /// Write the opcode-specific fields after the two header bytes.
    fn encode_fields(&self, w: &mut FieldWriter) -> Result<(), EncodeError> {
        match self {
            CommandBody::StopProgram
            | CommandBody::GetBatteryLevel
            | CommandBody::StopSoundPlayback
            | CommandBody::KeepAlive
            | CommandBody::GetCurrentProgramName
            | CommandBody::GetFirmwareVersion
            | CommandBody::GetDeviceInfo
            | CommandBody::DeleteUserFlash
            | CommandBody::BluetoothFactoryReset => {}

            CommandBody::StartProgram { file_name }
            | CommandBody::OpenRead { file_name }
            | CommandBody::Delete { file_name }
            | CommandBody::OpenReadLinear { file_name }
            | CommandBody::OpenAppendData { file_name } => {
                w.ascii("file_name", file_name, FILE_NAME_WIDTH)?;
            }

            CommandBody::FindFirst { pattern } | CommandBody::RequestFirstModule { pattern } => {
                w.ascii("pattern", pattern, FILE_NAME_WIDTH)?;
            }

            CommandBody::PlaySoundFile { file_name, repeat } => {
                w.u8(*repeat as u8);
                w.ascii("file_name", file_name, FILE_NAME_WIDTH)?;
            }

            CommandBody::PlayTone {
                frequency_hz,
                duration_ms,
            } => {
                w.u16((*frequency_hz).clamp(TONE_MIN_FREQUENCY, TONE_MAX_FREQUENCY));
                w.u16((*duration_ms).clamp(TONE_MIN_DURATION, TONE_MAX_DURATION));
            }

            CommandBody::SetOutputState {
                port,
                power,
                mode,
                regulation,
                turn_ratio,
                run_state,
                tacho_limit,
            } => {
                w.check_range("power", *power as i64, MIN_POWER as i64, MAX_POWER as i64)?;
                w.check_range("turn_ratio", *turn_ratio as i64, MIN_POWER as i64, MAX_POWER as i64)?;
                w.u8(port.index())
                    .i8(*power)
                    .u8(mode.0)
                    .u8((*regulation).into())
                    .i8(*turn_ratio)
                    .u8((*run_state).into())
                    .u32(*tacho_limit);
            }

            CommandBody::SetInputMode {
                port,
                sensor_type,
                mode,
            } => {
                w.u8(port.index()).u8((*sensor_type).into()).u8((*mode).into());
            }

            CommandBody::GetOutputState { port } => {
                w.u8(port.index());
            }

            CommandBody::GetInputValues { port }
            | CommandBody::ResetInputScaledValue { port }
            | CommandBody::LsGetStatus { port }
            | CommandBody::LsRead { port } => {
                w.u8(port.index());
            }

            CommandBody::MessageWrite { inbox, message } => {
                w.check_range("inbox", *inbox as i64, 0, MAX_LOCAL_INBOX as i64)?;
                let data = message.as_bytes();
                if data.len() > MAX_MESSAGE_LEN {
                    return Err(EncodeError::FieldTooLong {
                        opcode: OpCode::MessageWrite,
                        field: "message",
                        max: MAX_MESSAGE_LEN,
                        actual: data.len(),
                    });
                }
                // The size byte counts the terminator.
                w.u8(*inbox).u8(data.len() as u8 + 1);
                w.bytes("message", data, MAX_MESSAGE_LEN)?.u8(0);
            }

            CommandBody::ResetMotorPosition { port, relative } => {
                w.u8(port.index()).u8(*relative as u8);
            }

            CommandBody::LsWrite {
                port,
                tx_data,
                rx_len,
            } => {
                w.check_range("rx_len", *rx_len as i64, 0, LS_MAX_DATA as i64)?;
                if tx_data.len() > LS_MAX_DATA {
                    return Err(EncodeError::FieldTooLong {
                        opcode: OpCode::LsWrite,
                        field: "tx_data",
                        max: LS_MAX_DATA,
                        actual: tx_data.len(),
                    });
                }
                w.u8(port.index()).u8(tx_data.len() as u8).u8(*rx_len);
                w.bytes("tx_data", tx_data, LS_MAX_DATA)?;
            }

            CommandBody::MessageRead {
                remote_inbox,
                local_inbox,
                remove,
            } => {
                w.check_range("remote_inbox", *remote_inbox as i64, 0, MAX_REMOTE_INBOX as i64)?;
                w.check_range("local_inbox", *local_inbox as i64, 0, MAX_LOCAL_INBOX as i64)?;
                w.u8(*remote_inbox).u8(*local_inbox).u8(*remove as u8);
            }

            CommandBody::OpenWrite { file_name, size }
            | CommandBody::OpenWriteLinear { file_name, size }
            | CommandBody::OpenWriteData { file_name, size } => {
                w.ascii("file_name", file_name, FILE_NAME_WIDTH)?.u32(*size);
            }

            CommandBody::Read { handle, count } => {
                w.check_range("count", *count as i64, 0, MAX_READ_COUNT as i64)?;
                w.u8(*handle).u16(*count);
            }

            CommandBody::Write { handle, data } => {
                w.u8(*handle);
                w.bytes("data", data, MAX_WRITE_CHUNK)?;
            }

            CommandBody::Close { handle }
            | CommandBody::FindNext { handle }
            | CommandBody::RequestNextModule { handle }
            | CommandBody::CloseModuleHandle { handle } => {
                w.u8(*handle);
            }

            CommandBody::ReadIoMap {
                module_id,
                offset,
                count,
            } => {
                w.check_range("count", *count as i64, 0, MAX_IO_MAP_READ as i64)?;
                w.u32(*module_id).u16(*offset).u16(*count);
            }

            CommandBody::WriteIoMap {
                module_id,
                offset,
                data,
            } => {
                if data.len() > MAX_IO_MAP_WRITE {
                    return Err(EncodeError::FieldTooLong {
                        opcode: OpCode::WriteIoMap,
                        field: "data",
                        max: MAX_IO_MAP_WRITE,
                        actual: data.len(),
                    });
                }
                w.u32(*module_id).u16(*offset).u16(data.len() as u16);
                w.bytes("data", data, MAX_IO_MAP_WRITE)?;
            }

            CommandBody::BootCommand => {
                w.ascii("magic", BOOT_MAGIC, BOOT_FIELD_WIDTH)?;
            }

            CommandBody::SetBrickName { name } => {
                w.ascii("name", name, BRICK_NAME_WIDTH)?;
            }

            CommandBody::PollCommandLength { buffer } => {
                w.u8(*buffer);
            }

            CommandBody::PollCommand { buffer, length } => {
                w.u8(*buffer).u8(*length);
            }
        }
        Ok(())
    }

    /// Parse the opcode-specific fields of a request payload.
    fn decode_fields(opcode: OpCode, r: &FieldReader) -> Result<CommandBody, ProtocolError> {
        let u8_at = |off: usize| r.u8(off).unwrap_or_default();
        let name_at = |off: usize| r.ascii(off, FILE_NAME_WIDTH).unwrap_or_default();
        let sensor = |off: usize, field: &'static str| {
            let value = u8_at(off);
            SensorPort::from_index(value).ok_or(ProtocolError::InvalidField {
                opcode,
                field,
                value,
            })
        };
        let motor = |off: usize| {
            let value = u8_at(off);
            MotorPort::from_index(value).ok_or(ProtocolError::InvalidField {
                opcode,
                field: "port",
                value,
            })
        };

        let body = match opcode {
            OpCode::StartProgram => CommandBody::StartProgram { file_name: name_at(2) },
            OpCode::StopProgram => CommandBody::StopProgram,
            OpCode::PlaySoundFile => CommandBody::PlaySoundFile {
                repeat: u8_at(2) != 0,
                file_name: name_at(3),
            },
            OpCode::PlayTone => CommandBody::PlayTone {
                frequency_hz: r.u16(2).unwrap_or_default(),
                duration_ms: r.u16(4).unwrap_or_default(),
            },
            OpCode::SetOutputState => CommandBody::SetOutputState {
                port: motor(2)?,
                power: r.i8(3).unwrap_or_default(),
                mode: OutputMode(u8_at(4)),
                regulation: u8_at(5).into(),
                turn_ratio: r.i8(6).unwrap_or_default(),
                run_state: u8_at(7).into(),
                tacho_limit: r.u32(8).unwrap_or_default(),
            },
            OpCode::SetInputMode => CommandBody::SetInputMode {
                port: sensor(2, "port")?,
                sensor_type: u8_at(3).into(),
                mode: u8_at(4).into(),
            },
            OpCode::GetOutputState => CommandBody::GetOutputState { port: motor(2)? },
            OpCode::GetInputValues => CommandBody::GetInputValues { port: sensor(2, "port")? },
            OpCode::ResetInputScaledValue => CommandBody::ResetInputScaledValue {
                port: sensor(2, "port")?,
            },
            OpCode::MessageWrite => {
                let size = u8_at(3) as usize;
                let data = r.tail(4, size);
                CommandBody::MessageWrite {
                    inbox: u8_at(2),
                    message: crate::field::decode_ascii(data),
                }
            }
            OpCode::ResetMotorPosition => CommandBody::ResetMotorPosition {
                port: motor(2)?,
                relative: u8_at(3) != 0,
            },
            OpCode::GetBatteryLevel => CommandBody::GetBatteryLevel,
            OpCode::StopSoundPlayback => CommandBody::StopSoundPlayback,
            OpCode::KeepAlive => CommandBody::KeepAlive,
            OpCode::LsGetStatus => CommandBody::LsGetStatus { port: sensor(2, "port")? },
            OpCode::LsWrite => {
                let tx_len = u8_at(3) as usize;
                let tx_data = r.tail(LS_WRITE_HEADER, tx_len);
                if tx_data.len() < tx_len {
                    return Err(ProtocolError::MalformedCommand {
                        opcode,
                        expected: LS_WRITE_HEADER + tx_len,
                        actual: r.len(),
                    });
                }
                CommandBody::LsWrite {
                    port: sensor(2, "port")?,
                    tx_data: tx_data.to_vec(),
                    rx_len: u8_at(4),
                }
            }
            OpCode::LsRead => CommandBody::LsRead { port: sensor(2, "port")? },
            OpCode::GetCurrentProgramName => CommandBody::GetCurrentProgramName,
            OpCode::MessageRead => CommandBody::MessageRead {
                remote_inbox: u8_at(2),
                local_inbox: u8_at(3),
                remove: u8_at(4) != 0,
            },
            OpCode::OpenRead => CommandBody::OpenRead { file_name: name_at(2) },
            OpCode::OpenWrite => CommandBody::OpenWrite {
                file_name: name_at(2),
                size: r.u32(22).unwrap_or_default(),
            },
            OpCode::Read => CommandBody::Read {
                handle: u8_at(2),
                count: r.u16(3).unwrap_or_default(),
            },
            OpCode::Write => CommandBody::Write {
                handle: u8_at(2),
                data: r.tail(3, MAX_WRITE_CHUNK).to_vec(),
            },
            OpCode::Close => CommandBody::Close { handle: u8_at(2) },
            OpCode::Delete => CommandBody::Delete { file_name: name_at(2) },
            OpCode::FindFirst => CommandBody::FindFirst { pattern: name_at(2) },
            OpCode::FindNext => CommandBody::FindNext { handle: u8_at(2) },
            OpCode::GetFirmwareVersion => CommandBody::GetFirmwareVersion,
            OpCode::OpenWriteLinear => CommandBody::OpenWriteLinear {
                file_name: name_at(2),
                size: r.u32(22).unwrap_or_default(),
            },
            OpCode::OpenReadLinear => CommandBody::OpenReadLinear { file_name: name_at(2) },
            OpCode::OpenWriteData => CommandBody::OpenWriteData {
                file_name: name_at(2),
                size: r.u32(22).unwrap_or_default(),
            },
            OpCode::OpenAppendData => CommandBody::OpenAppendData { file_name: name_at(2) },
            OpCode::RequestFirstModule => CommandBody::RequestFirstModule { pattern: name_at(2) },
            OpCode::RequestNextModule => CommandBody::RequestNextModule { handle: u8_at(2) },
            OpCode::CloseModuleHandle => CommandBody::CloseModuleHandle { handle: u8_at(2) },
            OpCode::ReadIoMap => CommandBody::ReadIoMap {
                module_id: r.u32(2).unwrap_or_default(),
                offset: r.u16(6).unwrap_or_default(),
                count: r.u16(8).unwrap_or_default(),
            },
            OpCode::WriteIoMap => {
                let count = r.u16(8).unwrap_or_default() as usize;
                CommandBody::WriteIoMap {
                    module_id: r.u32(2).unwrap_or_default(),
                    offset: r.u16(6).unwrap_or_default(),
                    data: r.tail(10, count).to_vec(),
                }
            }
            OpCode::BootCommand => CommandBody::BootCommand,
            OpCode::SetBrickName => CommandBody::SetBrickName {
                name: r.ascii(2, BRICK_NAME_WIDTH).unwrap_or_default(),
            },
            OpCode::GetDeviceInfo => CommandBody::GetDeviceInfo,
            OpCode::DeleteUserFlash => CommandBody::DeleteUserFlash,
            OpCode::PollCommandLength => CommandBody::PollCommandLength { buffer: u8_at(2) },
            OpCode::PollCommand => CommandBody::PollCommand {
                buffer: u8_at(2),
                length: u8_at(3),
            },
            OpCode::BluetoothFactoryReset => CommandBody::BluetoothFactoryReset,
        };
        Ok(body)
    }
}

/// A command with its reply and retry settings.
///
/// `try_count > 1` always implies `wants_response`, and opcodes whose
/// catalog entry requires a reply always want one. The setters keep both
/// rules intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CommandRepr", into = "CommandRepr")]
pub struct Command {
    body: CommandBody,
    wants_response: bool,
    try_count: u8,
}

impl Command {
    /// Wrap a body with its default reply setting and a single attempt.
    pub fn new(body: CommandBody) -> Self {
        let wants_response = body.opcode().reply_required();
        Command {
            body,
            wants_response,
            try_count: 1,
        }
    }

    /// Builder form of [`Command::set_wants_response`].
    pub fn with_response(mut self, wants_response: bool) -> Self {
        self.set_wants_response(wants_response);
        self
    }

    /// Builder form of [`Command::set_try_count`].
    pub fn with_try_count(mut self, try_count: u8) -> Self {
        self.set_try_count(try_count);
        self
    }

    /// Ask for a reply or not.
    ///
    /// Ignored for opcodes that always reply. Turning replies off resets
    /// the try count to one.
    pub fn set_wants_response(&mut self, wants_response: bool) {
        if self.opcode().reply_required() {
            self.wants_response = true;
            return;
        }
        self.wants_response = wants_response;
        if !wants_response {
            self.try_count = 1;
        }
    }

    /// Set how many times the caller may attempt the command (clamped to 1-20).
    ///
    /// More than one attempt forces a reply, since success cannot be
    /// observed otherwise.
    pub fn set_try_count(&mut self, try_count: u8) {
        self.try_count = try_count.clamp(1, MAX_TRY_COUNT);
        if self.try_count > 1 {
            self.wants_response = true;
        }
    }

    pub fn body(&self) -> &CommandBody {
        &self.body
    }

    pub fn opcode(&self) -> OpCode {
        self.body.opcode()
    }

    pub fn kind(&self) -> CommandKind {
        self.opcode().kind()
    }

    pub fn wants_response(&self) -> bool {
        self.wants_response
    }

    pub fn try_count(&self) -> u8 {
        self.try_count
    }

    /// Kind byte as written to payload byte 0.
    pub fn kind_byte(&self) -> u8 {
        let flag = if self.wants_response { 0 } else { NO_REPLY_FLAG };
        self.kind().bits() | flag
    }

    /// Encode the command payload (without frame header).
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let opcode = self.opcode();
        let mut writer = FieldWriter::new(opcode, self.kind_byte());
        self.body.encode_fields(&mut writer)?;
        let payload = writer.finish()?;
        log::trace!("encoded {} into {} bytes", opcode, payload.len());
        Ok(payload)
    }

    /// Parse a request payload, as a device would.
    pub fn decode(payload: &[u8]) -> Result<Command, ProtocolError> {
        if payload.len() < 2 {
            return Err(ProtocolError::FrameTooShort {
                expected: 2,
                actual: payload.len(),
            });
        }
        let opcode = OpCode::try_from(payload[OPCODE_OFFSET])?;
        let kind_bits = payload[0] & KIND_MASK;
        if kind_bits != opcode.kind().bits() || payload[0] & !(KIND_MASK | NO_REPLY_FLAG) != 0 {
            return Err(ProtocolError::UnexpectedKind(payload[0]));
        }
        let min = opcode.entry().request.min();
        if payload.len() < min {
            return Err(ProtocolError::MalformedCommand {
                opcode,
                expected: min,
                actual: payload.len(),
            });
        }
        let body = CommandBody::decode_fields(opcode, &FieldReader::new(payload))?;
        let mut command = Command::new(body);
        command.set_wants_response(payload[0] & NO_REPLY_FLAG == 0);
        Ok(command)
    }

    // ========================================================================
    // Constructors for common commands
    // ========================================================================

    pub fn battery_level() -> Self {
        Command::new(CommandBody::GetBatteryLevel)
    }

    pub fn keep_alive() -> Self {
        Command::new(CommandBody::KeepAlive)
    }

    pub fn firmware_version() -> Self {
        Command::new(CommandBody::GetFirmwareVersion)
    }

    pub fn device_info() -> Self {
        Command::new(CommandBody::GetDeviceInfo)
    }

    pub fn current_program_name() -> Self {
        Command::new(CommandBody::GetCurrentProgramName)
    }

    pub fn play_tone(frequency_hz: u16, duration_ms: u16) -> Self {
        Command::new(CommandBody::PlayTone {
            frequency_hz,
            duration_ms,
        })
    }

    pub fn input_values(port: SensorPort) -> Self {
        Command::new(CommandBody::GetInputValues { port })
    }

    pub fn output_state(port: MotorPort) -> Self {
        Command::new(CommandBody::GetOutputState { port })
    }

    /// Read the four button state bytes from the UI module.
    pub fn button_state() -> Self {
        Command::new(CommandBody::ReadIoMap {
            module_id: UI_MODULE_ID,
            offset: BUTTON_STATE_OFFSET,
            count: BUTTON_STATE_LEN,
        })
    }

    pub fn find_first(pattern: impl Into<String>) -> Self {
        Command::new(CommandBody::FindFirst {
            pattern: pattern.into(),
        })
    }

    pub fn find_next(handle: u8) -> Self {
        Command::new(CommandBody::FindNext { handle })
    }

    pub fn close(handle: u8) -> Self {
        Command::new(CommandBody::Close { handle })
    }

    pub fn ls_write(port: SensorPort, tx_data: Vec<u8>, rx_len: u8) -> Self {
        Command::new(CommandBody::LsWrite {
            port,
            tx_data,
            rx_len,
        })
        .with_response(true)
    }

    pub fn ls_status(port: SensorPort) -> Self {
        Command::new(CommandBody::LsGetStatus { port })
    }

    pub fn ls_read(port: SensorPort) -> Self {
        Command::new(CommandBody::LsRead { port })
    }
}

impl From<CommandBody> for Command {
    fn from(body: CommandBody) -> Self {
        Command::new(body)
    }
}

/// Serialized form of [`Command`]; normalized through the setters on load.
#[derive(Serialize, Deserialize)]
struct CommandRepr {
    #[serde(flatten)]
    body: CommandBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wants_response: Option<bool>,
    #[serde(default = "default_try_count")]
    try_count: u8,
}

fn default_try_count() -> u8 {
    1
}

impl From<CommandRepr> for Command {
    fn from(repr: CommandRepr) -> Self {
        let mut command = Command::new(repr.body);
        if let Some(wants_response) = repr.wants_response {
            command.set_wants_response(wants_response);
        }
        command.set_try_count(repr.try_count);
        command
    }
}

impl From<Command> for CommandRepr {
    fn from(command: Command) -> Self {
        CommandRepr {
            body: command.body,
            wants_response: Some(command.wants_response),
            try_count: command.try_count,
        }
    }
}
