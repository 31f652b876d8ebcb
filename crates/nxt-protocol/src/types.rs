//! Protocol data types.

use crate::constants::*;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Coarse command category carried in bits 0-1 of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Direct commands act on motors, sensors and the running program.
    Direct,
    /// System commands act on the filesystem and firmware.
    System,
}

impl CommandKind {
    /// Kind bits as written to byte 0.
    pub const fn bits(self) -> u8 {
        match self {
            CommandKind::Direct => KIND_DIRECT,
            CommandKind::System => KIND_SYSTEM,
        }
    }
}

/// One-byte code identifying a command/reply shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    StartProgram,
    StopProgram,
    PlaySoundFile,
    PlayTone,
    SetOutputState,
    SetInputMode,
    GetOutputState,
    GetInputValues,
    ResetInputScaledValue,
    MessageWrite,
    ResetMotorPosition,
    GetBatteryLevel,
    StopSoundPlayback,
    KeepAlive,
    LsGetStatus,
    LsWrite,
    LsRead,
    GetCurrentProgramName,
    MessageRead,
    OpenRead,
    OpenWrite,
    Read,
    Write,
    Close,
    Delete,
    FindFirst,
    FindNext,
    GetFirmwareVersion,
    OpenWriteLinear,
    OpenReadLinear,
    OpenWriteData,
    OpenAppendData,
    RequestFirstModule,
    RequestNextModule,
    CloseModuleHandle,
    ReadIoMap,
    WriteIoMap,
    BootCommand,
    SetBrickName,
    GetDeviceInfo,
    DeleteUserFlash,
    PollCommandLength,
    PollCommand,
    BluetoothFactoryReset,
}

impl OpCode {
    /// Every opcode, in wire order.
    pub const ALL: [OpCode; 44] = [
        OpCode::StartProgram,
        OpCode::StopProgram,
        OpCode::PlaySoundFile,
        OpCode::PlayTone,
        OpCode::SetOutputState,
        OpCode::SetInputMode,
        OpCode::GetOutputState,
        OpCode::GetInputValues,
        OpCode::ResetInputScaledValue,
        OpCode::MessageWrite,
        OpCode::ResetMotorPosition,
        OpCode::GetBatteryLevel,
        OpCode::StopSoundPlayback,
        OpCode::KeepAlive,
        OpCode::LsGetStatus,
        OpCode::LsWrite,
        OpCode::LsRead,
        OpCode::GetCurrentProgramName,
        OpCode::MessageRead,
        OpCode::OpenRead,
        OpCode::OpenWrite,
        OpCode::Read,
        OpCode::Write,
        OpCode::Close,
        OpCode::Delete,
        OpCode::FindFirst,
        OpCode::FindNext,
        OpCode::GetFirmwareVersion,
        OpCode::OpenWriteLinear,
        OpCode::OpenReadLinear,
        OpCode::OpenWriteData,
        OpCode::OpenAppendData,
        OpCode::RequestFirstModule,
        OpCode::RequestNextModule,
        OpCode::CloseModuleHandle,
        OpCode::ReadIoMap,
        OpCode::WriteIoMap,
        OpCode::BootCommand,
        OpCode::SetBrickName,
        OpCode::GetDeviceInfo,
        OpCode::DeleteUserFlash,
        OpCode::PollCommandLength,
        OpCode::PollCommand,
        OpCode::BluetoothFactoryReset,
    ];

    /// Opcode byte.
    pub const fn code(self) -> u8 {
        match self {
            OpCode::StartProgram => OP_START_PROGRAM,
            OpCode::StopProgram => OP_STOP_PROGRAM,
            OpCode::PlaySoundFile => OP_PLAY_SOUND_FILE,
            OpCode::PlayTone => OP_PLAY_TONE,
            OpCode::SetOutputState => OP_SET_OUTPUT_STATE,
            OpCode::SetInputMode => OP_SET_INPUT_MODE,
            OpCode::GetOutputState => OP_GET_OUTPUT_STATE,
            OpCode::GetInputValues => OP_GET_INPUT_VALUES,
            OpCode::ResetInputScaledValue => OP_RESET_INPUT_SCALED_VALUE,
            OpCode::MessageWrite => OP_MESSAGE_WRITE,
            OpCode::ResetMotorPosition => OP_RESET_MOTOR_POSITION,
            OpCode::GetBatteryLevel => OP_GET_BATTERY_LEVEL,
            OpCode::StopSoundPlayback => OP_STOP_SOUND_PLAYBACK,
            OpCode::KeepAlive => OP_KEEP_ALIVE,
            OpCode::LsGetStatus => OP_LS_GET_STATUS,
            OpCode::LsWrite => OP_LS_WRITE,
            OpCode::LsRead => OP_LS_READ,
            OpCode::GetCurrentProgramName => OP_GET_CURRENT_PROGRAM_NAME,
            OpCode::MessageRead => OP_MESSAGE_READ,
            OpCode::OpenRead => OP_OPEN_READ,
            OpCode::OpenWrite => OP_OPEN_WRITE,
            OpCode::Read => OP_READ,
            OpCode::Write => OP_WRITE,
            OpCode::Close => OP_CLOSE,
            OpCode::Delete => OP_DELETE,
            OpCode::FindFirst => OP_FIND_FIRST,
            OpCode::FindNext => OP_FIND_NEXT,
            OpCode::GetFirmwareVersion => OP_GET_FIRMWARE_VERSION,
            OpCode::OpenWriteLinear => OP_OPEN_WRITE_LINEAR,
            OpCode::OpenReadLinear => OP_OPEN_READ_LINEAR,
            OpCode::OpenWriteData => OP_OPEN_WRITE_DATA,
            OpCode::OpenAppendData => OP_OPEN_APPEND_DATA,
            OpCode::RequestFirstModule => OP_REQUEST_FIRST_MODULE,
            OpCode::RequestNextModule => OP_REQUEST_NEXT_MODULE,
            OpCode::CloseModuleHandle => OP_CLOSE_MODULE_HANDLE,
            OpCode::ReadIoMap => OP_READ_IO_MAP,
            OpCode::WriteIoMap => OP_WRITE_IO_MAP,
            OpCode::BootCommand => OP_BOOT_COMMAND,
            OpCode::SetBrickName => OP_SET_BRICK_NAME,
            OpCode::GetDeviceInfo => OP_GET_DEVICE_INFO,
            OpCode::DeleteUserFlash => OP_DELETE_USER_FLASH,
            OpCode::PollCommandLength => OP_POLL_COMMAND_LENGTH,
            OpCode::PollCommand => OP_POLL_COMMAND,
            OpCode::BluetoothFactoryReset => OP_BLUETOOTH_FACTORY_RESET,
        }
    }

    /// Look up an opcode byte.
    pub fn from_code(code: u8) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Command kind this opcode is sent with.
    pub const fn kind(self) -> CommandKind {
        if self.code() & 0x80 != 0 {
            CommandKind::System
        } else {
            CommandKind::Direct
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        OpCode::from_code(code).ok_or(ProtocolError::UnknownOpcode(code))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.code()
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.code())
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Sensor input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorPort {
    S1,
    S2,
    S3,
    S4,
}

impl SensorPort {
    /// Zero-based port index as sent on the wire.
    pub const fn index(self) -> u8 {
        match self {
            SensorPort::S1 => 0,
            SensorPort::S2 => 1,
            SensorPort::S3 => 2,
            SensorPort::S4 => 3,
        }
    }

    /// Port for a wire index.
    pub fn from_index(index: u8) -> Option<SensorPort> {
        match index {
            0 => Some(SensorPort::S1),
            1 => Some(SensorPort::S2),
            2 => Some(SensorPort::S3),
            3 => Some(SensorPort::S4),
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.index() + 1)
    }
}

impl std::str::FromStr for SensorPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches(['s', 'S']);
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(SensorPort::from_index)
            .ok_or_else(|| format!("invalid sensor port `{}` (expected 1-4)", s))
    }
}

/// Motor output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorPort {
    A,
    B,
    C,
    /// Broadcast to every output; only valid for set commands.
    All,
}

impl MotorPort {
    /// Port byte as sent on the wire.
    pub const fn index(self) -> u8 {
        match self {
            MotorPort::A => 0,
            MotorPort::B => 1,
            MotorPort::C => 2,
            MotorPort::All => 0xFF,
        }
    }

    /// Port for a wire byte.
    pub fn from_index(index: u8) -> Option<MotorPort> {
        match index {
            0 => Some(MotorPort::A),
            1 => Some(MotorPort::B),
            2 => Some(MotorPort::C),
            0xFF => Some(MotorPort::All),
            _ => None,
        }
    }
}

impl std::str::FromStr for MotorPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(MotorPort::A),
            "B" => Ok(MotorPort::B),
            "C" => Ok(MotorPort::C),
            "ALL" => Ok(MotorPort::All),
            _ => Err(format!("invalid motor port `{}` (expected A, B, C or all)", s)),
        }
    }
}

// ============================================================================
// Sensor Configuration
// ============================================================================

/// Sensor type configured on an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    NoSensor,
    Switch,
    Temperature,
    Reflection,
    Angle,
    LightActive,
    LightInactive,
    SoundDb,
    SoundDba,
    Custom,
    LowSpeed,
    LowSpeed9V,
    HighSpeed,
    ColorFull,
    ColorRed,
    ColorGreen,
    ColorBlue,
    ColorNone,
    /// Type byte outside the known table.
    Unknown(u8),
}

impl From<u8> for SensorType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => SensorType::NoSensor,
            0x01 => SensorType::Switch,
            0x02 => SensorType::Temperature,
            0x03 => SensorType::Reflection,
            0x04 => SensorType::Angle,
            0x05 => SensorType::LightActive,
            0x06 => SensorType::LightInactive,
            0x07 => SensorType::SoundDb,
            0x08 => SensorType::SoundDba,
            0x09 => SensorType::Custom,
            0x0A => SensorType::LowSpeed,
            0x0B => SensorType::LowSpeed9V,
            0x0C => SensorType::HighSpeed,
            0x0D => SensorType::ColorFull,
            0x0E => SensorType::ColorRed,
            0x0F => SensorType::ColorGreen,
            0x10 => SensorType::ColorBlue,
            0x11 => SensorType::ColorNone,
            other => SensorType::Unknown(other),
        }
    }
}

impl From<SensorType> for u8 {
    fn from(value: SensorType) -> Self {
        match value {
            SensorType::NoSensor => 0x00,
            SensorType::Switch => 0x01,
            SensorType::Temperature => 0x02,
            SensorType::Reflection => 0x03,
            SensorType::Angle => 0x04,
            SensorType::LightActive => 0x05,
            SensorType::LightInactive => 0x06,
            SensorType::SoundDb => 0x07,
            SensorType::SoundDba => 0x08,
            SensorType::Custom => 0x09,
            SensorType::LowSpeed => 0x0A,
            SensorType::LowSpeed9V => 0x0B,
            SensorType::HighSpeed => 0x0C,
            SensorType::ColorFull => 0x0D,
            SensorType::ColorRed => 0x0E,
            SensorType::ColorGreen => 0x0F,
            SensorType::ColorBlue => 0x10,
            SensorType::ColorNone => 0x11,
            SensorType::Unknown(other) => other,
        }
    }
}

/// Translation applied by the brick to raw sensor readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorTranslation {
    Raw,
    Boolean,
    TransitionCount,
    PeriodCounter,
    PercentFullScale,
    Celsius,
    Fahrenheit,
    AngleSteps,
}

/// Sensor mode byte: translation in the top three bits, slope in the low
/// five.
///
/// In YAML a mode is either a bare translation (`boolean`) or a map with
/// `translation` and `slope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SensorModeRepr", into = "SensorModeRepr")]
pub struct SensorMode {
    pub translation: SensorTranslation,
    slope: u8,
}

impl SensorMode {
    /// Bits of the mode byte that select the translation.
    pub const MODE_MASK: u8 = 0xE0;
    /// Bits of the mode byte that hold the slope.
    pub const SLOPE_MASK: u8 = 0x1F;

    pub const fn new(translation: SensorTranslation) -> Self {
        SensorMode {
            translation,
            slope: 0,
        }
    }

    /// Set the slope; bits above [`SensorMode::SLOPE_MASK`] are dropped.
    pub const fn with_slope(mut self, slope: u8) -> Self {
        self.slope = slope & SensorMode::SLOPE_MASK;
        self
    }

    pub fn slope(&self) -> u8 {
        self.slope
    }
}

impl From<SensorTranslation> for SensorMode {
    fn from(translation: SensorTranslation) -> Self {
        SensorMode::new(translation)
    }
}

impl From<u8> for SensorMode {
    fn from(value: u8) -> Self {
        let translation = match value & SensorMode::MODE_MASK {
            0x00 => SensorTranslation::Raw,
            0x20 => SensorTranslation::Boolean,
            0x40 => SensorTranslation::TransitionCount,
            0x60 => SensorTranslation::PeriodCounter,
            0x80 => SensorTranslation::PercentFullScale,
            0xA0 => SensorTranslation::Celsius,
            0xC0 => SensorTranslation::Fahrenheit,
            _ => SensorTranslation::AngleSteps,
        };
        SensorMode::new(translation).with_slope(value)
    }
}

impl From<SensorMode> for u8 {
    fn from(value: SensorMode) -> Self {
        let bits = match value.translation {
            SensorTranslation::Raw => 0x00,
            SensorTranslation::Boolean => 0x20,
            SensorTranslation::TransitionCount => 0x40,
            SensorTranslation::PeriodCounter => 0x60,
            SensorTranslation::PercentFullScale => 0x80,
            SensorTranslation::Celsius => 0xA0,
            SensorTranslation::Fahrenheit => 0xC0,
            SensorTranslation::AngleSteps => 0xE0,
        };
        bits | value.slope
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SensorModeRepr {
    Plain(SensorTranslation),
    Sloped {
        translation: SensorTranslation,
        #[serde(default)]
        slope: u8,
    },
}

impl From<SensorModeRepr> for SensorMode {
    fn from(repr: SensorModeRepr) -> Self {
        match repr {
            SensorModeRepr::Plain(translation) => SensorMode::new(translation),
            SensorModeRepr::Sloped { translation, slope } => {
                SensorMode::new(translation).with_slope(slope)
            }
        }
    }
}

impl From<SensorMode> for SensorModeRepr {
    fn from(mode: SensorMode) -> Self {
        if mode.slope == 0 {
            SensorModeRepr::Plain(mode.translation)
        } else {
            SensorModeRepr::Sloped {
                translation: mode.translation,
                slope: mode.slope,
            }
        }
    }
}

// ============================================================================
// Motor Configuration
// ============================================================================

/// Output mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputMode(pub u8);

impl OutputMode {
    pub const NONE: OutputMode = OutputMode(0x00);
    pub const MOTOR_ON: OutputMode = OutputMode(0x01);
    pub const BRAKE: OutputMode = OutputMode(0x02);
    pub const REGULATED: OutputMode = OutputMode(0x04);

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: OutputMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    pub const fn with(self, other: OutputMode) -> OutputMode {
        OutputMode(self.0 | other.0)
    }
}

impl std::ops::BitOr for OutputMode {
    type Output = OutputMode;

    fn bitor(self, rhs: OutputMode) -> OutputMode {
        self.with(rhs)
    }
}

/// Motor regulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    Idle,
    /// Speed regulation of a single output.
    Individual,
    /// Two outputs kept in step.
    Synchronized,
    Unknown(u8),
}

impl From<u8> for RegulationMode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => RegulationMode::Idle,
            0x01 => RegulationMode::Individual,
            0x02 => RegulationMode::Synchronized,
            other => RegulationMode::Unknown(other),
        }
    }
}

impl From<RegulationMode> for u8 {
    fn from(value: RegulationMode) -> Self {
        match value {
            RegulationMode::Idle => 0x00,
            RegulationMode::Individual => 0x01,
            RegulationMode::Synchronized => 0x02,
            RegulationMode::Unknown(other) => other,
        }
    }
}

/// Motor run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    RampUp,
    Running,
    RampDown,
    Unknown(u8),
}

impl From<u8> for RunState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => RunState::Idle,
            0x10 => RunState::RampUp,
            0x20 => RunState::Running,
            0x40 => RunState::RampDown,
            other => RunState::Unknown(other),
        }
    }
}

impl From<RunState> for u8 {
    fn from(value: RunState) -> Self {
        match value {
            RunState::Idle => 0x00,
            RunState::RampUp => 0x10,
            RunState::Running => 0x20,
            RunState::RampDown => 0x40,
            RunState::Unknown(other) => other,
        }
    }
}

// ============================================================================
// Buttons
// ============================================================================

/// The four brick buttons, as read from the UI module's IO map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonState {
    pub cancel: bool,
    pub right: bool,
    pub left: bool,
    pub enter: bool,
}

impl ButtonState {
    /// Interpret the four state bytes at the button offset.
    ///
    /// Returns `None` when fewer than four bytes are available.
    pub fn from_io_map(data: &[u8]) -> Option<ButtonState> {
        if data.len() < BUTTON_STATE_LEN as usize {
            return None;
        }
        let pressed = |b: u8| b & BUTTON_PRESSED_BIT != 0;
        Some(ButtonState {
            cancel: pressed(data[0]),
            right: pressed(data[1]),
            left: pressed(data[2]),
            enter: pressed(data[3]),
        })
    }

    /// True when any button is held.
    pub fn any(&self) -> bool {
        self.cancel || self.right || self.left || self.enter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_codes_are_unique() {
        for (i, a) in OpCode::ALL.iter().enumerate() {
            for b in &OpCode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{:?} and {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_opcode_lookup() {
        assert_eq!(OpCode::from_code(0x0B), Some(OpCode::GetBatteryLevel));
        assert_eq!(OpCode::from_code(0x12), None);
        assert_eq!(OpCode::try_from(0x12), Err(ProtocolError::UnknownOpcode(0x12)));
        assert_eq!(OpCode::GetBatteryLevel.kind(), CommandKind::Direct);
        assert_eq!(OpCode::ReadIoMap.kind(), CommandKind::System);
    }

    #[test]
    fn test_port_parsing() {
        assert_eq!("1".parse::<SensorPort>(), Ok(SensorPort::S1));
        assert_eq!("S4".parse::<SensorPort>(), Ok(SensorPort::S4));
        assert!("5".parse::<SensorPort>().is_err());
        assert_eq!("b".parse::<MotorPort>(), Ok(MotorPort::B));
        assert_eq!(MotorPort::from_index(0xFF), Some(MotorPort::All));
    }

    #[test]
    fn test_sensor_mode_keeps_slope() {
        let mode = SensorMode::from(0x85);
        assert_eq!(mode.translation, SensorTranslation::PercentFullScale);
        assert_eq!(mode.slope(), 0x05);
        assert_eq!(u8::from(mode), 0x85);

        for byte in 0..=u8::MAX {
            assert_eq!(u8::from(SensorMode::from(byte)), byte);
        }
        assert_eq!(u8::from(SensorMode::new(SensorTranslation::Celsius)), 0xA0);
        assert_eq!(
            u8::from(SensorMode::new(SensorTranslation::Raw).with_slope(0xFF)),
            0x1F
        );
    }

    #[test]
    fn test_sensor_mode_yaml_forms() {
        let plain: SensorMode = serde_yaml::from_str("boolean").unwrap();
        assert_eq!(plain, SensorMode::new(SensorTranslation::Boolean));

        let sloped: SensorMode =
            serde_yaml::from_str("translation: transition_count\nslope: 3").unwrap();
        assert_eq!(u8::from(sloped), 0x43);
        assert_eq!(serde_yaml::to_string(&plain).unwrap().trim(), "boolean");
    }

    #[test]
    fn test_unknown_enum_values_round_trip() {
        assert_eq!(u8::from(SensorType::from(0x30)), 0x30);
        assert_eq!(u8::from(RunState::from(0x33)), 0x33);
        assert_eq!(u8::from(RegulationMode::from(0x07)), 0x07);
    }

    #[test]
    fn test_button_state() {
        let state = ButtonState::from_io_map(&[0x80, 0x00, 0x00, 0x81]).unwrap();
        assert!(state.cancel);
        assert!(!state.right);
        assert!(state.enter);
        assert!(ButtonState::from_io_map(&[0x80, 0x00]).is_none());
    }
}
