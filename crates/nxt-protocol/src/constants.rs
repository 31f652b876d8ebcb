//! Protocol constants
//!
//! Opcodes, kind bits, status codes and field widths used by the brick
//! protocol. Offsets are relative to the start of the payload (after the
//! two-byte frame header).

// ============================================================================
// Framing and Header Bytes
// ============================================================================

/// Size of the little-endian length prefix in front of every payload.
pub const FRAME_HEADER_SIZE: usize = 2;
/// Largest payload the device accepts or produces.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Byte 0 kind: direct command.
pub const KIND_DIRECT: u8 = 0x00;
/// Byte 0 kind: system command.
pub const KIND_SYSTEM: u8 = 0x01;
/// Byte 0 kind: reply from the device.
pub const KIND_REPLY: u8 = 0x02;
/// Mask selecting the kind bits of byte 0.
pub const KIND_MASK: u8 = 0x03;
/// Byte 0 flag asking the device not to reply.
pub const NO_REPLY_FLAG: u8 = 0x80;

/// Offset of the opcode in both commands and replies.
pub const OPCODE_OFFSET: usize = 1;
/// Offset of the status byte in replies.
pub const STATUS_OFFSET: usize = 2;
/// Smallest well-formed reply: kind, opcode, status.
pub const MIN_REPLY_SIZE: usize = 3;

// ============================================================================
// Direct Command Opcodes
// ============================================================================

/// Start a program stored on the brick.
pub const OP_START_PROGRAM: u8 = 0x00;
/// Stop the running program.
pub const OP_STOP_PROGRAM: u8 = 0x01;
/// Play a sound file stored on the brick.
pub const OP_PLAY_SOUND_FILE: u8 = 0x02;
/// Play a tone.
pub const OP_PLAY_TONE: u8 = 0x03;
/// Configure an output port.
pub const OP_SET_OUTPUT_STATE: u8 = 0x04;
/// Configure a sensor port.
pub const OP_SET_INPUT_MODE: u8 = 0x05;
/// Read an output port.
pub const OP_GET_OUTPUT_STATE: u8 = 0x06;
/// Read a sensor port.
pub const OP_GET_INPUT_VALUES: u8 = 0x07;
/// Reset the scaled value of a sensor port.
pub const OP_RESET_INPUT_SCALED_VALUE: u8 = 0x08;
/// Write to a program mailbox.
pub const OP_MESSAGE_WRITE: u8 = 0x09;
/// Reset a motor tachometer.
pub const OP_RESET_MOTOR_POSITION: u8 = 0x0A;
/// Read the battery level.
pub const OP_GET_BATTERY_LEVEL: u8 = 0x0B;
/// Stop sound playback.
pub const OP_STOP_SOUND_PLAYBACK: u8 = 0x0C;
/// Keep the brick awake.
pub const OP_KEEP_ALIVE: u8 = 0x0D;
/// Query bytes ready on the low-speed bus.
pub const OP_LS_GET_STATUS: u8 = 0x0E;
/// Write to the low-speed bus.
pub const OP_LS_WRITE: u8 = 0x0F;
/// Read from the low-speed bus.
pub const OP_LS_READ: u8 = 0x10;
/// Name of the running program.
pub const OP_GET_CURRENT_PROGRAM_NAME: u8 = 0x11;
/// Read from a program mailbox.
pub const OP_MESSAGE_READ: u8 = 0x13;

// ============================================================================
// System Command Opcodes
// ============================================================================

/// Open a file for reading.
pub const OP_OPEN_READ: u8 = 0x80;
/// Open a fragmented file for writing.
pub const OP_OPEN_WRITE: u8 = 0x81;
/// Read from an open file.
pub const OP_READ: u8 = 0x82;
/// Write to an open file.
pub const OP_WRITE: u8 = 0x83;
/// Close a file handle.
pub const OP_CLOSE: u8 = 0x84;
/// Delete a file.
pub const OP_DELETE: u8 = 0x85;
/// Start a file search.
pub const OP_FIND_FIRST: u8 = 0x86;
/// Continue a file search.
pub const OP_FIND_NEXT: u8 = 0x87;
/// Protocol and firmware versions.
pub const OP_GET_FIRMWARE_VERSION: u8 = 0x88;
/// Open a linear file for writing.
pub const OP_OPEN_WRITE_LINEAR: u8 = 0x89;
/// Open a linear file for reading.
pub const OP_OPEN_READ_LINEAR: u8 = 0x8A;
/// Open a data file for writing.
pub const OP_OPEN_WRITE_DATA: u8 = 0x8B;
/// Open a data file for appending.
pub const OP_OPEN_APPEND_DATA: u8 = 0x8C;
/// Start a firmware module search.
pub const OP_REQUEST_FIRST_MODULE: u8 = 0x90;
/// Continue a firmware module search.
pub const OP_REQUEST_NEXT_MODULE: u8 = 0x91;
/// Close a module search handle.
pub const OP_CLOSE_MODULE_HANDLE: u8 = 0x92;
/// Read a module's IO map.
pub const OP_READ_IO_MAP: u8 = 0x94;
/// Write a module's IO map.
pub const OP_WRITE_IO_MAP: u8 = 0x95;
/// Reboot into the firmware update loader.
pub const OP_BOOT_COMMAND: u8 = 0x97;
/// Rename the brick.
pub const OP_SET_BRICK_NAME: u8 = 0x98;
/// Name, address and free memory.
pub const OP_GET_DEVICE_INFO: u8 = 0x9B;
/// Erase user flash.
pub const OP_DELETE_USER_FLASH: u8 = 0xA0;
/// Length of a pending command in a poll buffer.
pub const OP_POLL_COMMAND_LENGTH: u8 = 0xA1;
/// Read a pending command from a poll buffer.
pub const OP_POLL_COMMAND: u8 = 0xA2;
/// Reset the Bluetooth module to factory settings.
pub const OP_BLUETOOTH_FACTORY_RESET: u8 = 0xA4;

// ============================================================================
// Status Codes (reply byte 2)
// ============================================================================

pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_PENDING_COMMUNICATION: u8 = 0x20;
pub const STATUS_MAILBOX_EMPTY: u8 = 0x40;
pub const STATUS_NO_MORE_HANDLES: u8 = 0x81;
pub const STATUS_NO_SPACE: u8 = 0x82;
pub const STATUS_NO_MORE_FILES: u8 = 0x83;
pub const STATUS_END_OF_FILE_EXPECTED: u8 = 0x84;
pub const STATUS_END_OF_FILE: u8 = 0x85;
pub const STATUS_NOT_A_LINEAR_FILE: u8 = 0x86;
pub const STATUS_FILE_NOT_FOUND: u8 = 0x87;
pub const STATUS_HANDLE_ALREADY_CLOSED: u8 = 0x88;
pub const STATUS_NO_LINEAR_SPACE: u8 = 0x89;
pub const STATUS_UNDEFINED_ERROR: u8 = 0x8A;
pub const STATUS_FILE_IS_BUSY: u8 = 0x8B;
pub const STATUS_NO_WRITE_BUFFERS: u8 = 0x8C;
pub const STATUS_APPEND_NOT_POSSIBLE: u8 = 0x8D;
pub const STATUS_FILE_IS_FULL: u8 = 0x8E;
pub const STATUS_FILE_EXISTS: u8 = 0x8F;
pub const STATUS_MODULE_NOT_FOUND: u8 = 0x90;
pub const STATUS_OUT_OF_BOUNDARY: u8 = 0x91;
pub const STATUS_ILLEGAL_FILE_NAME: u8 = 0x92;
pub const STATUS_ILLEGAL_HANDLE: u8 = 0x93;
pub const STATUS_REQUEST_FAILED_FILE_NOT_FOUND: u8 = 0xBD;
pub const STATUS_UNKNOWN_COMMAND_OPCODE: u8 = 0xBE;
pub const STATUS_INSANE_PACKET: u8 = 0xBF;
pub const STATUS_DATA_OUT_OF_RANGE: u8 = 0xC0;
pub const STATUS_COMMUNICATION_BUS_ERROR: u8 = 0xDD;
pub const STATUS_NO_FREE_COMMUNICATION_BUFFER: u8 = 0xDE;
pub const STATUS_CHANNEL_NOT_VALID: u8 = 0xDF;
pub const STATUS_CHANNEL_NOT_CONFIGURED_OR_BUSY: u8 = 0xE0;
pub const STATUS_NO_ACTIVE_PROGRAM: u8 = 0xEC;
pub const STATUS_ILLEGAL_SIZE: u8 = 0xED;
pub const STATUS_ILLEGAL_MAILBOX: u8 = 0xEE;
pub const STATUS_INVALID_FIELD: u8 = 0xEF;
pub const STATUS_BAD_INPUT_OUTPUT: u8 = 0xF0;
pub const STATUS_INSUFFICIENT_MEMORY: u8 = 0xFB;
pub const STATUS_BAD_ARGUMENTS: u8 = 0xFF;

// ============================================================================
// Field Widths and Limits
// ============================================================================

/// File names: 15.3 characters plus terminator.
pub const FILE_NAME_WIDTH: usize = 20;
/// Brick name field in SetBrickName.
pub const BRICK_NAME_WIDTH: usize = 16;
/// Brick name field in the GetDeviceInfo reply.
pub const DEVICE_NAME_WIDTH: usize = 15;
/// Bluetooth address bytes in the GetDeviceInfo reply.
pub const BLUETOOTH_ADDRESS_WIDTH: usize = 7;
/// Width of the boot handshake field.
pub const BOOT_FIELD_WIDTH: usize = 19;
/// Width of the boot handshake reply.
pub const BOOT_REPLY_WIDTH: usize = 4;
/// Fixed string that must accompany a boot command.
pub const BOOT_MAGIC: &str = "Let's dance: SAMBA";

/// Mailbox data window in a MessageRead reply.
pub const MESSAGE_WINDOW: usize = 59;
/// Longest mailbox message, excluding the terminator.
pub const MAX_MESSAGE_LEN: usize = 58;
/// Highest local inbox index.
pub const MAX_LOCAL_INBOX: u8 = 9;
/// Highest remote inbox index.
pub const MAX_REMOTE_INBOX: u8 = 19;

/// Low-speed transmit and receive limit.
pub const LS_MAX_DATA: usize = 16;
/// Bytes in front of the transmit data of a LsWrite command.
pub const LS_WRITE_HEADER: usize = 5;

/// Tone frequency bounds in Hz.
pub const TONE_MIN_FREQUENCY: u16 = 200;
pub const TONE_MAX_FREQUENCY: u16 = 14_000;
/// Tone duration bounds in milliseconds.
pub const TONE_MIN_DURATION: u16 = 1;
pub const TONE_MAX_DURATION: u16 = 30_000;

/// Motor power bounds.
pub const MIN_POWER: i8 = -100;
pub const MAX_POWER: i8 = 100;

// ============================================================================
// Well-known Module Addresses
// ============================================================================

/// Module id of the user interface module.
pub const UI_MODULE_ID: u32 = 0x0004_0001;
/// IO map offset of the four button state bytes.
pub const BUTTON_STATE_OFFSET: u16 = 0x20;
/// Number of button state bytes.
pub const BUTTON_STATE_LEN: u16 = 4;
/// Bit set in a button state byte while the button is held.
pub const BUTTON_PRESSED_BIT: u8 = 0x80;

// ============================================================================
// Low-speed (I2C) Devices
// ============================================================================

/// Default secondary address of digital sensors.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x02;
/// Register holding the manufacturer and sensor type strings.
pub const I2C_REG_IDENTITY: u8 = 0x08;
/// Length of the identity block.
pub const I2C_IDENTITY_LEN: u8 = 16;
/// Width of each identity string.
pub const I2C_IDENTITY_FIELD: usize = 8;

/// Ultrasonic sensor: factory zero calibration value.
pub const SONAR_REG_FACTORY_ZERO: u8 = 0x11;
/// Ultrasonic sensor: continuous measurement interval.
pub const SONAR_REG_MEASUREMENT_INTERVAL: u8 = 0x40;
/// Ultrasonic sensor: command state.
pub const SONAR_REG_COMMAND_STATE: u8 = 0x41;
/// Ultrasonic sensor: first distance reading.
pub const SONAR_REG_MEASUREMENT_1: u8 = 0x42;
