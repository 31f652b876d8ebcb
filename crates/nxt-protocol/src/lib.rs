//! NXT brick protocol codec
//!
//! This crate maps typed commands and replies of the NXT brick protocol onto
//! their fixed-layout byte buffers. It performs no I/O; the `nxt-link` crate
//! owns the serial channel.
//!
//! # Protocol Overview
//!
//! Every exchange is a single request followed by at most one reply:
//!
//! - **Direct commands** (kind `0x00`): motors, sensors, mailboxes, the
//!   low-speed bus and the running program
//! - **System commands** (kind `0x01`): filesystem, firmware modules and
//!   device settings
//! - **Replies** (kind `0x02`): echo the opcode and carry a status byte
//!
//! Setting bit 7 of the kind byte asks the brick not to reply. On the wire
//! each payload is prefixed with its 2-byte little-endian length.
//!
//! # Example
//!
//! ```rust
//! use nxt_protocol::{Command, OpCode, Response, ResponseBody};
//!
//! let payload = Command::battery_level().encode().unwrap();
//! assert_eq!(payload, [0x00, 0x0B]);
//!
//! let reply = Response::decode(OpCode::GetBatteryLevel, &[0x02, 0x0B, 0x00, 0xE8, 0x13]).unwrap();
//! if let ResponseBody::BatteryLevel(level) = reply.body {
//!     assert_eq!(level.millivolts, Some(5096));
//! }
//! ```

mod catalog;
mod commands;
mod constants;
mod error;
mod field;
mod frame;
mod lowspeed;
mod responses;
mod types;

pub use catalog::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use field::{decode_ascii, encode_ascii};
pub use frame::*;
pub use lowspeed::*;
pub use responses::*;
pub use types::*;
