//! Host-side link to an NXT brick.
//!
//! A [`Session`] owns one byte channel and runs the single-outstanding
//! request/reply exchange on top of it. The [`LowSpeedController`] and the
//! [`SequenceRunner`] are built purely on [`Session::execute`].
//!
//! ## Key Types
//!
//! - [`Session`]: open channel plus the request/reply state machine
//! - [`Transport`]: the byte channel seam; [`SerialTransport`] for real ports,
//!   [`loopback::pair`] for scripted tests
//! - [`LowSpeedController`]: write-poll-read exchanges with I2C devices
//! - [`SequenceRunner`]: replays a [`CommandSequence`] once or periodically

mod error;
pub mod loopback;
mod lowspeed;
mod sequence;
mod session;
mod transport;

pub use error::*;
pub use lowspeed::*;
pub use sequence::*;
pub use session::*;
pub use transport::*;

pub use nxt_protocol as protocol;
