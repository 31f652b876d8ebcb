//! Requests addressed to secondary devices on the low-speed (I2C) bus.
//!
//! A request travels inside a single LsWrite command; the answer is
//! collected later with LsGetStatus and LsRead. Driving that exchange is the
//! transport's job, this module only describes what to send.

use crate::commands::Command;
use crate::constants::*;
use crate::field::decode_ascii;
use crate::types::SensorPort;
use serde::{Deserialize, Serialize};

/// One write-then-read exchange with a secondary device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowSpeedRequest {
    /// Sensor port the device is attached to.
    pub port: SensorPort,
    /// Secondary address; sent as the first transmit byte.
    #[serde(default = "default_address")]
    pub address: u8,
    /// Register and data bytes following the address.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Bytes the device is expected to answer with.
    #[serde(default)]
    pub rx_len: u8,
}

fn default_address() -> u8 {
    DEFAULT_I2C_ADDRESS
}

impl LowSpeedRequest {
    pub fn new(port: SensorPort, address: u8, payload: Vec<u8>, rx_len: u8) -> Self {
        LowSpeedRequest {
            port,
            address,
            payload,
            rx_len,
        }
    }

    /// Read `len` bytes starting at `register`.
    pub fn read_register(port: SensorPort, register: u8, len: u8) -> Self {
        LowSpeedRequest::new(port, DEFAULT_I2C_ADDRESS, vec![register], len)
    }

    /// Write `value` to a command register; nothing is read back.
    pub fn send_command(port: SensorPort, register: u8, value: u8) -> Self {
        LowSpeedRequest::new(port, DEFAULT_I2C_ADDRESS, vec![register, value], 0)
    }

    /// Read the manufacturer and sensor type strings.
    pub fn identity(port: SensorPort) -> Self {
        LowSpeedRequest::read_register(port, I2C_REG_IDENTITY, I2C_IDENTITY_LEN)
    }

    /// Read the first distance measurement of an ultrasonic sensor.
    pub fn sonar_distance(port: SensorPort) -> Self {
        LowSpeedRequest::read_register(port, SONAR_REG_MEASUREMENT_1, 1)
    }

    /// Use a non-default secondary address.
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Bytes placed on the bus: the address followed by the payload.
    pub fn tx_bytes(&self) -> Vec<u8> {
        let mut tx = Vec::with_capacity(1 + self.payload.len());
        tx.push(self.address);
        tx.extend_from_slice(&self.payload);
        tx
    }

    /// The LsWrite command carrying this request.
    ///
    /// A reply is always requested so that a bus error on the write is
    /// reported before polling starts.
    pub fn to_command(&self) -> Command {
        Command::ls_write(self.port, self.tx_bytes(), self.rx_len)
    }
}

/// Manufacturer and type strings reported by a digital sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub manufacturer: String,
    pub sensor_type: String,
}

impl SensorIdentity {
    /// Decode the 16-byte identity block.
    pub fn decode(data: &[u8]) -> Option<SensorIdentity> {
        if data.len() < 2 * I2C_IDENTITY_FIELD {
            return None;
        }
        Some(SensorIdentity {
            manufacturer: decode_ascii(&data[..I2C_IDENTITY_FIELD]),
            sensor_type: decode_ascii(&data[I2C_IDENTITY_FIELD..2 * I2C_IDENTITY_FIELD]),
        })
    }
}

impl std::fmt::Display for SensorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.sensor_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandBody;

    #[test]
    fn test_register_read_command() {
        let req = LowSpeedRequest::sonar_distance(SensorPort::S4);
        let cmd = req.to_command();
        assert!(cmd.wants_response());
        assert_eq!(
            cmd.body(),
            &CommandBody::LsWrite {
                port: SensorPort::S4,
                tx_data: vec![0x02, 0x42],
                rx_len: 1
            }
        );
        let payload = cmd.encode().unwrap();
        assert_eq!(payload.len(), req.tx_bytes().len() + LS_WRITE_HEADER);
    }

    #[test]
    fn test_send_command_reads_nothing() {
        let req = LowSpeedRequest::send_command(SensorPort::S1, SONAR_REG_COMMAND_STATE, 0x02)
            .with_address(0x04);
        assert_eq!(req.tx_bytes(), vec![0x04, 0x41, 0x02]);
        assert_eq!(req.rx_len, 0);
    }

    #[test]
    fn test_identity_decoding() {
        let block = b"LEGO\0\0\0\0Sonar\0\0\0";
        let id = SensorIdentity::decode(block).unwrap();
        assert_eq!(id.manufacturer, "LEGO");
        assert_eq!(id.sensor_type, "Sonar");
        assert!(SensorIdentity::decode(&block[..10]).is_none());
    }
}
