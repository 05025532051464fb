//! # Motor controller packets
//!
//! Every command sent to the motor controller is a 4 byte packet:
//!
//! ```text
//! [address, command, data, checksum]
//! ```
//!
//! where `data` is in `0..=127` and `checksum = (address + command + data) & 0x7F`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::error::{check_range, ActError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest value the data byte of a packet may hold.
pub const MAX_DATA: u8 = 127;

/// Number of bytes in a packet.
pub const PACKET_LEN: usize = 4;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single packet for the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    address: u8,
    command: Command,
    data: u8,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Command codes understood by the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Drive forwards (mixed mode).
    Forward,

    /// Drive backwards (mixed mode).
    Backward,

    /// Turn right (mixed mode).
    Right,

    /// Turn left (mixed mode).
    Left,

    /// Serial timeout after which the controller stops the motors, in units of 100 ms.
    AutoStopTimeout,

    /// Acceleration ramping. Persists through a power cycle.
    Ramping,

    /// Deadband around neutral. Persists through a power cycle.
    Deadband,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Command {
    /// The byte sent on the wire for this command.
    pub fn code(self) -> u8 {
        match self {
            Command::Forward => 8,
            Command::Backward => 9,
            Command::Right => 10,
            Command::Left => 11,
            Command::AutoStopTimeout => 14,
            Command::Ramping => 16,
            Command::Deadband => 17,
        }
    }

    /// Look a command up from its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            8 => Some(Command::Forward),
            9 => Some(Command::Backward),
            10 => Some(Command::Right),
            11 => Some(Command::Left),
            14 => Some(Command::AutoStopTimeout),
            16 => Some(Command::Ramping),
            17 => Some(Command::Deadband),
            _ => None,
        }
    }
}

impl Packet {
    /// Build a packet, rejecting values outside `0..=127`.
    pub fn new(address: u8, command: Command, value: i32) -> Result<Self, ActError> {
        let data = check_range("Packet data", value, 0, MAX_DATA as i32)? as u8;

        Ok(Self {
            address,
            command,
            data,
        })
    }

    /// Parse a packet received from the wire, verifying the checksum.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PACKET_LEN || bytes[2] > MAX_DATA {
            return None;
        }

        let packet = Self {
            address: bytes[0],
            command: Command::from_code(bytes[1])?,
            data: bytes[2],
        };

        if packet.checksum() == bytes[3] {
            Some(packet)
        }
        else {
            None
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    /// The 7 bit checksum of the packet.
    pub fn checksum(&self) -> u8 {
        self.address
            .wrapping_add(self.command.code())
            .wrapping_add(self.data)
            & 0x7F
    }

    /// The bytes sent on the wire.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        [self.address, self.command.code(), self.data, self.checksum()]
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // (128 + 8 + 64) mod 128 = 72
        let p = Packet::new(128, Command::Forward, 64).unwrap();
        assert_eq!(p.to_bytes(), [128, 8, 64, 72]);

        // (128 + 11 + 127) mod 128 = 10, the u8 sum wraps past 255
        let p = Packet::new(128, Command::Left, 127).unwrap();
        assert_eq!(p.to_bytes(), [128, 11, 127, 10]);

        let p = Packet::new(130, Command::Deadband, 0).unwrap();
        assert_eq!(p.checksum(), ((130 + 17) % 128) as u8);
    }

    #[test]
    fn test_data_out_of_range() {
        assert!(Packet::new(128, Command::Forward, 128).unwrap_err().is_range());
        assert!(Packet::new(128, Command::Forward, -1).unwrap_err().is_range());
        assert!(Packet::new(128, Command::Forward, 127).is_ok());
    }

    #[test]
    fn test_parse() {
        let p = Packet::new(128, Command::Ramping, 20).unwrap();
        assert_eq!(Packet::parse(&p.to_bytes()), Some(p));

        let mut bad = p.to_bytes();
        bad[3] ^= 1;
        assert_eq!(Packet::parse(&bad), None);
        assert_eq!(Packet::parse(&[128, 12, 0, 12]), None);
    }
}
