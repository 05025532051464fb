//! # Motor Protocol Encoder
//!
//! Drives a packetised-serial dual motor controller in mixed mode. Drive, turn and configuration
//! demands are converted into 4 byte checksummed [`Packet`]s and written to the serial link.
//!
//! There are two transmit paths to the link:
//! - Direct writes made on the caller's thread by [`MotorProtocolEncoder::drive`],
//!   [`MotorProtocolEncoder::stop`] and the configuration functions.
//! - A background packet pump which drains a bounded queue of pre-built packets, fed by
//!   [`MotorProtocolEncoder::queue_command`].
//!
//! No ordering is guaranteed between the two paths. Each packet is written under the link's
//! transmit lock, so packets from the two paths can interleave but their bytes never do.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod packet;
mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use packet::*;
pub use params::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};
use log::{debug, error, info, trace, warn};

use crate::{
    error::{check_range, ActError},
    hal::{Board, HalError, SerialLink},
    worker::{Consumer, Worker, WorkerConfig},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest magnitude of a drive or turn demand.
pub const MAX_DEMAND: i32 = 127;

/// Length of one auto-stop timeout unit on the controller.
///
/// Units: milliseconds
pub const AUTO_STOP_UNIT_MS: i64 = 100;

/// Valid range of the ramping setting.
pub const RAMPING_RANGE: (i32, i32) = (1, 80);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Encoder for the motor controller's packet serial protocol.
pub struct MotorProtocolEncoder<S>
where
    S: SerialLink + Send + 'static
{
    address: u8,
    port: String,
    serial: Arc<Mutex<S>>,
    pump: Option<Worker<PacketPump<S>>>,
}

/// Background consumer writing queued packets to the link.
struct PacketPump<S> {
    serial: Arc<Mutex<S>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Logical requests for the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorRequest {
    /// Drive with a speed and turn rate, both in `-127..=127`.
    Drive { speed: i32, turn: i32 },

    /// Bring both motors back to neutral.
    Stop,

    /// Change one of the controller's settings.
    Configure(ConfigParam, i64),
}

/// Settings of the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParam {
    /// Serial timeout in milliseconds, scaled into 100 ms units and clamped to `0..=127`.
    AutoStopTimeout,

    /// Deadband around neutral, clamped to `0..=127`.
    Deadband,

    /// Acceleration ramping, must be in `1..=80`.
    Ramping,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorRequest {
    /// Convert the request into the packets which implement it.
    ///
    /// - `Drive` always produces two packets: a forward or backward packet chosen by the sign of
    ///   the speed, then a right or left packet chosen by the sign of the turn.
    /// - `Stop` produces four zero packets: forward, backward, right, left.
    /// - `Configure` produces a single packet.
    pub fn packets(&self, address: u8) -> Result<Vec<Packet>, ActError> {
        match *self {
            MotorRequest::Drive { speed, turn } => {
                check_range("Drive speed", speed, -MAX_DEMAND, MAX_DEMAND)?;
                check_range("Drive turn", turn, -MAX_DEMAND, MAX_DEMAND)?;

                let (drive_cmd, drive_val) = signed_demand(speed, Command::Forward, Command::Backward)?;
                let (turn_cmd, turn_val) = signed_demand(turn, Command::Right, Command::Left)?;

                Ok(vec![
                    Packet::new(address, drive_cmd, drive_val)?,
                    Packet::new(address, turn_cmd, turn_val)?,
                ])
            },
            MotorRequest::Stop => {
                [Command::Forward, Command::Backward, Command::Right, Command::Left]
                    .iter()
                    .map(|&cmd| Packet::new(address, cmd, 0))
                    .collect()
            },
            MotorRequest::Configure(ConfigParam::AutoStopTimeout, timeout_ms) => {
                let units = (timeout_ms / AUTO_STOP_UNIT_MS).clamp(0, MAX_DATA as i64);
                Ok(vec![Packet::new(address, Command::AutoStopTimeout, units as i32)?])
            },
            MotorRequest::Configure(ConfigParam::Deadband, value) => {
                let value = value.clamp(0, MAX_DATA as i64);
                Ok(vec![Packet::new(address, Command::Deadband, value as i32)?])
            },
            MotorRequest::Configure(ConfigParam::Ramping, value) => {
                let value = check_range(
                    "Ramping",
                    value as f64,
                    RAMPING_RANGE.0 as f64,
                    RAMPING_RANGE.1 as f64
                )?;
                Ok(vec![Packet::new(address, Command::Ramping, value as i32)?])
            }
        }
    }
}

impl<S> MotorProtocolEncoder<S>
where
    S: SerialLink + Send + 'static
{
    /// Open the serial link and start the packet pump.
    ///
    /// After the configured start up delay the controller's auto-stop timeout and deadband are
    /// set from the parameters.
    pub fn new<B>(board: &B, params: &MotorParams) -> Result<Self, ActError>
    where
        B: Board<Serial = S>
    {
        let serial = Arc::new(Mutex::new(board.serial(&params.port, params.baud_rate)?));

        let config = WorkerConfig::bounded("motor_pump", params.queue_capacity)
            .poll_timeout(Duration::from_millis(params.poll_timeout_ms))
            .pacing(Duration::from_millis(params.pump_interval_ms));
        let pump = Worker::spawn(config, PacketPump { serial: serial.clone() })?;

        let encoder = Self {
            address: params.address,
            port: params.port.clone(),
            serial,
            pump: Some(pump),
        };

        if params.startup_delay_ms > 0 {
            debug!("Waiting {} ms for the motor controller to start", params.startup_delay_ms);
            thread::sleep(Duration::from_millis(params.startup_delay_ms));
        }

        encoder.set_auto_stop(params.auto_stop_ms)?;
        encoder.set_deadband(params.deadband as i64)?;

        info!(
            "Motor controller link open on {} at {} baud (address {})",
            params.port, params.baud_rate, params.address
        );

        Ok(encoder)
    }

    /// Drive with the given speed and turn rate, both in `-127..=127`.
    ///
    /// Positive speeds drive forwards, positive turns turn right.
    pub fn drive(&self, speed: i32, turn: i32) -> Result<(), ActError> {
        self.send(MotorRequest::Drive { speed, turn })
    }

    /// Bring both motors back to neutral regardless of their previous state.
    pub fn stop(&self) -> Result<(), ActError> {
        self.send(MotorRequest::Stop)
    }

    /// Change one of the controller's settings.
    pub fn configure(&self, param: ConfigParam, value: i64) -> Result<(), ActError> {
        self.send(MotorRequest::Configure(param, value))
    }

    /// Set the serial timeout after which the controller stops the motors.
    ///
    /// The timeout is sent in 100 ms units, so the longest timeout is 12.7 s. 0 disables it.
    pub fn set_auto_stop(&self, timeout_ms: i64) -> Result<(), ActError> {
        self.configure(ConfigParam::AutoStopTimeout, timeout_ms)
    }

    /// Set the deadband around neutral. 0 restores the controller's default.
    pub fn set_deadband(&self, deadband: i64) -> Result<(), ActError> {
        self.configure(ConfigParam::Deadband, deadband)
    }

    /// Set the acceleration ramping, in `1..=80`.
    ///
    /// - 1 to 10: fast ramping
    /// - 11 to 20: slow ramping
    /// - 21 to 80: intermediate ramping
    pub fn set_ramping(&self, ramping: i64) -> Result<(), ActError> {
        self.configure(ConfigParam::Ramping, ramping)
    }

    /// Execute a request by writing its packets directly to the link.
    ///
    /// Transmission stops at the first failed packet, the rest of the request is dropped.
    pub fn send(&self, request: MotorRequest) -> Result<(), ActError> {
        trace!("Motor request {:?}", request);

        for packet in request.packets(self.address)? {
            if let Err(e) = write_packet(&self.serial, &packet) {
                error!("Failed to send {:?} to the motor controller: {}", request, e);
                return Err(e.into());
            }
        }

        Ok(())
    }

    /// Build a packet and queue it for the background packet pump.
    ///
    /// Fails with [`ActError::QueueFull`] if the queue is at capacity.
    pub fn queue_command(&self, command: Command, value: i32) -> Result<(), ActError> {
        self.queue_packet(Packet::new(self.address, command, value)?)
    }

    /// Queue a pre-built packet for the background packet pump.
    pub fn queue_packet(&self, packet: Packet) -> Result<(), ActError> {
        match &self.pump {
            Some(p) => p.submit(packet),
            None => Err(ActError::WorkerStopped(String::from("motor_pump"))),
        }
    }

    /// Number of packets waiting for the packet pump.
    pub fn queued(&self) -> usize {
        self.pump.as_ref().map_or(0, |p| p.pending())
    }

    /// Block until the packet pump has sent every queued packet.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pump.as_ref().map_or(true, |p| p.wait_idle(timeout))
    }

    /// Stop the packet pump and close the serial link.
    ///
    /// Packets still queued for the pump are discarded. The motors are not stopped; call
    /// [`stop`](Self::stop) first if required.
    pub fn shutdown(mut self) -> Result<(), ActError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), ActError> {
        let pump = match self.pump.take() {
            Some(p) => p,
            None => return Ok(()),
        };

        // The link is closed even if the pump could not be stopped cleanly
        let pump_result = pump.shutdown().map(drop);
        if let Err(e) = &pump_result {
            warn!("Motor packet pump did not stop cleanly: {}", e);
        }

        let close_result = match self.serial.lock() {
            Ok(mut s) => s.close().map_err(ActError::from),
            Err(_) => Err(ActError::HardwareIo(poisoned())),
        };

        info!("Motor controller link on {} closed", self.port);

        pump_result.and(close_result)
    }
}

impl<S> Drop for MotorProtocolEncoder<S>
where
    S: SerialLink + Send + 'static
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing the motor controller link: {}", e);
        }
    }
}

impl<S> Consumer for PacketPump<S>
where
    S: SerialLink + Send + 'static
{
    type Request = Packet;
    type Error = HalError;

    fn consume(&mut self, packet: Packet) -> Result<(), HalError> {
        write_packet(&self.serial, &packet)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Linearly map an integer between ranges, rounding to the nearest integer.
pub fn map_integer(
    value: i64,
    old_range: (i64, i64),
    new_range: (i64, i64)
) -> Result<i64, ActError> {
    if old_range.0 == old_range.1 {
        return Err(ActError::range(
            "Source range width",
            0.0,
            f64::MIN_POSITIVE,
            f64::INFINITY
        ));
    }

    let mapped = util::maths::lin_map(
        (old_range.0 as f64, old_range.1 as f64),
        (new_range.0 as f64, new_range.1 as f64),
        value as f64,
    );

    Ok(mapped.round() as i64)
}

/// Choose a direction command from the sign of a demand and map its magnitude to a data byte.
fn signed_demand(
    demand: i32,
    positive: Command,
    negative: Command
) -> Result<(Command, i32), ActError> {
    let command = if demand >= 0 { positive } else { negative };
    let magnitude = map_integer(
        demand.abs() as i64,
        (0, MAX_DEMAND as i64),
        (0, MAX_DATA as i64)
    )?;

    Ok((command, magnitude as i32))
}

/// Write one packet to the link under the transmit lock.
fn write_packet<S: SerialLink>(serial: &Mutex<S>, packet: &Packet) -> Result<(), HalError> {
    let mut serial = serial.lock().map_err(|_| poisoned())?;

    serial.write_all(&packet.to_bytes())?;
    serial.flush()?;

    trace!("Sent {:02X?}", packet.to_bytes());

    Ok(())
}

fn poisoned() -> HalError {
    HalError::Uart(String::from("serial transmit lock poisoned"))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(packets: &[Packet]) -> Vec<(u8, u8)> {
        packets.iter().map(|p| (p.command().code(), p.data())).collect()
    }

    #[test]
    fn test_drive_packets() {
        let p = MotorRequest::Drive { speed: 50, turn: -30 }.packets(128).unwrap();
        assert_eq!(codes(&p), vec![(8, 50), (11, 30)]);

        let p = MotorRequest::Drive { speed: -127, turn: 127 }.packets(128).unwrap();
        assert_eq!(codes(&p), vec![(9, 127), (10, 127)]);

        // Zero magnitudes still send both packets
        let p = MotorRequest::Drive { speed: 0, turn: 0 }.packets(128).unwrap();
        assert_eq!(codes(&p), vec![(8, 0), (10, 0)]);
    }

    #[test]
    fn test_drive_out_of_range() {
        assert!(MotorRequest::Drive { speed: 128, turn: 0 }.packets(128).unwrap_err().is_range());
        assert!(MotorRequest::Drive { speed: 0, turn: -128 }.packets(128).unwrap_err().is_range());
    }

    #[test]
    fn test_stop_packets() {
        let p = MotorRequest::Stop.packets(128).unwrap();
        assert_eq!(codes(&p), vec![(8, 0), (9, 0), (10, 0), (11, 0)]);
    }

    #[test]
    fn test_configure_packets() {
        let auto_stop = |ms| {
            codes(&MotorRequest::Configure(ConfigParam::AutoStopTimeout, ms).packets(128).unwrap())
        };
        assert_eq!(auto_stop(200), vec![(14, 2)]);
        assert_eq!(auto_stop(250), vec![(14, 2)]);
        assert_eq!(auto_stop(0), vec![(14, 0)]);
        assert_eq!(auto_stop(-500), vec![(14, 0)]);
        assert_eq!(auto_stop(100_000), vec![(14, 127)]);

        let deadband = |v| {
            codes(&MotorRequest::Configure(ConfigParam::Deadband, v).packets(128).unwrap())
        };
        assert_eq!(deadband(5), vec![(17, 5)]);
        assert_eq!(deadband(300), vec![(17, 127)]);
        assert_eq!(deadband(-3), vec![(17, 0)]);

        let ramping = |v| MotorRequest::Configure(ConfigParam::Ramping, v).packets(128);
        assert_eq!(codes(&ramping(20).unwrap()), vec![(16, 20)]);
        assert!(ramping(0).unwrap_err().is_range());
        assert!(ramping(81).unwrap_err().is_range());
    }

    #[test]
    fn test_map_integer() {
        assert_eq!(map_integer(64, (0, 127), (0, 127)).unwrap(), 64);
        assert_eq!(map_integer(50, (0, 100), (0, 127)).unwrap(), 64);
        assert_eq!(map_integer(-50, (-100, 100), (0, 10)).unwrap(), 3);
        assert!(map_integer(1, (5, 5), (0, 127)).unwrap_err().is_range());
    }
}
