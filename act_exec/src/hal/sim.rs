//! [`Board`] implementation which simulates the hardware in memory.
//!
//! Every level change, duty cycle change and serial write made through a [`SimBoard`] is appended
//! to a shared, timestamped trace. Clones of the board share the same trace and the same set of
//! claimed resources, so a test can keep one clone to inspect what the components did.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};
use embedded_hal::digital::v2::OutputPin;
use log::trace;

use super::{Board, HalError, PwmOutput, SerialLink, check_duty_cycle};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A simulated board.
#[derive(Clone, Default)]
pub struct SimBoard {
    shared: Arc<Shared>,
}

/// A single recorded hardware event.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// When the event occured.
    pub at: Instant,

    /// What happened.
    pub signal: Signal,
}

/// A simulated digital output line.
pub struct SimPin {
    bcm: u8,
    shared: Arc<Shared>,
}

/// A simulated PWM output.
pub struct SimPwm {
    bcm: u8,
    shared: Arc<Shared>,
}

/// A simulated serial link.
pub struct SimSerial {
    path: String,
    shared: Arc<Shared>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    claimed_pins: Mutex<HashSet<u8>>,
    open_ports: Mutex<HashSet<String>>,
    trace: Mutex<Vec<TraceEvent>>,
    serial_faults: Mutex<usize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Kinds of recorded hardware event.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A digital line was driven to a level (`true` is high).
    Level { bcm: u8, high: bool },

    /// A PWM output's duty cycle was changed.
    Duty { bcm: u8, duty_pct: f64 },

    /// A PWM output was stopped.
    PwmStopped { bcm: u8 },

    /// Bytes were written to a serial link.
    SerialWrite { path: String, bytes: Vec<u8> },

    /// A serial link was closed.
    SerialClosed { path: String },

    /// A GPIO line was released back to the board.
    PinReleased { bcm: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBoard {
    /// Create a new simulated board with nothing claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the full trace recorded so far.
    pub fn trace(&self) -> Vec<TraceEvent> {
        lock(&self.shared.trace).clone()
    }

    /// Clear the recorded trace.
    pub fn clear_trace(&self) {
        lock(&self.shared.trace).clear();
    }

    /// Returns `true` if the GPIO line is currently owned by a component.
    pub fn is_claimed(&self, bcm: u8) -> bool {
        lock(&self.shared.claimed_pins).contains(&bcm)
    }

    /// Returns `true` if the serial port is currently open.
    pub fn is_open(&self, path: &str) -> bool {
        lock(&self.shared.open_ports).contains(path)
    }

    /// Make the next `count` serial writes on any port fail with a UART error.
    pub fn fail_next_serial_writes(&self, count: usize) {
        *lock(&self.shared.serial_faults) = count;
    }

    /// All buffers written to the given serial port, in order.
    pub fn serial_writes(&self, path: &str) -> Vec<Vec<u8>> {
        lock(&self.shared.trace)
            .iter()
            .filter_map(|e| match &e.signal {
                Signal::SerialWrite { path: p, bytes } if p == path => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// All duty cycle changes on the given PWM line, with their timestamps.
    pub fn duty_changes(&self, bcm: u8) -> Vec<(Instant, f64)> {
        lock(&self.shared.trace)
            .iter()
            .filter_map(|e| match e.signal {
                Signal::Duty { bcm: b, duty_pct } if b == bcm => Some((e.at, duty_pct)),
                _ => None,
            })
            .collect()
    }

    /// Number of rising edges seen on a digital line.
    pub fn rising_edges(&self, bcm: u8) -> usize {
        let mut high = false;
        let mut count = 0;

        for event in lock(&self.shared.trace).iter() {
            if let Signal::Level { bcm: b, high: h } = event.signal {
                if b == bcm {
                    if h && !high {
                        count += 1;
                    }
                    high = h;
                }
            }
        }

        count
    }

    /// Reconstruct the bits clocked into a shift register.
    ///
    /// The data line is sampled on every rising edge of the clock line. If `latch` is given the
    /// bits are split into one frame per rising edge of the latch line, otherwise a single frame
    /// containing every clocked bit is returned.
    pub fn shifted_frames(&self, data: u8, clock: u8, latch: Option<u8>) -> Vec<Vec<bool>> {
        let mut levels: HashMap<u8, bool> = HashMap::new();
        let mut frames = Vec::new();
        let mut current = Vec::new();

        for event in lock(&self.shared.trace).iter() {
            if let Signal::Level { bcm, high } = event.signal {
                let was_high = levels.insert(bcm, high).unwrap_or(false);
                let rising = high && !was_high;

                if rising && bcm == clock {
                    current.push(levels.get(&data).copied().unwrap_or(false));
                }
                if rising && Some(bcm) == latch {
                    frames.push(std::mem::take(&mut current));
                }
            }
        }

        if latch.is_none() {
            frames.push(current);
        }

        frames
    }

    fn claim_pin(&self, bcm: u8) -> Result<(), HalError> {
        if lock(&self.shared.claimed_pins).insert(bcm) {
            trace!("GPIO {} claimed", bcm);
            Ok(())
        }
        else {
            Err(HalError::PinBusy(bcm))
        }
    }
}

impl Board for SimBoard {
    type Pin = SimPin;
    type Pwm = SimPwm;
    type Serial = SimSerial;

    fn output_pin(&self, bcm: u8) -> Result<Self::Pin, HalError> {
        self.claim_pin(bcm)?;
        self.shared.record(Signal::Level { bcm, high: false });

        Ok(SimPin {
            bcm,
            shared: self.shared.clone(),
        })
    }

    fn pwm_pin(&self, bcm: u8, frequency_hz: f64) -> Result<Self::Pwm, HalError> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(HalError::Pwm(format!("invalid frequency {} Hz", frequency_hz)));
        }

        self.claim_pin(bcm)?;
        self.shared.record(Signal::Duty { bcm, duty_pct: 0.0 });

        Ok(SimPwm {
            bcm,
            shared: self.shared.clone(),
        })
    }

    fn serial(&self, path: &str, baud_rate: u32) -> Result<Self::Serial, HalError> {
        if baud_rate == 0 {
            return Err(HalError::Uart(String::from("baud rate must be non-zero")));
        }

        if !lock(&self.shared.open_ports).insert(path.to_string()) {
            return Err(HalError::PortBusy(path.to_string()));
        }

        trace!("Serial port {} opened at {} baud", path, baud_rate);

        Ok(SimSerial {
            path: path.to_string(),
            shared: self.shared.clone(),
            closed: false,
        })
    }
}

impl Shared {
    fn record(&self, signal: Signal) {
        lock(&self.trace).push(TraceEvent {
            at: Instant::now(),
            signal,
        });
    }

    fn release_pin(&self, bcm: u8) {
        lock(&self.claimed_pins).remove(&bcm);
        self.record(Signal::PinReleased { bcm });
        trace!("GPIO {} released", bcm);
    }
}

impl OutputPin for SimPin {
    type Error = HalError;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.shared.record(Signal::Level { bcm: self.bcm, high: false });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.shared.record(Signal::Level { bcm: self.bcm, high: true });
        Ok(())
    }
}

impl Drop for SimPin {
    fn drop(&mut self) {
        self.shared.release_pin(self.bcm);
    }
}

impl PwmOutput for SimPwm {
    fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), HalError> {
        check_duty_cycle(duty_pct)?;
        self.shared.record(Signal::Duty { bcm: self.bcm, duty_pct });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        self.shared.record(Signal::PwmStopped { bcm: self.bcm });
        Ok(())
    }
}

impl Drop for SimPwm {
    fn drop(&mut self) {
        self.shared.release_pin(self.bcm);
    }
}

impl SerialLink for SimSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), HalError> {
        if self.closed {
            return Err(HalError::Closed);
        }

        {
            let mut faults = lock(&self.shared.serial_faults);
            if *faults > 0 {
                *faults -= 1;
                return Err(HalError::Uart(String::from("simulated write failure")));
            }
        }

        self.shared.record(Signal::SerialWrite {
            path: self.path.clone(),
            bytes: bytes.to_vec(),
        });

        Ok(())
    }

    fn flush(&mut self) -> Result<(), HalError> {
        if self.closed {
            Err(HalError::Closed)
        }
        else {
            Ok(())
        }
    }

    fn close(&mut self) -> Result<(), HalError> {
        if self.closed {
            return Err(HalError::Closed);
        }

        self.closed = true;
        lock(&self.shared.open_ports).remove(&self.path);
        self.shared.record(Signal::SerialClosed { path: self.path.clone() });

        Ok(())
    }
}

impl Drop for SimSerial {
    fn drop(&mut self) {
        if !self.closed {
            lock(&self.shared.open_ports).remove(&self.path);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock a mutex, ignoring poisoning. The simulation state is plain data so a panic while holding
/// the lock can't leave it inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_claim_and_release() {
        let board = SimBoard::new();

        let pin = board.output_pin(23).unwrap();
        assert!(board.is_claimed(23));
        assert_eq!(board.output_pin(23).err(), Some(HalError::PinBusy(23)));

        drop(pin);
        assert!(!board.is_claimed(23));
        assert!(board.output_pin(23).is_ok());
    }

    #[test]
    fn test_shifted_frames() {
        let board = SimBoard::new();
        let mut data = board.output_pin(1).unwrap();
        let mut clock = board.output_pin(2).unwrap();
        let mut latch = board.output_pin(3).unwrap();

        for &bit in &[true, false, true] {
            if bit { data.set_high().unwrap() } else { data.set_low().unwrap() }
            clock.set_high().unwrap();
            clock.set_low().unwrap();
        }
        latch.set_high().unwrap();
        latch.set_low().unwrap();

        assert_eq!(board.shifted_frames(1, 2, Some(3)), vec![vec![true, false, true]]);
        assert_eq!(board.rising_edges(2), 3);
    }

    #[test]
    fn test_serial_faults_and_close() {
        let board = SimBoard::new();
        let mut serial = board.serial("/dev/ttyTEST", 9600).unwrap();
        assert!(matches!(board.serial("/dev/ttyTEST", 9600), Err(HalError::PortBusy(_))));

        board.fail_next_serial_writes(1);
        assert!(matches!(serial.write_all(&[1, 2]), Err(HalError::Uart(_))));
        serial.write_all(&[3, 4]).unwrap();
        assert_eq!(board.serial_writes("/dev/ttyTEST"), vec![vec![3, 4]]);

        serial.close().unwrap();
        assert_eq!(serial.write_all(&[5]), Err(HalError::Closed));
        assert!(!board.is_open("/dev/ttyTEST"));
    }
}
