//! # Hardware Abstraction Layer
//!
//! This module defines the hardware handle used by every actuator component. A single [`Board`]
//! is created once per process and passed to each component on construction. Components claim
//! the resources they need from the board (GPIO lines, PWM outputs, serial ports) and own them
//! exclusively until they are shut down, at which point the resources are dropped and released
//! back to the board.
//!
//! Two boards are provided:
//! - [`rpi::RpiBoard`] which drives the real Raspberry Pi peripherals through `rppal`. Only
//!   available when building for ARM targets.
//! - [`sim::SimBoard`] which records every signal change in memory, used on development hosts
//!   and in tests.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Simulated board which records all hardware activity.
pub mod sim;

/// Raspberry Pi board backed by `rppal`.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub mod rpi;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::digital::v2::OutputPin;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The per-process hardware handle.
///
/// Every resource handed out by the board is exclusively owned by the caller. Claiming a resource
/// which is already owned fails with [`HalError::PinBusy`] or [`HalError::PortBusy`].
pub trait Board {
    /// Digital output line type.
    type Pin: OutputPin<Error = HalError> + Send + 'static;

    /// PWM output type.
    type Pwm: PwmOutput + Send + 'static;

    /// Serial link type.
    type Serial: SerialLink + Send + 'static;

    /// Claim a GPIO line (BCM numbering) as a digital output, initially driven low.
    fn output_pin(&self, bcm: u8) -> Result<Self::Pin, HalError>;

    /// Claim a GPIO line (BCM numbering) as a PWM output running at `frequency_hz`.
    ///
    /// The output starts with a duty cycle of 0.
    fn pwm_pin(&self, bcm: u8, frequency_hz: f64) -> Result<Self::Pwm, HalError>;

    /// Open a byte-oriented serial link on the given device path.
    fn serial(&self, path: &str, baud_rate: u32) -> Result<Self::Serial, HalError>;
}

/// A pulse-width modulated output.
pub trait PwmOutput {
    /// Set the duty cycle of the output.
    ///
    /// ## Arguments
    /// - `duty_pct` - The duty cycle as a percentage of the period, between 0.0 and 100.0. Values
    ///   outside this range will be rejected.
    fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), HalError>;

    /// Stop generating the PWM signal entirely.
    fn stop(&mut self) -> Result<(), HalError>;
}

/// A byte-oriented serial link.
pub trait SerialLink {
    /// Write the whole buffer to the link.
    ///
    /// A single call is never split up by the link, however callers sharing a link between
    /// threads must provide their own exclusion.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), HalError>;

    /// Block until all written bytes have been transmitted.
    fn flush(&mut self) -> Result<(), HalError>;

    /// Close the link. Any further write fails with [`HalError::Closed`].
    fn close(&mut self) -> Result<(), HalError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by the hardware layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HalError {
    #[error("GPIO {0} is already owned by another component")]
    PinBusy(u8),

    #[error("Serial port {0} is already open")]
    PortBusy(String),

    #[error("A GPIO error occured: {0}")]
    Gpio(String),

    #[error("A PWM error occured: {0}")]
    Pwm(String),

    #[error("A UART error occured: {0}")]
    Uart(String),

    #[error("Duty cycle must be between 0.0 and 100.0, found {0}")]
    InvalidDutyCycle(f64),

    #[error("The resource has already been closed")]
    Closed,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check a duty cycle percentage is valid.
pub(crate) fn check_duty_cycle(duty_pct: f64) -> Result<(), HalError> {
    if util::maths::in_range(duty_pct, 0.0, 100.0) {
        Ok(())
    }
    else {
        Err(HalError::InvalidDutyCycle(duty_pct))
    }
}
