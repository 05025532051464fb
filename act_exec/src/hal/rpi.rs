//! [`Board`] implementation for the Raspberry Pi, using `rppal`.
//!
//! PWM outputs use `rppal`'s software PWM on an ordinary GPIO line, which matches the 50 Hz servo
//! signal without needing one of the two hardware PWM channels.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::digital::v2::OutputPin;
use log::trace;
use rppal::{
    gpio::{self, Gpio},
    uart::{self, Parity, Uart},
};

use super::{Board, HalError, PwmOutput, SerialLink, check_duty_cycle};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the Raspberry Pi's GPIO peripheral.
///
/// Create one of these per process and pass it to each component.
pub struct RpiBoard {
    gpio: Gpio,
}

/// A GPIO line configured as an output.
///
/// The line is reset to its original mode when dropped.
pub struct RpiPin(gpio::OutputPin);

/// A GPIO line generating a software PWM signal.
pub struct RpiPwm {
    pin: gpio::OutputPin,
    frequency_hz: f64,
}

/// A UART device.
pub struct RpiSerial {
    uart: Option<Uart>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RpiBoard {
    /// Open the GPIO peripheral.
    pub fn new() -> Result<Self, HalError> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self { gpio })
    }

    fn claim(&self, bcm: u8) -> Result<gpio::OutputPin, HalError> {
        let mut pin = self.gpio
            .get(bcm)
            .map_err(gpio_err)?
            .into_output();
        pin.set_low();

        trace!("GPIO {} claimed", bcm);

        Ok(pin)
    }
}

impl Board for RpiBoard {
    type Pin = RpiPin;
    type Pwm = RpiPwm;
    type Serial = RpiSerial;

    fn output_pin(&self, bcm: u8) -> Result<Self::Pin, HalError> {
        self.claim(bcm).map(RpiPin)
    }

    fn pwm_pin(&self, bcm: u8, frequency_hz: f64) -> Result<Self::Pwm, HalError> {
        let mut pin = self.claim(bcm)?;
        pin.set_pwm_frequency(frequency_hz, 0.0)
            .map_err(|e| HalError::Pwm(e.to_string()))?;

        Ok(RpiPwm { pin, frequency_hz })
    }

    fn serial(&self, path: &str, baud_rate: u32) -> Result<Self::Serial, HalError> {
        let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1)
            .map_err(uart_err)?;

        // Writes block until the whole packet is in the transmit buffer
        uart.set_write_mode(true).map_err(uart_err)?;

        trace!("Serial port {} opened at {} baud", path, baud_rate);

        Ok(RpiSerial { uart: Some(uart) })
    }
}

impl OutputPin for RpiPin {
    type Error = HalError;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high();
        Ok(())
    }
}

impl PwmOutput for RpiPwm {
    fn set_duty_cycle(&mut self, duty_pct: f64) -> Result<(), HalError> {
        check_duty_cycle(duty_pct)?;

        self.pin
            .set_pwm_frequency(self.frequency_hz, duty_pct / 100.0)
            .map_err(|e| HalError::Pwm(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), HalError> {
        self.pin.clear_pwm().map_err(|e| HalError::Pwm(e.to_string()))?;
        self.pin.set_low();
        Ok(())
    }
}

impl SerialLink for RpiSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), HalError> {
        let uart = self.uart.as_mut().ok_or(HalError::Closed)?;

        let mut written = 0;
        while written < bytes.len() {
            written += uart.write(&bytes[written..]).map_err(uart_err)?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), HalError> {
        self.uart
            .as_ref()
            .ok_or(HalError::Closed)?
            .drain()
            .map_err(uart_err)
    }

    fn close(&mut self) -> Result<(), HalError> {
        // Dropping the UART closes the device
        self.uart.take().map(|_| ()).ok_or(HalError::Closed)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn gpio_err(e: gpio::Error) -> HalError {
    match e {
        gpio::Error::PinUsed(bcm) => HalError::PinBusy(bcm),
        e => HalError::Gpio(e.to_string()),
    }
}

fn uart_err(e: uart::Error) -> HalError {
    HalError::Uart(e.to_string())
}
