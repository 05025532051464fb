//! # LED Matrix Driver
//!
//! Drives a 24 channel, 12-bit LED driver board through three GPIO lines: serial data (SIN),
//! serial clock (SCLK) and latch (XLAT). The board's blank line is assumed to be tied low so the
//! outputs are always enabled.
//!
//! Intensity updates and flushes are queued and executed in submission order by the driver's
//! worker. Updates only change the driver's copy of the channel intensities; a flush encodes all
//! 24 channels into a [`BitFrame`], bit-bangs it into the board and pulses the latch.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod frame;
mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use frame::*;
pub use params::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};
use embedded_hal::digital::v2::OutputPin;
use log::{debug, info, warn};

use crate::{
    error::{check_range, ActError},
    hal::{Board, HalError},
    worker::{Consumer, Worker, WorkerConfig},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Queued driver for the LED board.
pub struct LedMatrixDriver<P>
where
    P: OutputPin<Error = HalError> + Send + 'static
{
    worker: Option<Worker<LedShifter<P>>>,
    states: Arc<Mutex<[f64; NUM_CHANNELS]>>,
}

/// The worker side of the driver, owning the GPIO lines.
struct LedShifter<P> {
    sin: P,
    sclk: P,
    xlat: P,

    gamma: f64,
    bit_delay: Duration,

    /// Current channel intensities, only mutated on the worker thread.
    states: [f64; NUM_CHANNELS],

    /// Copy of `states` published for [`LedMatrixDriver::led_states`].
    published: Arc<Mutex<[f64; NUM_CHANNELS]>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Requests executed by the LED driver's worker.
#[derive(Debug, Clone, PartialEq)]
pub enum LedRequest {
    /// Set one channel's intensity.
    SetSingle { index: usize, value: f64 },

    /// Set several channels' intensities. Validated when executed.
    SetMany(BTreeMap<usize, f64>),

    /// Send the current intensities to the board.
    Flush,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P> LedMatrixDriver<P>
where
    P: OutputPin<Error = HalError> + Send + 'static
{
    /// Claim the LED lines from the board and start the driver.
    ///
    /// All channels start at 0 and a flush is queued straight away so the board begins dark.
    pub fn new<B>(board: &B, params: &LedParams) -> Result<Self, ActError>
    where
        B: Board<Pin = P>
    {
        if !(params.gamma.is_finite() && params.gamma > 0.0) {
            return Err(ActError::range("LED gamma", params.gamma, 0.0, f64::INFINITY));
        }

        let sin = board.output_pin(params.sin_pin)?;
        let sclk = board.output_pin(params.sclk_pin)?;
        let xlat = board.output_pin(params.xlat_pin)?;

        let states = Arc::new(Mutex::new([0.0; NUM_CHANNELS]));

        let shifter = LedShifter {
            sin,
            sclk,
            xlat,
            gamma: params.gamma,
            bit_delay: Duration::from_micros(params.bit_delay_us),
            states: [0.0; NUM_CHANNELS],
            published: states.clone(),
        };

        let driver = Self {
            worker: Some(Worker::spawn(WorkerConfig::unbounded("led_driver"), shifter)?),
            states,
        };

        driver.flush()?;

        info!(
            "LED driver started (SIN {}, SCLK {}, XLAT {})",
            params.sin_pin, params.sclk_pin, params.xlat_pin
        );

        Ok(driver)
    }

    /// Queue an update of the channel at `index` to `value` (0.0 to 1.0).
    ///
    /// The update only reaches the board on the next [`flush`](Self::flush).
    pub fn set_intensity(&self, index: usize, value: f64) -> Result<(), ActError> {
        check_index(index)?;
        check_range("LED intensity", value, 0.0, 1.0)?;

        self.submit(LedRequest::SetSingle { index, value })
    }

    /// Queue an update of several channels at once.
    ///
    /// The entries are validated by the worker. If any entry is invalid none of the batch is
    /// applied and the error is logged.
    pub fn set_intensities<I>(&self, intensities: I) -> Result<(), ActError>
    where
        I: IntoIterator<Item = (usize, f64)>
    {
        self.submit(LedRequest::SetMany(intensities.into_iter().collect()))
    }

    /// Queue sending the current intensities to the board.
    pub fn flush(&self) -> Result<(), ActError> {
        self.submit(LedRequest::Flush)
    }

    /// Block until every queued request has been executed.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.worker.as_ref().map_or(true, |w| w.wait_idle(timeout))
    }

    /// The channel intensities as of the last executed request.
    pub fn led_states(&self) -> [f64; NUM_CHANNELS] {
        *self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop the driver, discarding any queued requests, and release the LED lines.
    pub fn shutdown(mut self) -> Result<(), ActError> {
        self.close()
    }

    fn submit(&self, request: LedRequest) -> Result<(), ActError> {
        match &self.worker {
            Some(w) => w.submit(request),
            None => Err(ActError::WorkerStopped(String::from("led_driver"))),
        }
    }

    fn close(&mut self) -> Result<(), ActError> {
        let worker = match self.worker.take() {
            Some(w) => w,
            None => return Ok(()),
        };

        // Dropping the shifter releases the lines
        let shifter = worker.shutdown()?;
        drop(shifter);

        info!("LED driver shutdown complete");

        Ok(())
    }
}

impl<P> Drop for LedMatrixDriver<P>
where
    P: OutputPin<Error = HalError> + Send + 'static
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error shutting down the LED driver: {}", e);
        }
    }
}

impl<P> Consumer for LedShifter<P>
where
    P: OutputPin<Error = HalError> + Send + 'static
{
    type Request = LedRequest;
    type Error = ActError;

    fn consume(&mut self, request: LedRequest) -> Result<(), ActError> {
        match request {
            LedRequest::SetSingle { index, value } => {
                self.states[index] = value;
            },
            LedRequest::SetMany(intensities) => {
                // Validate the whole batch before touching any channel
                for (&index, &value) in intensities.iter() {
                    check_index(index)?;
                    check_range("LED intensity", value, 0.0, 1.0)?;
                }
                for (index, value) in intensities {
                    self.states[index] = value;
                }
            },
            LedRequest::Flush => {
                let frame = BitFrame::encode(&self.states, self.gamma);
                debug!("Sending LED frame {:?}", frame.levels());
                self.shift_out(&frame)?;
            }
        }

        *self.published.lock().unwrap_or_else(|e| e.into_inner()) = self.states;

        Ok(())
    }
}

impl<P> LedShifter<P>
where
    P: OutputPin<Error = HalError>
{
    /// Clock a frame into the board and latch it.
    fn shift_out(&mut self, frame: &BitFrame) -> Result<(), HalError> {
        for bit in frame.bits() {
            if bit {
                self.sin.set_high()?;
            }
            else {
                self.sin.set_low()?;
            }

            self.sclk.set_high()?;
            pause(self.bit_delay);
            self.sclk.set_low()?;
            pause(self.bit_delay);
        }

        self.xlat.set_high()?;
        pause(self.bit_delay);
        self.xlat.set_low()?;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_index(index: usize) -> Result<(), ActError> {
    if index < NUM_CHANNELS {
        Ok(())
    }
    else {
        Err(ActError::range("LED index", index as f64, 0.0, (NUM_CHANNELS - 1) as f64))
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
