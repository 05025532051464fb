//! Parameters structure for the LED driver

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use super::frame::DEFAULT_GAMMA;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the LED driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedParams {

    // ---- PINS ----

    /// Serial data input line (SIN), BCM numbering.
    pub sin_pin: u8,

    /// Serial clock line (SCLK), BCM numbering.
    pub sclk_pin: u8,

    /// Latch line (XLAT), BCM numbering.
    pub xlat_pin: u8,

    // ---- SIGNAL ----

    /// Gamma applied to intensities before quantising them.
    pub gamma: f64,

    /// Delay between clock transitions.
    ///
    /// Units: microseconds
    pub bit_delay_us: u64,
}

impl Default for LedParams {
    fn default() -> Self {
        Self {
            sin_pin: 23,
            sclk_pin: 24,
            xlat_pin: 25,
            gamma: DEFAULT_GAMMA,
            bit_delay_us: 100,
        }
    }
}
