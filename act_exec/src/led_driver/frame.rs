//! # LED frame encoding
//!
//! The LED board is a 24 channel, 12-bit grayscale shift register. A frame is 288 bits: one
//! 12-bit value per channel, MSB first, starting with channel 23 and ending with channel 0.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of channels on the board.
pub const NUM_CHANNELS: usize = 24;

/// Number of bits per channel.
pub const BITS_PER_CHANNEL: usize = 12;

/// Number of bits in a frame.
pub const FRAME_BITS: usize = NUM_CHANNELS * BITS_PER_CHANNEL;

/// Maximum grayscale level of a channel.
pub const MAX_LEVEL: u16 = (1 << BITS_PER_CHANNEL) - 1;

/// Default gamma used for brightness correction.
pub const DEFAULT_GAMMA: f64 = 2.2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The grayscale levels of every channel, ready to be shifted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitFrame {
    levels: [u16; NUM_CHANNELS],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BitFrame {
    /// Encode channel intensities (0.0 to 1.0) into a frame, applying gamma correction.
    pub fn encode(intensities: &[f64; NUM_CHANNELS], gamma: f64) -> Self {
        let mut levels = [0u16; NUM_CHANNELS];

        for (level, &intensity) in levels.iter_mut().zip(intensities.iter()) {
            *level = gamma_correct(intensity, gamma);
        }

        Self { levels }
    }

    /// Build a frame from raw grayscale levels. Levels above [`MAX_LEVEL`] are saturated.
    pub fn from_levels(levels: [u16; NUM_CHANNELS]) -> Self {
        let mut levels = levels;
        for level in levels.iter_mut() {
            *level = (*level).min(MAX_LEVEL);
        }

        Self { levels }
    }

    /// Rebuild a frame from the bits shifted into the board.
    ///
    /// Returns `None` unless exactly [`FRAME_BITS`] bits are given.
    pub fn from_bits(bits: &[bool]) -> Option<Self> {
        if bits.len() != FRAME_BITS {
            return None;
        }

        let mut levels = [0u16; NUM_CHANNELS];

        for (i, chunk) in bits.chunks(BITS_PER_CHANNEL).enumerate() {
            let channel = NUM_CHANNELS - 1 - i;
            levels[channel] = chunk
                .iter()
                .fold(0u16, |acc, &bit| (acc << 1) | bit as u16);
        }

        Some(Self { levels })
    }

    /// The grayscale levels indexed by channel.
    pub fn levels(&self) -> &[u16; NUM_CHANNELS] {
        &self.levels
    }

    /// The bits of the frame in the order they are shifted out.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.levels
            .iter()
            .rev()
            .flat_map(|&level| {
                (0..BITS_PER_CHANNEL)
                    .rev()
                    .map(move |b| (level >> b) & 1 == 1)
            })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert an intensity (0.0 to 1.0) to a 12-bit grayscale level.
///
/// The level is `round(intensity^gamma * 4095)`. Intensities outside `[0, 1]` are clamped and NaN
/// maps to 0.
pub fn gamma_correct(intensity: f64, gamma: f64) -> u16 {
    if intensity.is_nan() {
        return 0;
    }

    let intensity = clamp(&intensity, &0.0, &1.0);
    let level = (intensity.powf(gamma) * MAX_LEVEL as f64).round();

    clamp(&level, &0.0, &(MAX_LEVEL as f64)) as u16
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
