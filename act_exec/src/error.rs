//! # Actuator errors

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::hal::HalError;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while commanding an actuator.
#[derive(thiserror::Error, Debug)]
pub enum ActError {
    #[error("{quantity} {value} is out of range ({min} to {max})")]
    Range {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Command queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Hardware I/O error: {0}")]
    HardwareIo(#[from] HalError),

    #[error("The {0} worker is not running")]
    WorkerStopped(String),

    #[error("Could not spawn the {name} worker: {source}")]
    WorkerSpawn {
        name: String,
        source: std::io::Error,
    },

    #[error("The {0} worker panicked")]
    WorkerPanicked(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActError {
    /// Build a [`ActError::Range`] error.
    pub(crate) fn range<V: Into<f64>>(quantity: &'static str, value: V, min: V, max: V) -> Self {
        ActError::Range {
            quantity,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    /// Returns `true` if this is a [`ActError::Range`] error.
    pub fn is_range(&self) -> bool {
        matches!(self, ActError::Range { .. })
    }
}

/// Check `value` lies in `[min, max]`, returning a range error naming `quantity` otherwise.
pub(crate) fn check_range<V>(quantity: &'static str, value: V, min: V, max: V) -> Result<V, ActError>
where
    V: Into<f64> + PartialOrd + Copy
{
    if value >= min && value <= max {
        Ok(value)
    }
    else {
        Err(ActError::range(quantity, value, min, max))
    }
}
