//! Parameters structure for the servo controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a timed positional servo.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServoParams {

    /// Servo signal line, BCM numbering.
    pub pin: u8,

    /// PWM frequency of the servo signal.
    ///
    /// Units: hertz
    pub frequency_hz: f64,

    /// Angle the servo is moved to on start up.
    ///
    /// Units: degrees
    pub initial_angle_deg: f64,

    /// Estimated time the servo needs to travel one degree.
    ///
    /// Units: seconds/degree
    pub time_per_degree_s: f64,

    /// Fixed time allowed for the initial move, which starts from an unknown position.
    ///
    /// Units: seconds
    pub initial_settle_s: f64,

    /// How long the worker waits for a command before checking for shutdown.
    ///
    /// Units: milliseconds
    pub poll_timeout_ms: u64,
}

impl Default for ServoParams {
    fn default() -> Self {
        Self {
            pin: 22,
            frequency_hz: 50.0,
            initial_angle_deg: 90.0,
            time_per_degree_s: 0.004,
            initial_settle_s: 0.3,
            poll_timeout_ms: 100,
        }
    }
}
