//! Parameters structure for the motor controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the motor controller link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorParams {

    // ---- LINK ----

    /// Path to the serial device.
    pub port: String,

    /// Baud rate of the serial link.
    pub baud_rate: u32,

    /// Address of the motor controller.
    pub address: u8,

    // ---- BACKGROUND QUEUE ----

    /// Maximum number of packets waiting in the background queue.
    pub queue_capacity: usize,

    /// How long the packet pump waits for a packet before checking for shutdown.
    ///
    /// Units: milliseconds
    pub poll_timeout_ms: u64,

    /// Delay between iterations of the packet pump.
    ///
    /// Units: milliseconds
    pub pump_interval_ms: u64,

    // ---- START UP ----

    /// Time given to the controller to power up before it is configured.
    ///
    /// Units: milliseconds
    pub startup_delay_ms: u64,

    /// Serial timeout after which the controller stops the motors. 0 disables the timeout.
    ///
    /// Units: milliseconds
    pub auto_stop_ms: i64,

    /// Deadband applied around neutral.
    pub deadband: i32,
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyAMA0"),
            baud_rate: 9600,
            address: 128,
            queue_capacity: 100,
            poll_timeout_ms: 10,
            pump_interval_ms: 5,
            startup_delay_ms: 2000,
            auto_stop_ms: 200,
            deadband: 5,
        }
    }
}
