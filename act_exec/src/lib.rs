//! # Actuator library.
//!
//! Command-serialising engines for the robot's actuators. Each engine accepts requests from any
//! thread and executes them strictly in order on its own worker thread:
//!
//! - [`led_driver::LedMatrixDriver`] - gamma corrected intensities bit-banged into a 24 channel
//!   LED driver board.
//! - [`motor::MotorProtocolEncoder`] - checksummed 4 byte packets sent to a dual motor controller
//!   over a serial link.
//! - [`servo_ctrl::TimedServoQueue`] - duty cycle commands for a positional servo, timed so that
//!   consecutive moves never overlap.
//!
//! All hardware is claimed from a single [`hal::Board`] created once per process.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Errors shared by all actuators
pub mod error;

/// Hardware abstraction layer - the per-process board handle and its resources
pub mod hal;

/// LED matrix driver - queued bit-banged frames for the LED driver board
pub mod led_driver;

/// Motor protocol encoder - packet serial link to the motor controller
pub mod motor;

/// Servo controller - timed move queue for a positional servo
pub mod servo_ctrl;

/// Single-consumer command queue shared by all actuators
pub mod worker;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use error::ActError;
