//! # Servo Controller Module
//!
//! This module provides a timed command queue for a hobby positional servo driven by a 50 Hz PWM
//! signal. Angles between 0 and 180 degrees map linearly onto duty cycles between 2.5 % and
//! 12.5 %.
//!
//! Servos give no position feedback, so the controller estimates how long each move takes from
//! the distance travelled and waits it out before accepting the next command. Commands queued in
//! a burst therefore execute one after another without overlapping. The signal is dropped to a
//! duty cycle of 0 once each move is complete to stop the servo jittering while it holds.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};
use log::{debug, info, warn};
use util::{maths::lin_map, time::seconds_to_duration};

use crate::{
    error::{check_range, ActError},
    hal::{Board, HalError, PwmOutput},
    worker::{Consumer, Worker, WorkerConfig},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Travel range of the servo.
///
/// Units: degrees
pub const ANGLE_RANGE_DEG: (f64, f64) = (0.0, 180.0);

/// Duty cycles at either end of the travel range.
///
/// Units: percent
pub const DUTY_RANGE_PCT: (f64, f64) = (2.5, 12.5);

/// Pause after each command before the next is taken from the queue.
const COMMAND_GAP: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A positional servo with a queue of timed moves.
pub struct TimedServoQueue<W>
where
    W: PwmOutput + Send + 'static
{
    pin: u8,
    worker: Option<Worker<ServoMover<W>>>,
    angle: Arc<Mutex<f64>>,
}

/// The worker side of the servo, owning the PWM output.
struct ServoMover<W> {
    pwm: W,
    time_per_degree_s: f64,

    /// Angle reached by the last completed move.
    current_angle: f64,

    /// When the last move finished. Only ever moves forwards.
    last_move_completion: Instant,

    /// Copy of `current_angle` published for [`TimedServoQueue::current_angle`].
    published: Arc<Mutex<f64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Requests executed by the servo's worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoRequest {
    /// Move to an angle in degrees.
    MoveTo(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<W> TimedServoQueue<W>
where
    W: PwmOutput + Send + 'static
{
    /// Claim the servo's PWM output and move it to the initial angle.
    ///
    /// The initial move waits for the fixed settle time rather than one computed from the
    /// distance, since the starting position is unknown. This function blocks until that move is
    /// complete, after which queued commands are accepted.
    pub fn new<B>(board: &B, params: &ServoParams) -> Result<Self, ActError>
    where
        B: Board<Pwm = W>
    {
        check_angle(params.initial_angle_deg)?;
        check_range("Time per degree", params.time_per_degree_s, 0.0, f64::MAX)?;
        check_range("Initial settle time", params.initial_settle_s, 0.0, f64::MAX)?;

        let pwm = board.pwm_pin(params.pin, params.frequency_hz)?;

        let angle = Arc::new(Mutex::new(params.initial_angle_deg));

        let mut mover = ServoMover {
            pwm,
            time_per_degree_s: params.time_per_degree_s,
            current_angle: params.initial_angle_deg,
            last_move_completion: Instant::now(),
            published: angle.clone(),
        };

        mover.execute(
            params.initial_angle_deg,
            seconds_to_duration(params.initial_settle_s)
        )?;

        let config = WorkerConfig::unbounded("servo")
            .poll_timeout(Duration::from_millis(params.poll_timeout_ms))
            .pacing(COMMAND_GAP);

        let servo = Self {
            pin: params.pin,
            worker: Some(Worker::spawn(config, mover)?),
            angle,
        };

        info!(
            "Servo on GPIO {} started at {} deg",
            params.pin, params.initial_angle_deg
        );

        Ok(servo)
    }

    /// Queue a move to `angle_deg` (0 to 180).
    pub fn move_to(&self, angle_deg: f64) -> Result<(), ActError> {
        check_angle(angle_deg)?;

        match &self.worker {
            Some(w) => w.submit(ServoRequest::MoveTo(angle_deg)),
            None => Err(ActError::WorkerStopped(String::from("servo"))),
        }
    }

    /// The angle reached by the last completed move.
    pub fn current_angle(&self) -> f64 {
        *self.angle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until every queued move has been executed.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.worker.as_ref().map_or(true, |w| w.wait_idle(timeout))
    }

    /// Stop the servo, discarding any queued moves, and release its output.
    ///
    /// A move which is already in progress is allowed to finish.
    pub fn shutdown(mut self) -> Result<(), ActError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), ActError> {
        let worker = match self.worker.take() {
            Some(w) => w,
            None => return Ok(()),
        };

        let mut mover = worker.shutdown()?;

        // The output is released when the mover is dropped, even if stopping the signal failed
        let stop_result = mover.pwm.stop();
        drop(mover);

        info!("Servo on GPIO {} shutdown complete", self.pin);

        stop_result.map_err(ActError::from)
    }
}

impl<W> Drop for TimedServoQueue<W>
where
    W: PwmOutput + Send + 'static
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error shutting down the servo on GPIO {}: {}", self.pin, e);
        }
    }
}

impl<W> Consumer for ServoMover<W>
where
    W: PwmOutput + Send + 'static
{
    type Request = ServoRequest;
    type Error = HalError;

    fn consume(&mut self, request: ServoRequest) -> Result<(), HalError> {
        match request {
            ServoRequest::MoveTo(angle) => {
                let distance = (angle - self.current_angle).abs();
                let required = seconds_to_duration(distance * self.time_per_degree_s);
                self.execute(angle, required)
            }
        }
    }
}

impl<W: PwmOutput> ServoMover<W> {
    /// Drive the servo to `angle` and wait for the move to complete.
    ///
    /// The wait is `required`, or the time still owed to the previous move if that is longer.
    fn execute(&mut self, angle: f64, required: Duration) -> Result<(), HalError> {
        let duty = duty_cycle_for(angle);
        self.pwm.set_duty_cycle(duty)?;

        let wait = match self.last_move_completion.checked_duration_since(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => required.max(remaining),
            _ => required,
        };

        debug!(
            "Servo moving {} -> {} deg (duty {:.2} %), waiting {:?}",
            self.current_angle, angle, duty, wait
        );

        if !wait.is_zero() {
            thread::sleep(wait);
        }

        // Drop the signal to stop the servo jittering while it holds position
        self.pwm.set_duty_cycle(0.0)?;

        self.current_angle = angle;
        self.last_move_completion = Instant::now();
        *self.published.lock().unwrap_or_else(|e| e.into_inner()) = angle;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Duty cycle percentage which positions the servo at `angle_deg`.
pub fn duty_cycle_for(angle_deg: f64) -> f64 {
    lin_map(ANGLE_RANGE_DEG, DUTY_RANGE_PCT, angle_deg)
}

fn check_angle(angle_deg: f64) -> Result<f64, ActError> {
    check_range("Servo angle", angle_deg, ANGLE_RANGE_DEG.0, ANGLE_RANGE_DEG.1)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_cycle_for() {
        assert_eq!(duty_cycle_for(0.0), 2.5);
        assert_eq!(duty_cycle_for(90.0), 7.5);
        assert_eq!(duty_cycle_for(180.0), 12.5);
        assert!((duty_cycle_for(45.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_check_angle() {
        assert!(check_angle(0.0).is_ok());
        assert!(check_angle(180.0).is_ok());
        assert!(check_angle(-0.5).unwrap_err().is_range());
        assert!(check_angle(180.5).unwrap_err().is_range());
        assert!(check_angle(f64::NAN).unwrap_err().is_range());
    }
}
