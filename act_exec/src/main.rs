//! # Actuator Control Executable
//!
//! This executable brings up the robot's actuators and runs them through a short check sequence:
//! - LED face board (24 channel LED driver)
//! - Drive motors (packet serial motor controller)
//! - Head servo
//!
//! On a Raspberry Pi the real peripherals are used, on any other host the actuators run against
//! the simulated board.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Parameters for the actuator executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{thread, time::Duration};
use log::{info, warn, error};
use color_eyre::{Result, eyre::{WrapErr, eyre}};
use embedded_hal::digital::v2::OutputPin;

// Internal
use act_lib::{
    hal::{Board, HalError, PwmOutput, SerialLink},
    led_driver::LedMatrixDriver,
    motor::MotorProtocolEncoder,
    servo_ctrl::TimedServoQueue,
    ActError,
};
use params::ActExecParams;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Channels lit for the neutral face.
const FACE_NORMAL: [usize; 14] = [0, 1, 2, 4, 5, 7, 8, 9, 10, 11, 12, 13, 15, 16];

/// Channels lit for closed eyes.
const FACE_EYES_CLOSED: [usize; 6] = [3, 4, 5, 12, 13, 14];

/// Angles the servo is swept through, queued in a burst.
const SERVO_SWEEP_DEG: [f64; 8] = [0.0, 180.0, 0.0, 90.0, 45.0, 135.0, 180.0, 90.0];

/// Longest time to wait for an actuator to work through its queue.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "act_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Actuator Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ActExecParams = util::params::load("act_exec.toml")
        .wrap_err("Failed to load parameters")?;

    info!("Parameters loaded");

    // ---- BOARD INITIALISATION ----

    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    let board = act_lib::hal::rpi::RpiBoard::new()
        .wrap_err("Failed to open the GPIO peripheral")?;

    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    let board = {
        warn!("Not running on a Raspberry Pi, using the simulated board");
        act_lib::hal::sim::SimBoard::new()
    };

    let result = run(&board, &params);

    if let Err(e) = &result {
        error!("Actuator sequence failed: {:?}", e);
    }

    session.exit();

    result
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Bring up every actuator, run the check sequence and shut them all down again.
fn run<B: Board>(board: &B, params: &ActExecParams) -> Result<()> {

    // ---- ACTUATOR INITIALISATION ----

    let leds = LedMatrixDriver::new(board, &params.led)
        .wrap_err("Failed to initialise the LED driver")?;
    info!("LED driver initialised");

    let motors = MotorProtocolEncoder::new(board, &params.motor)
        .wrap_err("Failed to initialise the motor controller")?;
    info!("Motor controller initialised");

    let servo = TimedServoQueue::new(board, &params.servo)
        .wrap_err("Failed to initialise the servo")?;
    info!("Servo initialised");

    // ---- CHECK SEQUENCE ----

    info!("Initialisation complete, running check sequence");

    let sequence_result = check_sequence(&leds, &motors, &servo);

    // ---- SHUTDOWN ----

    // Every actuator is shut down even if the sequence or an earlier shutdown failed
    if let Err(e) = motors.stop() {
        warn!("Could not stop the motors: {}", e);
    }

    let shutdowns = [
        ("LED driver", leds.shutdown()),
        ("motor controller", motors.shutdown()),
        ("servo", servo.shutdown()),
    ];

    let mut failed = Vec::new();
    for (name, r) in shutdowns.iter() {
        if let Err(e) = r {
            error!("Failed to shut down the {}: {}", name, e);
            failed.push(*name);
        }
    }

    sequence_result.wrap_err("Check sequence failed")?;

    if failed.is_empty() {
        info!("All actuators shut down");
        Ok(())
    }
    else {
        Err(eyre!("Failed to shut down: {}", failed.join(", ")))
    }
}

/// Exercise each actuator in turn.
fn check_sequence<P, S, W>(
    leds: &LedMatrixDriver<P>,
    motors: &MotorProtocolEncoder<S>,
    servo: &TimedServoQueue<W>,
) -> Result<(), ActError>
where
    P: OutputPin<Error = HalError> + Send + 'static,
    S: SerialLink + Send + 'static,
    W: PwmOutput + Send + 'static,
{

    // ---- LEDS ----

    info!("Showing faces");

    leds.set_intensities(FACE_NORMAL.iter().map(|&i| (i, 1.0)))?;
    leds.flush()?;
    thread::sleep(Duration::from_secs(1));

    for i in 0..act_lib::led_driver::NUM_CHANNELS {
        leds.set_intensity(i, 0.0)?;
    }
    leds.set_intensities(FACE_EYES_CLOSED.iter().map(|&i| (i, 0.5)))?;
    leds.flush()?;

    if !leds.wait_idle(IDLE_TIMEOUT) {
        warn!("LED driver still busy after {:?}", IDLE_TIMEOUT);
    }

    // ---- SERVO ----

    info!("Sweeping servo");

    for &angle in SERVO_SWEEP_DEG.iter() {
        servo.move_to(angle)?;
        thread::sleep(Duration::from_millis(50));
    }

    if !servo.wait_idle(IDLE_TIMEOUT) {
        warn!("Servo still busy after {:?}", IDLE_TIMEOUT);
    }
    info!("Servo at {} deg", servo.current_angle());

    // ---- MOTORS ----

    info!("Pulsing motors");

    motors.drive(-25, -50)?;
    thread::sleep(Duration::from_millis(500));
    motors.drive(-25, 50)?;
    thread::sleep(Duration::from_millis(500));
    motors.drive(0, 0)?;
    motors.stop()?;

    Ok(())
}
