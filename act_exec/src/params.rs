//! # Actuator Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use act_lib::{
    led_driver::LedParams,
    motor::MotorParams,
    servo_ctrl::ServoParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the actuator executable, loaded from `act_exec.toml`.
///
/// Any missing table or key falls back to its default.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
pub struct ActExecParams {

    /// LED driver board
    pub led: LedParams,

    /// Motor controller link
    pub motor: MotorParams,

    /// Head servo
    pub servo: ServoParams,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params() {
        let params: ActExecParams = util::params::from_str(r#"
            [motor]
            port = "/dev/ttyS0"
            queue_capacity = 10

            [servo]
            time_per_degree_s = 0.002
        "#).unwrap();

        assert_eq!(params.motor.port, "/dev/ttyS0");
        assert_eq!(params.motor.queue_capacity, 10);
        assert_eq!(params.motor.baud_rate, 9600);
        assert_eq!(params.servo.time_per_degree_s, 0.002);
        assert_eq!(params.servo.pin, 22);
        assert_eq!(params.led.sin_pin, 23);
        assert_eq!(params.led.bit_delay_us, 100);
    }
}
