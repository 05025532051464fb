//! Integration tests of the timed servo queue against the simulated board.

use std::time::{Duration, Instant};

use act_lib::{
    hal::sim::{Signal, SimBoard},
    servo_ctrl::{ServoParams, TimedServoQueue},
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// 1 ms per degree keeps the moves short but still measurable.
const TIME_PER_DEGREE_S: f64 = 0.001;

fn params() -> ServoParams {
    ServoParams {
        time_per_degree_s: TIME_PER_DEGREE_S,
        initial_settle_s: 0.0,
        ..ServoParams::default()
    }
}

/// Index of the first duty change to `duty` at or after `from`.
fn find_duty(changes: &[(Instant, f64)], from: usize, duty: f64) -> usize {
    changes[from..]
        .iter()
        .position(|&(_, d)| (d - duty).abs() < 1e-9)
        .map(|i| i + from)
        .unwrap_or_else(|| panic!("no duty change to {} after index {}", duty, from))
}

#[test]
fn test_initial_move() {
    let board = SimBoard::new();
    let params = ServoParams {
        initial_settle_s: 0.05,
        ..params()
    };

    let start = Instant::now();
    let servo = TimedServoQueue::new(&board, &params).unwrap();

    // Construction blocks for the settle time
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(servo.current_angle(), 90.0);

    let duties: Vec<f64> = board.duty_changes(params.pin).iter().map(|&(_, d)| d).collect();
    assert_eq!(duties, vec![0.0, 7.5, 0.0]);

    servo.shutdown().unwrap();
}

#[test]
fn test_queued_moves_do_not_overlap() {
    let board = SimBoard::new();
    let params = params();
    let servo = TimedServoQueue::new(&board, &params).unwrap();

    // Queued in a burst, 90 degrees then 180 degrees of travel
    servo.move_to(0.0).unwrap();
    servo.move_to(180.0).unwrap();
    assert!(servo.wait_idle(TIMEOUT));

    let changes = board.duty_changes(params.pin);

    let first = find_duty(&changes, 0, 2.5);
    let first_end = find_duty(&changes, first, 0.0);
    let second = find_duty(&changes, first_end, 12.5);
    let second_end = find_duty(&changes, second, 0.0);

    let first_wait = changes[first_end].0 - changes[first].0;
    let gap = changes[second].0 - changes[first].0;
    let second_wait = changes[second_end].0 - changes[second].0;

    assert!(first_wait >= Duration::from_millis(90), "first move took {:?}", first_wait);
    assert!(gap >= Duration::from_millis(90), "second move began after {:?}", gap);
    assert!(second_wait >= Duration::from_millis(180), "second move took {:?}", second_wait);

    assert_eq!(servo.current_angle(), 180.0);

    servo.shutdown().unwrap();
}

#[test]
fn test_moves_execute_in_order() {
    let board = SimBoard::new();
    let params = params();
    let servo = TimedServoQueue::new(&board, &params).unwrap();
    board.clear_trace();

    for &angle in [45.0, 135.0, 90.0].iter() {
        servo.move_to(angle).unwrap();
    }
    assert!(servo.wait_idle(TIMEOUT));

    let duties: Vec<f64> = board
        .duty_changes(params.pin)
        .iter()
        .map(|&(_, d)| d)
        .filter(|&d| d != 0.0)
        .collect();
    assert_eq!(duties.len(), 3);
    assert!((duties[0] - 5.0).abs() < 1e-9);
    assert!((duties[1] - 10.0).abs() < 1e-9);
    assert!((duties[2] - 7.5).abs() < 1e-9);

    servo.shutdown().unwrap();
}

#[test]
fn test_out_of_range_moves_rejected() {
    let board = SimBoard::new();
    let params = params();
    let servo = TimedServoQueue::new(&board, &params).unwrap();
    board.clear_trace();

    assert!(servo.move_to(-1.0).unwrap_err().is_range());
    assert!(servo.move_to(180.5).unwrap_err().is_range());
    assert!(servo.move_to(f64::NAN).unwrap_err().is_range());
    assert!(servo.wait_idle(TIMEOUT));

    assert!(board.duty_changes(params.pin).is_empty());
    assert_eq!(servo.current_angle(), 90.0);

    servo.shutdown().unwrap();
}

#[test]
fn test_invalid_params_rejected() {
    let board = SimBoard::new();

    let bad_angle = ServoParams { initial_angle_deg: 200.0, ..params() };
    assert!(TimedServoQueue::new(&board, &bad_angle).err().unwrap().is_range());

    let bad_timing = ServoParams { time_per_degree_s: -0.1, ..params() };
    assert!(TimedServoQueue::new(&board, &bad_timing).err().unwrap().is_range());

    assert!(!board.is_claimed(params().pin));
}

#[test]
fn test_shutdown_stops_signal() {
    let board = SimBoard::new();
    let params = params();
    let servo = TimedServoQueue::new(&board, &params).unwrap();

    servo.shutdown().unwrap();

    let trace = board.trace();
    assert!(trace.iter().any(|e| e.signal == Signal::PwmStopped { bcm: params.pin }));
    assert!(!board.is_claimed(params.pin));
}
