//! Integration tests of the motor protocol encoder against the simulated board.

use std::time::{Duration, Instant};

use act_lib::{
    hal::{sim::{Signal, SimBoard}, HalError},
    motor::{Command, MotorParams, MotorProtocolEncoder, Packet},
    ActError,
};

const PORT: &str = "/dev/ttyTEST";

fn params() -> MotorParams {
    MotorParams {
        port: String::from(PORT),
        startup_delay_ms: 0,
        pump_interval_ms: 0,
        ..MotorParams::default()
    }
}

fn packets(board: &SimBoard) -> Vec<Packet> {
    board
        .serial_writes(PORT)
        .iter()
        .map(|bytes| Packet::parse(bytes).expect("invalid packet on the wire"))
        .collect()
}

fn summary(packets: &[Packet]) -> Vec<(Command, u8)> {
    packets.iter().map(|p| (p.command(), p.data())).collect()
}

#[test]
fn test_startup_configures_controller() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();

    // 200 ms auto-stop is sent as 2 units, then the deadband
    assert_eq!(
        board.serial_writes(PORT),
        vec![vec![128, 14, 2, 16], vec![128, 17, 5, 22]]
    );

    motors.shutdown().unwrap();
}

#[test]
fn test_drive_and_stop_packets() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();
    board.clear_trace();

    motors.drive(-25, -50).unwrap();
    assert_eq!(
        summary(&packets(&board)),
        vec![(Command::Backward, 25), (Command::Left, 50)]
    );
    assert!(packets(&board).iter().all(|p| p.address() == 128));

    board.clear_trace();
    motors.stop().unwrap();
    assert_eq!(
        summary(&packets(&board)),
        vec![
            (Command::Forward, 0),
            (Command::Backward, 0),
            (Command::Right, 0),
            (Command::Left, 0),
        ]
    );

    motors.shutdown().unwrap();
}

#[test]
fn test_out_of_range_requests_send_nothing() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();
    board.clear_trace();

    assert!(motors.drive(128, 0).unwrap_err().is_range());
    assert!(motors.drive(0, -200).unwrap_err().is_range());
    assert!(motors.set_ramping(0).unwrap_err().is_range());
    assert!(motors.set_ramping(81).unwrap_err().is_range());
    assert!(motors.queue_command(Command::Forward, 128).unwrap_err().is_range());
    assert!(board.serial_writes(PORT).is_empty());

    motors.set_ramping(20).unwrap();
    assert_eq!(summary(&packets(&board)), vec![(Command::Ramping, 20)]);

    motors.shutdown().unwrap();
}

#[test]
fn test_failed_write_reports_hardware_error() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();
    board.clear_trace();

    board.fail_next_serial_writes(1);
    match motors.drive(10, 10) {
        Err(ActError::HardwareIo(HalError::Uart(_))) => (),
        other => panic!("expected a UART error, got {:?}", other),
    }

    // The rest of the failed request was dropped, the link still works
    assert!(board.serial_writes(PORT).is_empty());
    motors.drive(10, 10).unwrap();
    assert_eq!(board.serial_writes(PORT).len(), 2);

    motors.shutdown().unwrap();
}

#[test]
fn test_queued_commands_are_pumped() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();
    board.clear_trace();

    motors.queue_command(Command::Forward, 40).unwrap();
    motors.queue_command(Command::Right, 20).unwrap();
    assert!(motors.wait_idle(Duration::from_secs(5)));
    assert_eq!(motors.queued(), 0);

    assert_eq!(
        summary(&packets(&board)),
        vec![(Command::Forward, 40), (Command::Right, 20)]
    );

    motors.shutdown().unwrap();
}

#[test]
fn test_full_queue_fails_fast() {
    let board = SimBoard::new();
    let params = MotorParams {
        queue_capacity: 2,
        pump_interval_ms: 200,
        ..params()
    };
    let motors = MotorProtocolEncoder::new(&board, &params).unwrap();

    let start = Instant::now();
    let mut accepted = 0;
    let err = loop {
        match motors.queue_command(Command::Forward, 1) {
            Ok(()) => accepted += 1,
            Err(e) => break e,
        }
        assert!(accepted <= 10, "queue never filled");
    };

    assert!(matches!(err, ActError::QueueFull(2)));
    assert!(accepted == 2 || accepted == 3);
    assert!(start.elapsed() < Duration::from_millis(100));

    motors.shutdown().unwrap();
}

#[test]
fn test_shutdown_closes_link() {
    let board = SimBoard::new();
    let motors = MotorProtocolEncoder::new(&board, &params()).unwrap();
    assert!(board.is_open(PORT));

    motors.shutdown().unwrap();

    assert!(!board.is_open(PORT));
    assert!(board
        .trace()
        .iter()
        .any(|e| e.signal == Signal::SerialClosed { path: String::from(PORT) }));
}
