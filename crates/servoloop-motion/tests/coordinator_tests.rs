//! Closed-loop tests of the coordinator against a rigid-body motor model.

use std::f64::consts::TAU;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use servoloop_controllers::{AutoTuneConfig, NonlinearConfig, PidGains};
use servoloop_errors::FaultCode;
use servoloop_motion::prelude::*;
use servoloop_motion::{BrakeConfig, ProfilerConfig};

const PERIOD_S: f64 = 0.001;

/// `J dω/dt + f ω = T`, sampled like the feedback cache reports it.
struct Motor {
    inertia: f64,
    friction: f64,
    ticks_per_turn: f64,
    omega: f64,
    ticks: f64,
}

impl Motor {
    fn new(inertia: f64, friction: f64) -> Self {
        Self {
            inertia,
            friction,
            ticks_per_turn: 16_384.0,
            omega: 0.0,
            ticks: 0.0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn feedback(&self) -> MotionFeedback {
        MotionFeedback {
            position: self.ticks.round() as i32,
            velocity: (self.omega * 60.0 / TAU).round() as i32,
            fault: FaultCode::NoFault,
        }
    }

    fn apply(&mut self, command: &MotorCommand) {
        let torque = if command.torque_control { command.torque / 1_000.0 } else { 0.0 };
        let acceleration = (torque - self.friction * self.omega) / self.inertia;
        self.omega += acceleration * PERIOD_S;
        self.ticks += self.omega * PERIOD_S * self.ticks_per_turn / TAU;
    }
}

fn run(coordinator: &mut MotionControlCoordinator, motor: &mut Motor, steps: usize) -> i32 {
    let mut peak = i32::MIN;
    for _ in 0..steps {
        let feedback = motor.feedback();
        peak = peak.max(feedback.position);
        let command = coordinator.step(&feedback);
        motor.apply(&command);
    }
    peak
}

fn unprofiled() -> ProfilerConfig {
    ProfilerConfig {
        enabled: false,
        ..ProfilerConfig::default()
    }
}

fn position_target(ticks: i32) -> DownstreamControlData {
    DownstreamControlData {
        position_cmd: ticks,
        ..DownstreamControlData::default()
    }
}

#[test]
fn test_velocity_loop_reaches_setpoint() -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_velocity()?;
    coordinator.set_downstream(DownstreamControlData {
        velocity_cmd: 500,
        ..DownstreamControlData::default()
    });

    run(&mut coordinator, &mut motor, 3_000);
    assert!((motor.feedback().velocity - 500).abs() <= 5);
    Ok(())
}

#[test]
fn test_cascaded_position_reaches_one_turn() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder().profiler(unprofiled()).build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_position(ControlStrategy::PositionPidVelocityCascaded)?;
    coordinator.set_downstream(position_target(16_384));

    run(&mut coordinator, &mut motor, 6_000);
    assert!((motor.feedback().position - 16_384).abs() <= 10);
    Ok(())
}

#[test]
fn test_profiled_move_follows_the_profile() -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_position(ControlStrategy::PositionPidVelocityCascaded)?;
    coordinator.set_downstream(position_target(16_384));

    run(&mut coordinator, &mut motor, 1);
    // The first reference is a small step along the profile, not the target.
    assert!(coordinator.reference() > 0.0);
    assert!(coordinator.reference() < 100.0);

    run(&mut coordinator, &mut motor, 6_000);
    assert_relative_eq!(coordinator.reference(), 16_384.0, epsilon = 1e-6);
    assert!((motor.feedback().position - 16_384).abs() <= 20);
    Ok(())
}

#[test]
fn test_direct_position_pid() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder()
        .profiler(unprofiled())
        .position_gains(PidGains::new(0.1, 0.0, 0.01))
        .build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_position(ControlStrategy::PositionPid)?;
    coordinator.set_downstream(position_target(16_384));

    run(&mut coordinator, &mut motor, 5_000);
    assert!((motor.feedback().position - 16_384).abs() <= 10);
    Ok(())
}

#[test]
fn test_nonlinear_position_does_not_overshoot() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder()
        .profiler(unprofiled())
        .nonlinear(NonlinearConfig::default())
        .build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_position(ControlStrategy::NonlinearPosition)?;
    coordinator.set_downstream(position_target(2_048));

    let peak = run(&mut coordinator, &mut motor, 3_000);
    assert!((motor.feedback().position - 2_048).abs() <= 2);
    assert!(peak <= 2_050, "overshot to {peak}");
    Ok(())
}

#[test]
fn test_fault_stops_torque_until_cleared() -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_velocity()?;
    coordinator.set_downstream(DownstreamControlData {
        velocity_cmd: 300,
        ..DownstreamControlData::default()
    });
    run(&mut coordinator, &mut motor, 200);

    let faulted = MotionFeedback {
        fault: FaultCode::OverCurrentPhaseB,
        ..motor.feedback()
    };
    let command = coordinator.step(&faulted);
    assert!(!command.torque_control);
    assert_abs_diff_eq!(command.torque, 0.0);
    assert_eq!(
        coordinator.enable_position(ControlStrategy::PositionPid),
        Err(MotionError::Faulted(FaultCode::OverCurrentPhaseB))
    );

    assert!(coordinator.clear_fault());
    coordinator.enable_velocity()?;
    assert!(coordinator.step(&motor.feedback()).torque_control);
    Ok(())
}

#[test]
fn test_inverted_polarity_moves_in_user_direction() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder()
        .polarity(servoloop_feedback::Polarity::Inverted)
        .build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_velocity()?;
    coordinator.set_downstream(DownstreamControlData {
        velocity_cmd: 200,
        ..DownstreamControlData::default()
    });

    run(&mut coordinator, &mut motor, 2_000);
    assert!((motor.feedback().velocity + 200).abs() <= 5);
    assert!((coordinator.velocity() - 200).abs() <= 5);
    Ok(())
}

#[test]
fn test_offset_torque_is_added() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder().profiler(unprofiled()).build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    coordinator.enable_position(ControlStrategy::PositionPid)?;
    coordinator.set_downstream(DownstreamControlData {
        offset_torque: 150.0,
        ..DownstreamControlData::default()
    });
    let command = coordinator.step(&MotionFeedback::default());
    assert_relative_eq!(command.torque, 150.0);
    Ok(())
}

#[test]
fn test_autotune_identifies_plant() -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
    let mut motor = Motor::new(5e-5, 1e-3);
    let before = coordinator.config().velocity_pid.gains;
    coordinator.start_autotune(AutoTuneConfig::default())?;

    run(&mut coordinator, &mut motor, 1_100);
    assert_eq!(coordinator.state(), MotionState::Disabled);
    let result = coordinator
        .tuning_result()
        .ok_or("no tuning result")?
        .clone()?;
    assert_relative_eq!(result.inertia, 5e-5, max_relative = 0.1);
    assert_relative_eq!(result.friction, 1e-3, max_relative = 0.05);
    assert_eq!(coordinator.config().velocity_pid.gains, result.gains);
    assert_ne!(coordinator.config().velocity_pid.gains, before);
    Ok(())
}

#[test]
fn test_failed_autotune_keeps_gains() -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
    let before = coordinator.config().velocity_pid.gains;
    coordinator.start_autotune(AutoTuneConfig::default())?;

    // A locked rotor never moves.
    for _ in 0..1_100 {
        coordinator.step(&MotionFeedback::default());
    }
    assert!(matches!(coordinator.tuning_result(), Some(Err(_))));
    assert_eq!(coordinator.config().velocity_pid.gains, before);
    assert_eq!(coordinator.state(), MotionState::Disabled);
    Ok(())
}

#[test]
fn test_brake_is_released_before_torque() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig::builder()
        .brake(BrakeConfig {
            enabled: true,
            release_delay_ms: 10,
        })
        .build()?;
    let mut coordinator = MotionControlCoordinator::new(config);
    let mut motor = Motor::new(2e-4, 0.0);
    coordinator.enable_torque()?;
    coordinator.set_torque(200.0);

    run(&mut coordinator, &mut motor, 10);
    assert_eq!(motor.feedback().velocity, 0);
    run(&mut coordinator, &mut motor, 100);
    assert!(motor.feedback().velocity > 0);
    Ok(())
}
