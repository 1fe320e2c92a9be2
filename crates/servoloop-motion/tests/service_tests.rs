//! Motion control service against a recording motorcontrol stand-in.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;
use servoloop_controllers::AutoTuneConfig;
use servoloop_errors::{FaultCode, RTError};
use servoloop_feedback::{FeedbackPublisher, Polarity, SensorReading, position_feedback_cache};
use servoloop_motion::prelude::*;
use servoloop_motorcontrol::{MotorcontrolError, MotorcontrolResult};
use servoloop_rt::{MonotonicClock, PeriodicTask, ShutdownSignal, TaskConfig, TaskRunner};
use servoloop_watchdog::FaultLatch;

#[derive(Debug, Default)]
struct Recorded {
    torque: f64,
    torque_writes: usize,
    torque_control: bool,
    brake: Option<bool>,
    unreachable: bool,
}

/// Records what motion control asks of motorcontrol.
#[derive(Debug, Clone)]
struct RecordingMotor {
    recorded: Arc<Mutex<Recorded>>,
    latch: FaultLatch,
    upstream: UpstreamControlData,
}

impl RecordingMotor {
    fn new(latch: FaultLatch) -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Recorded::default())),
            latch,
            upstream: UpstreamControlData::default(),
        }
    }

    fn check(&self) -> MotorcontrolResult<()> {
        if self.recorded.lock().unreachable {
            return Err(MotorcontrolError::Rt(RTError::ServiceTimeout));
        }
        Ok(())
    }
}

impl TorqueActuator for RecordingMotor {
    fn set_torque(&self, torque: f64) -> MotorcontrolResult<()> {
        self.check()?;
        let mut recorded = self.recorded.lock();
        recorded.torque = torque;
        recorded.torque_writes += 1;
        Ok(())
    }

    fn set_torque_control_enabled(&self, enabled: bool) -> MotorcontrolResult<()> {
        self.check()?;
        self.recorded.lock().torque_control = enabled;
        Ok(())
    }

    fn set_brake_status(&self, engaged: bool) -> MotorcontrolResult<()> {
        self.check()?;
        self.recorded.lock().brake = Some(engaged);
        Ok(())
    }

    fn reset_faults(&self) -> MotorcontrolResult<FaultCode> {
        self.check()?;
        Ok(self.latch.clear())
    }

    fn update_upstream_control_data(&self) -> MotorcontrolResult<UpstreamControlData> {
        self.check()?;
        Ok(UpstreamControlData {
            error_status: self.latch.current(),
            ..self.upstream
        })
    }
}

struct Fixture {
    service: MotionControlService<RecordingMotor>,
    client: MotionControlClient,
    motor: RecordingMotor,
    publisher: FeedbackPublisher,
    latch: FaultLatch,
}

fn fixture(config: MotionControlConfig, upstream: UpstreamControlData) -> Result<Fixture, Box<dyn std::error::Error>> {
    let latch = FaultLatch::new();
    let (publisher, reader) = position_feedback_cache();
    let motor = RecordingMotor {
        upstream,
        ..RecordingMotor::new(latch.clone())
    };
    let (service, client) = MotionControlService::new(config, motor.clone(), reader, latch.clone())?;
    Ok(Fixture {
        service,
        client,
        motor,
        publisher,
        latch,
    })
}

/// Run `request` on a client thread while ticking the service here.
fn serve<T>(service: &mut MotionControlService<RecordingMotor>, request: impl FnOnce() -> T + Send + 'static) -> Option<T>
where
    T: Send + 'static,
{
    let worker = thread::spawn(request);
    while !worker.is_finished() {
        service.tick(0);
        thread::sleep(Duration::from_micros(200));
    }
    worker.join().ok()
}

fn tick_n(service: &mut MotionControlService<RecordingMotor>, n: usize) {
    for _ in 0..n {
        service.tick(0);
    }
}

#[test]
fn test_torque_control_is_forwarded() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig {
        profiler: servoloop_motion::ProfilerConfig {
            enabled: false,
            ..Default::default()
        },
        ..MotionControlConfig::default()
    };
    let mut f = fixture(config, UpstreamControlData::default())?;

    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.enable_torque_control()), Some(Ok(())));
    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.set_torque(250.0)), Some(Ok(())));
    tick_n(&mut f.service, 2);
    {
        let recorded = f.motor.recorded.lock();
        assert!(recorded.torque_control);
        assert_abs_diff_eq!(recorded.torque, 250.0);
        assert_eq!(recorded.brake, Some(false));
    }

    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.disable()), Some(Ok(())));
    tick_n(&mut f.service, 1);
    assert!(!f.motor.recorded.lock().torque_control);
    let state = serve(&mut f.service, move || f.client.get_state());
    assert_eq!(state, Some(Ok(MotionState::Disabled)));
    Ok(())
}

#[test]
fn test_latched_fault_disables_until_reset() -> Result<(), Box<dyn std::error::Error>> {
    let mut f = fixture(MotionControlConfig::default(), UpstreamControlData::default())?;

    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.enable_velocity_control()), Some(Ok(())));
    tick_n(&mut f.service, 2);
    assert!(f.motor.recorded.lock().torque_control);

    assert!(f.latch.latch(FaultCode::UnderVoltage));
    tick_n(&mut f.service, 1);
    assert!(!f.motor.recorded.lock().torque_control);

    let c = f.client.clone();
    let rejected = serve(&mut f.service, move || c.enable_position_control(ControlStrategy::PositionPid));
    assert_eq!(rejected, Some(Err(MotionError::Faulted(FaultCode::UnderVoltage))));

    let c = f.client.clone();
    let cleared = serve(&mut f.service, move || c.reset_motorcontrol_faults());
    assert_eq!(cleared, Some(Ok(FaultCode::UnderVoltage)));
    assert_eq!(f.latch.current(), FaultCode::NoFault);

    let c = f.client.clone();
    assert_eq!(
        serve(&mut f.service, move || c.enable_position_control(ControlStrategy::PositionPid)),
        Some(Ok(()))
    );
    Ok(())
}

#[test]
fn test_unreachable_motorcontrol_latches_fault() -> Result<(), Box<dyn std::error::Error>> {
    let mut f = fixture(MotionControlConfig::default(), UpstreamControlData::default())?;
    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.enable_torque_control()), Some(Ok(())));
    tick_n(&mut f.service, 1);

    f.motor.recorded.lock().unreachable = true;
    tick_n(&mut f.service, 1);
    assert_eq!(f.latch.current(), FaultCode::DeadlineMissed);
    tick_n(&mut f.service, 1);
    assert_eq!(
        f.service.coordinator().state(),
        MotionState::Faulted(FaultCode::DeadlineMissed)
    );
    Ok(())
}

#[test]
fn test_control_data_in_user_frame() -> Result<(), Box<dyn std::error::Error>> {
    let config = MotionControlConfig {
        polarity: Polarity::Inverted,
        ..MotionControlConfig::default()
    };
    let upstream = UpstreamControlData {
        position: 4_000,
        velocity: -120,
        computed_torque: 35.0,
        v_dc_mv: 48_000,
        ..UpstreamControlData::default()
    };
    let mut f = fixture(config, upstream)?;
    f.publisher.publish(&SensorReading {
        count: 4_000,
        velocity: -120,
        ..SensorReading::default()
    });

    let downstream = DownstreamControlData {
        position_cmd: -3_000,
        ..DownstreamControlData::default()
    };
    let c = f.client.clone();
    let reply = serve(&mut f.service, move || c.update_control_data(downstream)).ok_or("client panicked")??;
    assert_eq!(reply.position, -4_000);
    assert_eq!(reply.velocity, 120);
    assert_abs_diff_eq!(reply.computed_torque, -35.0);
    assert_eq!(reply.v_dc_mv, 48_000);
    assert_eq!(f.service.coordinator().downstream().position_cmd, -3_000);

    tick_n(&mut f.service, 1);
    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.get_position()), Some(Ok(-4_000)));
    assert_eq!(serve(&mut f.service, move || f.client.get_velocity()), Some(Ok(120)));
    Ok(())
}

#[test]
fn test_rejected_config_keeps_previous() -> Result<(), Box<dyn std::error::Error>> {
    let mut f = fixture(MotionControlConfig::default(), UpstreamControlData::default())?;
    let bad = MotionControlConfig {
        min_position: 10,
        max_position: -10,
        ..MotionControlConfig::default()
    };
    let c = f.client.clone();
    let result = serve(&mut f.service, move || c.set_config(bad));
    assert!(matches!(result, Some(Err(MotionError::Config(_)))));

    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.set_j(0.001)), Some(Ok(())));
    let config = serve(&mut f.service, move || f.client.get_config()).ok_or("client panicked")??;
    assert_eq!(config.min_position, MotionControlConfig::default().min_position);
    assert_abs_diff_eq!(config.nonlinear.j, 0.001);
    Ok(())
}

#[test]
fn test_autotune_requests() -> Result<(), Box<dyn std::error::Error>> {
    let mut f = fixture(MotionControlConfig::default(), UpstreamControlData::default())?;

    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.get_tuning_result()), Some(Ok(None)));
    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.start_autotune(AutoTuneConfig::default())), Some(Ok(())));
    let c = f.client.clone();
    assert_eq!(serve(&mut f.service, move || c.get_state()), Some(Ok(MotionState::AutoTune)));

    // The recording motor never moves, so identification fails.
    tick_n(&mut f.service, 1_100);
    let result = serve(&mut f.service, move || f.client.get_tuning_result()).ok_or("client panicked")??;
    assert!(matches!(result, Some(Err(_))));
    Ok(())
}

#[test]
fn test_task_stops_torque_on_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture(MotionControlConfig::default(), UpstreamControlData::default())?;
    let shutdown = ShutdownSignal::new();
    let handle = TaskRunner::spawn(
        f.service,
        TaskConfig::new("motion", Duration::from_millis(1)).with_overrun_tolerance(Duration::from_millis(500)),
        MonotonicClock::new(),
        shutdown.clone(),
        f.latch.clone(),
    )?;

    f.client.enable_torque_control()?;
    f.client.set_torque(80.0)?;
    thread::sleep(Duration::from_millis(20));
    assert!(f.motor.recorded.lock().torque_control);
    assert!(f.motor.recorded.lock().torque_writes > 0);

    shutdown.trigger();
    let exit = handle.join()?;
    assert!(exit.ticks > 0);
    let recorded = f.motor.recorded.lock();
    assert!(!recorded.torque_control);
    assert_abs_diff_eq!(recorded.torque, 0.0);
    Ok(())
}
