//! Position feedback task and its request interface.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use servoloop_errors::{ConfigError, DecodeStatus};
use servoloop_rt::{PeriodicTask, ServiceClient, request_channel, respond};
use servoloop_watchdog::{FaultLatch, SensorMonitor};
use tracing::{debug, error, info};

use crate::cache::FeedbackPublisher;
use crate::config::PositionFeedbackConfig;
use crate::error::FeedbackResult;
use crate::sensor::{SensorDecoder, SensorDiagnostics, SensorPort};

/// Multiturn count, singleturn position and decode status.
pub type PositionTriple = (i32, u32, DecodeStatus);

/// Requests served by [`PositionFeedbackService`].
#[derive(Debug)]
pub enum FeedbackRequest {
    /// Electrical angle with offset.
    GetAngle { response: Sender<u32> },
    /// Position with polarity applied.
    GetPosition { response: Sender<PositionTriple> },
    /// Position without polarity.
    GetRealPosition { response: Sender<PositionTriple> },
    /// Velocity in rpm.
    GetVelocity { response: Sender<i32> },
    /// Mechanical ticks per turn.
    GetTicksPerTurn { response: Sender<u32> },
    /// Active configuration.
    GetConfig {
        response: Sender<PositionFeedbackConfig>,
    },
    /// Replace the configuration.
    SetConfig {
        config: PositionFeedbackConfig,
        response: Sender<Result<(), ConfigError>>,
    },
    /// Rebase the multiturn count.
    SetPosition { count: i32, response: Sender<()> },
    /// Recompute the angle offset so the current angle reads `angle`.
    SetAngle { angle: u32, response: Sender<u32> },
    /// Decoder diagnostics.
    GetDiagnostics {
        response: Sender<SensorDiagnostics>,
    },
}

/// Periodic task owning one sensor.
///
/// Every tick it serves pending requests, polls the sensor, publishes the
/// reading to the feedback cache and escalates a persistently silent sensor
/// to [`servoloop_errors::FaultCode::SensorUnavailable`].
pub struct PositionFeedbackService<P> {
    config: PositionFeedbackConfig,
    decoder: SensorDecoder,
    port: P,
    publisher: FeedbackPublisher,
    requests: Receiver<FeedbackRequest>,
    monitor: SensorMonitor,
    latch: FaultLatch,
    last_status: DecodeStatus,
}

impl<P: SensorPort + 'static> PositionFeedbackService<P> {
    /// Create the service and its client.
    ///
    /// `sensor_timeout_cycles` is the number of consecutive unanswered polls
    /// tolerated before the fault is latched.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: PositionFeedbackConfig,
        port: P,
        publisher: FeedbackPublisher,
        latch: FaultLatch,
        sensor_timeout_cycles: u32,
    ) -> Result<(Self, PositionFeedbackClient), ConfigError> {
        config.validate()?;
        let (tx, requests) = request_channel();
        let service = Self {
            decoder: SensorDecoder::new(&config),
            config,
            port,
            publisher,
            requests,
            monitor: SensorMonitor::new(sensor_timeout_cycles),
            latch,
            last_status: DecodeStatus::NoError,
        };
        Ok((service, PositionFeedbackClient::new(tx)))
    }

    /// Decoder state, for inspection.
    pub fn decoder(&self) -> &SensorDecoder {
        &self.decoder
    }

    fn handle(&mut self, request: FeedbackRequest) {
        match request {
            FeedbackRequest::GetAngle { response } => {
                respond(&response, self.decoder.reading().angle);
            }
            FeedbackRequest::GetPosition { response } => {
                let r = self.decoder.reading();
                respond(&response, (r.count, r.singleturn, r.status));
            }
            FeedbackRequest::GetRealPosition { response } => {
                let r = self.decoder.real_position();
                respond(&response, (r.count, r.singleturn, r.status));
            }
            FeedbackRequest::GetVelocity { response } => {
                respond(&response, self.decoder.reading().velocity);
            }
            FeedbackRequest::GetTicksPerTurn { response } => {
                respond(&response, self.decoder.ticks_per_turn());
            }
            FeedbackRequest::GetConfig { response } => {
                respond(&response, self.config.clone());
            }
            FeedbackRequest::SetConfig { config, response } => {
                let result = config.validate();
                match &result {
                    Ok(()) => {
                        info!(sensor = ?config.sensor_type, "Position feedback reconfigured");
                        self.decoder = SensorDecoder::new(&config);
                        self.config = config;
                    }
                    Err(e) => debug!(error = %e, "Position feedback configuration rejected"),
                }
                respond(&response, result);
            }
            FeedbackRequest::SetPosition { count, response } => {
                self.decoder.set_position(count);
                respond(&response, ());
            }
            FeedbackRequest::SetAngle { angle, response } => {
                let offset = self.decoder.set_angle(angle);
                self.config.offset = offset;
                info!(angle, offset, "Electrical angle offset updated");
                respond(&response, offset);
            }
            FeedbackRequest::GetDiagnostics { response } => {
                respond(&response, self.decoder.diagnostics());
            }
        }
    }
}

impl<P: SensorPort + 'static> PeriodicTask for PositionFeedbackService<P> {
    fn tick(&mut self, now_us: u64) {
        while let Ok(request) = self.requests.try_recv() {
            self.handle(request);
        }

        let reading = self.decoder.poll(&mut self.port, now_us);
        self.publisher.publish(&reading);

        if reading.status != self.last_status {
            if reading.status.is_ok() {
                debug!("Sensor decoding recovered");
            } else {
                debug!(status = %reading.status, "Sensor decode error, holding last reading");
            }
            self.last_status = reading.status;
        }
        if let Some(fault) = self.monitor.observe(reading.status) {
            if self.latch.latch(fault) {
                error!(
                    fault = %fault,
                    cycles = self.monitor.consecutive(),
                    "Position sensor unavailable"
                );
            }
        }
    }

    fn on_stop(&mut self) {
        info!(
            generation = self.publisher.generation(),
            "Position feedback service stopped"
        );
    }
}

/// Request interface of a [`PositionFeedbackService`].
#[derive(Debug, Clone)]
pub struct PositionFeedbackClient {
    inner: ServiceClient<FeedbackRequest>,
}

impl PositionFeedbackClient {
    fn new(requests: Sender<FeedbackRequest>) -> Self {
        Self {
            inner: ServiceClient::new(requests),
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.with_timeout(timeout),
        }
    }

    /// Electrical angle, offset applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_angle(&self) -> FeedbackResult<u32> {
        Ok(self.inner.call(|response| FeedbackRequest::GetAngle { response })?)
    }

    /// `(count, singleturn, status)` with polarity applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_position(&self) -> FeedbackResult<PositionTriple> {
        Ok(self.inner.call(|response| FeedbackRequest::GetPosition { response })?)
    }

    /// `(count, singleturn, status)` as counted by the sensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_real_position(&self) -> FeedbackResult<PositionTriple> {
        Ok(self
            .inner
            .call(|response| FeedbackRequest::GetRealPosition { response })?)
    }

    /// Velocity in rpm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_velocity(&self) -> FeedbackResult<i32> {
        Ok(self.inner.call(|response| FeedbackRequest::GetVelocity { response })?)
    }

    /// Mechanical ticks per turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_ticks_per_turn(&self) -> FeedbackResult<u32> {
        Ok(self
            .inner
            .call(|response| FeedbackRequest::GetTicksPerTurn { response })?)
    }

    /// Active configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_config(&self) -> FeedbackResult<PositionFeedbackConfig> {
        Ok(self.inner.call(|response| FeedbackRequest::GetConfig { response })?)
    }

    /// Replace the configuration between two polls. Decoding restarts from
    /// the new configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or rejects `config`.
    pub fn set_config(&self, config: PositionFeedbackConfig) -> FeedbackResult<()> {
        self.inner
            .call(|response| FeedbackRequest::SetConfig { config, response })??;
        Ok(())
    }

    /// Rebase the multiturn count so that the current position reads `count`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_position(&self, count: i32) -> FeedbackResult<()> {
        Ok(self
            .inner
            .call(|response| FeedbackRequest::SetPosition { count, response })?)
    }

    /// Make the current electrical angle read `angle`. Returns the new offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_angle(&self, angle: u32) -> FeedbackResult<u32> {
        Ok(self
            .inner
            .call(|response| FeedbackRequest::SetAngle { angle, response })?)
    }

    /// Decoder diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_diagnostics(&self) -> FeedbackResult<SensorDiagnostics> {
        Ok(self
            .inner
            .call(|response| FeedbackRequest::GetDiagnostics { response })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::position_feedback_cache;
    use crate::config::SensorType;
    use crate::qei::QuadratureSample;
    use servoloop_errors::FaultCode;
    use std::thread;

    struct SilentPort;

    impl SensorPort for SilentPort {}

    struct StepPort {
        phase: u8,
    }

    impl SensorPort for StepPort {
        fn quadrature(&mut self) -> QuadratureSample {
            self.phase = (self.phase + 1) % 4;
            QuadratureSample::from_phase(self.phase, false)
        }
    }

    fn qei_config() -> PositionFeedbackConfig {
        PositionFeedbackConfig {
            sensor_type: SensorType::Qei,
            ..PositionFeedbackConfig::default()
        }
    }

    /// Run `request` on a client thread while ticking the service here.
    fn serve<P, T>(
        service: &mut PositionFeedbackService<P>,
        request: impl FnOnce() -> T + Send + 'static,
    ) -> Option<T>
    where
        P: SensorPort + 'static,
        T: Send + 'static,
    {
        let worker = thread::spawn(request);
        let mut now = 0;
        while !worker.is_finished() {
            service.tick(now);
            now += 100;
            thread::sleep(Duration::from_micros(100));
        }
        worker.join().ok()
    }

    #[test]
    fn test_tick_publishes_reading() -> Result<(), Box<dyn std::error::Error>> {
        let (publisher, reader) = position_feedback_cache();
        let (mut service, _client) = PositionFeedbackService::new(
            qei_config(),
            StepPort { phase: 0 },
            publisher,
            FaultLatch::new(),
            10,
        )?;
        for t in 0..5 {
            service.tick(t * 100);
        }
        let (reading, generation) = reader.snapshot();
        assert_eq!(generation, 5);
        assert_eq!(reading.count, 4);
        assert_eq!(reading.timestamp_us, 400);
        Ok(())
    }

    #[test]
    fn test_client_requests_are_served() -> Result<(), Box<dyn std::error::Error>> {
        let (publisher, _reader) = position_feedback_cache();
        let (mut service, client) = PositionFeedbackService::new(
            qei_config(),
            StepPort { phase: 0 },
            publisher,
            FaultLatch::new(),
            10,
        )?;

        let c = client.clone();
        assert_eq!(serve(&mut service, move || c.get_ticks_per_turn()), Some(Ok(4_000)));

        let c = client.clone();
        let bad = PositionFeedbackConfig {
            pole_pairs: 0,
            ..qei_config()
        };
        assert_eq!(
            serve(&mut service, move || c.set_config(bad)),
            Some(Err(ConfigError::zero("pole_pairs").into()))
        );
        assert_eq!(service.config.pole_pairs, 4);

        let c = client.clone();
        assert_eq!(serve(&mut service, move || c.set_position(-50)), Some(Ok(())));
        let position = serve(&mut service, move || client.get_position());
        assert!(matches!(position, Some(Ok((count, _, DecodeStatus::NoError))) if count > -50));
        Ok(())
    }

    #[test]
    fn test_stopped_service_reports_closed_channel() -> Result<(), Box<dyn std::error::Error>> {
        let (publisher, _reader) = position_feedback_cache();
        let (service, client) = PositionFeedbackService::new(
            qei_config(),
            SilentPort,
            publisher,
            FaultLatch::new(),
            10,
        )?;
        drop(service);
        assert_eq!(
            client.get_angle(),
            Err(servoloop_errors::RTError::ChannelClosed.into())
        );
        Ok(())
    }

    #[test]
    fn test_silent_sensor_latches_fault() -> Result<(), Box<dyn std::error::Error>> {
        let config = PositionFeedbackConfig {
            sensor_type: SensorType::Biss,
            ..PositionFeedbackConfig::default()
        };
        let latch = FaultLatch::new();
        let (publisher, reader) = position_feedback_cache();
        let (mut service, _client) =
            PositionFeedbackService::new(config, SilentPort, publisher, latch.clone(), 3)?;

        for t in 0..3 {
            service.tick(t);
        }
        assert!(!latch.is_faulted());
        assert_eq!(reader.latest().status, DecodeStatus::NoAck);

        service.tick(3);
        assert_eq!(latch.current(), FaultCode::SensorUnavailable);
        Ok(())
    }
}
