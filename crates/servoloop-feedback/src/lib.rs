//! Position feedback for the servoloop drive.
//!
//! Decodes raw sensor signals into electrical angle, absolute position and
//! velocity, and publishes them to a lock-free cache read by the
//! commutation and motion control tasks.
//!
//! # Sensors
//!
//! - **Hall**: six sectors per electrical turn, interpolated angle, 3-tap
//!   filtered velocity ([`hall`])
//! - **QEI**: quadrature edge counting with optional index ([`qei`])
//! - **BiSS**: clocked absolute frames with CRC ([`biss`], [`crc`])
//!
//! The sensor is selected at runtime from [`PositionFeedbackConfig`]; one
//! [`SensorDecoder`] owns the decode state of one slot.
//!
//! # Errors
//!
//! Decode failures are not errors of the API: the decoder republishes the
//! last valid reading with a [`DecodeStatus`] other than `NoError`. Only a
//! sensor that stays silent escalates, through the fault latch.
//!
//! # Example
//!
//! ```
//! use servoloop_feedback::{BissConfig, BissFrame, BissLine, PositionFeedbackConfig,
//!     SensorDecoder, SensorPort, SensorType};
//!
//! struct Encoder(BissLine);
//! impl SensorPort for Encoder {
//!     fn serial_clock(&mut self) -> bool { self.0.clock() }
//! }
//!
//! let biss = BissConfig::default();
//! let config = PositionFeedbackConfig { sensor_type: SensorType::Biss, biss, ..Default::default() };
//! let frame = BissFrame { multiturn: 0, singleturn: 1 << 16, status: 0b11 };
//! let mut port = Encoder(BissLine::with_frame(&biss, &frame, 2, 2));
//!
//! let mut decoder = SensorDecoder::new(&config);
//! let reading = decoder.poll(&mut port, 0);
//! assert!(reading.status.is_ok());
//! assert_eq!(reading.singleturn, 1 << 16);
//! ```

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod biss;
pub mod cache;
pub mod config;
pub mod crc;
pub mod error;
pub mod hall;
pub mod multiturn;
pub mod qei;
pub mod reading;
pub mod sensor;
pub mod service;

pub use biss::{BissDecoder, BissFrame, BissLine, encode_frame};
pub use cache::{FeedbackPublisher, FeedbackReader, position_feedback_cache};
pub use config::{
    BissConfig, HallConfig, Polarity, PositionFeedbackConfig, PositionFeedbackConfigBuilder,
    QeiConfig, SensorType,
};
pub use error::{FeedbackError, FeedbackResult};
pub use hall::HallDecoder;
pub use multiturn::MultiturnTracker;
pub use qei::{QeiDecoder, QuadratureSample};
pub use reading::{ELECTRICAL_RESOLUTION, SensorReading, VelocityEstimator};
pub use sensor::{RealPosition, SensorDecoder, SensorDiagnostics, SensorKind, SensorPort, electrical_angle};
pub use service::{FeedbackRequest, PositionFeedbackClient, PositionFeedbackService, PositionTriple};
pub use servoloop_errors::DecodeStatus;
