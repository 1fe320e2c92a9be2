//! Lock-free single-writer cache of the latest sensor reading.
//!
//! A sequence lock over per-field atomics: the writer makes the sequence odd,
//! stores the fields and makes it even again; readers copy the fields and
//! retry if the sequence was odd or changed meanwhile. Readers never block
//! the writer, and a reader never sees fields from two different publishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicU32, AtomicU64, Ordering, fence};

use servoloop_errors::DecodeStatus;

use crate::reading::SensorReading;

#[derive(Debug, Default)]
struct Slot {
    sequence: AtomicU64,
    angle: AtomicU32,
    singleturn: AtomicU32,
    count: AtomicI32,
    velocity: AtomicI32,
    status: AtomicU8,
    timestamp_us: AtomicU64,
}

/// Create a cache slot, returning its only writer and a cloneable reader.
#[must_use]
pub fn position_feedback_cache() -> (FeedbackPublisher, FeedbackReader) {
    let slot = Arc::new(Slot::default());
    (
        FeedbackPublisher { slot: slot.clone() },
        FeedbackReader { slot },
    )
}

/// Writing end of a cache slot. Deliberately not `Clone`.
#[derive(Debug)]
pub struct FeedbackPublisher {
    slot: Arc<Slot>,
}

impl FeedbackPublisher {
    /// Publish a new reading.
    pub fn publish(&mut self, reading: &SensorReading) {
        let slot = &self.slot;
        let sequence = slot.sequence.load(Ordering::Relaxed);
        slot.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        slot.angle.store(reading.angle, Ordering::Relaxed);
        slot.singleturn.store(reading.singleturn, Ordering::Relaxed);
        slot.count.store(reading.count, Ordering::Relaxed);
        slot.velocity.store(reading.velocity, Ordering::Relaxed);
        slot.status.store(reading.status.code(), Ordering::Relaxed);
        slot.timestamp_us.store(reading.timestamp_us, Ordering::Relaxed);

        slot.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Number of readings published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.sequence.load(Ordering::Relaxed) / 2
    }
}

/// Reading end of a cache slot.
#[derive(Debug, Clone)]
pub struct FeedbackReader {
    slot: Arc<Slot>,
}

impl FeedbackReader {
    /// Latest published reading and its generation.
    ///
    /// Generation `0` means nothing was published yet and the reading is all
    /// zeros.
    #[must_use]
    pub fn snapshot(&self) -> (SensorReading, u64) {
        let slot = &self.slot;
        loop {
            let before = slot.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let reading = SensorReading {
                angle: slot.angle.load(Ordering::Relaxed),
                singleturn: slot.singleturn.load(Ordering::Relaxed),
                count: slot.count.load(Ordering::Relaxed),
                velocity: slot.velocity.load(Ordering::Relaxed),
                status: DecodeStatus::from_code(slot.status.load(Ordering::Relaxed))
                    .unwrap_or_default(),
                timestamp_us: slot.timestamp_us.load(Ordering::Relaxed),
            };

            fence(Ordering::Acquire);
            if slot.sequence.load(Ordering::Relaxed) == before {
                return (reading, before / 2);
            }
        }
    }

    /// Latest published reading.
    #[must_use]
    pub fn latest(&self) -> SensorReading {
        self.snapshot().0
    }

    /// Number of readings published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.sequence.load(Ordering::Acquire) / 2
    }
}
