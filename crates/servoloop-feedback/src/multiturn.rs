//! Multiturn counting for singleturn sensors.

/// Builds an absolute position from consecutive singleturn readings.
///
/// A jump of more than half a turn between two readings is taken as a wrap
/// through zero, so the turn counter changes by at most one per update. This
/// assumes the shaft moves less than half a turn per sampling period.
///
/// The published count wraps to 0 when its magnitude exceeds `max_ticks` and
/// keeps counting from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiturnTracker {
    resolution: u32,
    max_ticks: i32,
    turns: i64,
    offset: i64,
    travel: i64,
    last: Option<u32>,
}

impl MultiturnTracker {
    /// Create a tracker for `resolution` ticks per turn.
    #[must_use]
    pub fn new(resolution: u32, max_ticks: i32) -> Self {
        Self {
            resolution: resolution.max(1),
            max_ticks: max_ticks.max(1),
            turns: 0,
            offset: 0,
            travel: 0,
            last: None,
        }
    }

    /// Feed the next singleturn reading and return the absolute count.
    pub fn update(&mut self, singleturn: u32) -> i32 {
        let singleturn = singleturn % self.resolution;
        if let Some(last) = self.last {
            let diff = i64::from(singleturn) - i64::from(last);
            let half = i64::from(self.resolution / 2);
            let resolution = i64::from(self.resolution);
            if diff < -half {
                self.turns += 1;
                self.travel += diff + resolution;
            } else if diff > half {
                self.turns -= 1;
                self.travel += diff - resolution;
            } else {
                self.travel += diff;
            }
        }
        self.last = Some(singleturn);

        if self.absolute().abs() > i64::from(self.max_ticks) {
            self.turns = 0;
            self.offset = -i64::from(singleturn);
        }
        self.count()
    }

    /// Absolute count of the last update.
    #[must_use]
    pub fn count(&self) -> i32 {
        i32::try_from(self.absolute()).unwrap_or(0)
    }

    /// Full turns since start (or since the last rebase).
    #[must_use]
    pub fn turns(&self) -> i64 {
        self.turns
    }

    /// Signed ticks travelled since the first update.
    ///
    /// Unaffected by the `max_ticks` fold and by rebasing, so it can feed a
    /// velocity estimate.
    #[must_use]
    pub fn travel(&self) -> i64 {
        self.travel
    }

    fn absolute(&self) -> i64 {
        self.turns * i64::from(self.resolution)
            + i64::from(self.last.unwrap_or(0))
            + self.offset
    }

    /// Rebase so that the current position reads `count`.
    pub fn set_count(&mut self, count: i32) {
        self.turns = 0;
        self.offset = i64::from(count) - i64::from(self.last.unwrap_or(0));
    }

    /// Forget the position history.
    pub fn reset(&mut self) {
        self.turns = 0;
        self.offset = 0;
        self.travel = 0;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increasing_wrap_counts_up() {
        let mut tracker = MultiturnTracker::new(1_000, i32::MAX);
        for singleturn in [0, 300, 600, 900] {
            tracker.update(singleturn);
        }
        assert_eq!(tracker.update(100), 1_100);
        assert_eq!(tracker.turns(), 1);
    }

    #[test]
    fn test_decreasing_wrap_counts_down() {
        let mut tracker = MultiturnTracker::new(1_000, i32::MAX);
        tracker.update(100);
        assert_eq!(tracker.update(900), -100);
        assert_eq!(tracker.turns(), -1);
    }

    #[test]
    fn test_count_wraps_to_zero_at_max_ticks() {
        let mut tracker = MultiturnTracker::new(100, 250);
        let counts: Vec<i32> = (0..12u32).map(|step| tracker.update((step * 30) % 100)).collect();
        assert_eq!(counts, [0, 30, 60, 90, 120, 150, 180, 210, 240, 0, 30, 60]);
        assert_eq!(tracker.travel(), 11 * 30);
    }

    #[test]
    fn test_count_stays_within_max_ticks_both_ways() {
        let mut tracker = MultiturnTracker::new(100, 250);
        for step in 0..40u32 {
            assert!(tracker.update((step * 30) % 100).abs() <= 250);
        }
        let mut tracker = MultiturnTracker::new(100, 250);
        for step in 0..40u32 {
            let singleturn = (4_000 - step * 30) % 100;
            assert!(tracker.update(singleturn).abs() <= 250);
        }
    }

    #[test]
    fn test_set_count_rebases() {
        let mut tracker = MultiturnTracker::new(1_000, i32::MAX);
        tracker.update(250);
        tracker.set_count(10_000);
        assert_eq!(tracker.count(), 10_000);
        assert_eq!(tracker.update(260), 10_010);
    }
}
