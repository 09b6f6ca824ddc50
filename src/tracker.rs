//! Belt position estimate.
//!
//! The line moves at a constant speed, so the distance travelled since the
//! session began is `speed * elapsed`. Reports and the operator display use
//! the value rounded to centimetres; that rounding is part of the contract.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

pub struct PositionTracker {
    /// Metres per second. Not validated here; see `InspectorConfig::validate`.
    speed: f64,
    started_at: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl PositionTracker {
    pub fn new(speed: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            speed,
            started_at: None,
            clock,
        }
    }

    /// Start (or restart) measuring from the current instant.
    pub fn start(&mut self) {
        self.started_at = Some(self.clock.elapsed());
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Estimated metres travelled, rounded to 2 decimals. `0.0` when stopped.
    pub fn get_length(&self) -> f64 {
        let Some(started_at) = self.started_at else {
            return 0.0;
        };
        let elapsed = self.clock.elapsed().saturating_sub(started_at);
        round_centimetres(self.speed * elapsed.as_secs_f64())
    }

    /// Overlay text for the live view.
    pub fn display(&self) -> String {
        format!("Length: {:.2} m", self.get_length())
    }
}

fn round_centimetres(metres: f64) -> f64 {
    (metres * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;

    fn tracker(speed: f64) -> (PositionTracker, Arc<ManualClock>) {
        let wall = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = Arc::new(ManualClock::new(wall));
        (PositionTracker::new(speed, clock.clone()), clock)
    }

    #[test]
    fn length_is_zero_before_start() {
        let (tracker, clock) = tracker(50.0);
        clock.advance_secs_f64(3.0);
        assert!(!tracker.is_running());
        assert_eq!(tracker.get_length(), 0.0);
    }

    #[test]
    fn length_is_speed_times_elapsed() {
        let (mut tracker, clock) = tracker(50.0);
        tracker.start();
        for (t, expected) in [(0.0, 0.0), (0.25, 12.5), (1.0, 50.0), (2.0, 100.0)] {
            let target = Duration::from_secs_f64(t);
            let now = clock.elapsed();
            if target > now {
                clock.advance(target - now);
            }
            assert_eq!(tracker.get_length(), expected, "t={t}");
        }
    }

    #[test]
    fn length_is_rounded_to_two_decimals() {
        let (mut tracker, clock) = tracker(1.0);
        tracker.start();
        clock.advance(Duration::from_micros(1_234_567));
        assert_eq!(tracker.get_length(), 1.23);
        clock.advance(Duration::from_millis(2));
        assert_eq!(tracker.get_length(), 1.24);
    }

    #[test]
    fn stop_resets_to_zero() {
        let (mut tracker, clock) = tracker(50.0);
        tracker.start();
        clock.advance_secs_f64(1.0);
        tracker.stop();
        assert_eq!(tracker.get_length(), 0.0);
        tracker.stop();
        assert_eq!(tracker.get_length(), 0.0);
    }

    #[test]
    fn restart_discards_previous_progress() {
        let (mut tracker, clock) = tracker(10.0);
        tracker.start();
        clock.advance_secs_f64(5.0);
        assert_eq!(tracker.get_length(), 50.0);

        tracker.start();
        assert_eq!(tracker.get_length(), 0.0);
        clock.advance_secs_f64(0.5);
        assert_eq!(tracker.get_length(), 5.0);
    }

    #[test]
    fn length_never_decreases_while_running() {
        let (mut tracker, clock) = tracker(37.5);
        tracker.start();
        let mut last = tracker.get_length();
        for _ in 0..50 {
            clock.advance(Duration::from_millis(17));
            let now = tracker.get_length();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn display_formats_for_overlay() {
        let (mut tracker, clock) = tracker(50.0);
        tracker.start();
        clock.advance_secs_f64(0.5);
        assert_eq!(tracker.display(), "Length: 25.00 m");
    }
}
