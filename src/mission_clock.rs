use std::time::Duration;

/// Mission time anchored to the first satellite fix and carried forward by
/// the monotonic clock, so receiver time jumps and dropouts never move it.
#[derive(Clone, Copy, Debug, Default)]
pub struct MissionClock {
    anchor: Option<Anchor>,
}

#[derive(Clone, Copy, Debug)]
struct Anchor {
    epoch_offset_s: u32,
    reference: Duration,
}

impl MissionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.anchor.is_some()
    }

    /// Anchor on the first call only. Returns whether this call anchored.
    pub fn initialize(&mut self, seconds_of_day: u32, now: Duration) -> bool {
        if self.anchor.is_some() {
            return false;
        }
        self.anchor = Some(Anchor {
            epoch_offset_s: seconds_of_day,
            reference: now,
        });
        log::info!(
            "Mission clock started at {:02}:{:02}:{:02}",
            seconds_of_day / 3600 % 24,
            seconds_of_day / 60 % 60,
            seconds_of_day % 60
        );
        true
    }

    /// Offset plus whole seconds since the anchor
    pub fn elapsed_s(&self, now: Duration) -> Option<u32> {
        let anchor = self.anchor?;
        let since = now.saturating_sub(anchor.reference);
        let whole = u32::try_from(since.as_millis() / 1000).unwrap_or(u32::MAX);
        Some(anchor.epoch_offset_s.saturating_add(whole))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_has_no_time() {
        let clock = MissionClock::new();
        assert!(!clock.is_initialized());
        assert_eq!(clock.elapsed_s(Duration::from_secs(10)), None);
    }

    #[test]
    fn test_elapsed_truncates_to_whole_seconds() {
        let mut clock = MissionClock::new();
        let boot = Duration::from_millis(12_345);
        assert!(clock.initialize(36_000, boot));
        assert_eq!(clock.elapsed_s(boot), Some(36_000));
        assert_eq!(clock.elapsed_s(boot + Duration::from_millis(5_400)), Some(36_005));
        assert_eq!(clock.elapsed_s(boot + Duration::from_millis(999)), Some(36_000));
    }

    #[test]
    fn test_never_reinitialized() {
        let mut clock = MissionClock::new();
        clock.initialize(36_000, Duration::ZERO);
        // receiver clock jumps; mission time ignores it
        assert!(!clock.initialize(40_000, Duration::from_secs(3)));
        assert_eq!(clock.elapsed_s(Duration::from_secs(3)), Some(36_003));
    }

    #[test]
    fn test_monotonic() {
        let mut clock = MissionClock::new();
        clock.initialize(86_399, Duration::ZERO);
        let mut last = 0;
        for ms in (0..10_000).step_by(250) {
            let t = clock.elapsed_s(Duration::from_millis(ms)).unwrap();
            assert!(t >= last);
            last = t;
        }
        assert_eq!(last, 86_399 + 9);
    }
}
