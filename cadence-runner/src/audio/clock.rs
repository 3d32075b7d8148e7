/// Samples played since `minimum`, correct across the 2^32 wrap of the hardware
/// position counter.
pub fn elapsed_samples(position: u32, minimum: u32) -> u32 {
    position.wrapping_sub(minimum)
}

/// Maps the hardware play position to progress through the current tick.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    samples_per_tick: u32,
    minimum_position: u32,
    started: bool,
}

impl PlaybackClock {
    pub fn new(samples_per_tick: u32) -> Self {
        Self {
            samples_per_tick: samples_per_tick.max(1),
            minimum_position: 0,
            started: false,
        }
    }

    pub fn minimum_position(&self) -> u32 {
        self.minimum_position
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    /// Called once per completed tick.
    pub fn advance(&mut self) {
        self.minimum_position = self.minimum_position.wrapping_add(self.samples_per_tick);
    }

    pub fn progress(&self, position: u32) -> f32 {
        if !self.started {
            return 0.0;
        }
        let elapsed = elapsed_samples(position, self.minimum_position);
        (elapsed as f32 / self.samples_per_tick as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn elapsed_wraps_past_counter_limit() {
        assert_eq!(elapsed_samples(5, 4_294_967_294), 7);
        assert_eq!(elapsed_samples(10, 4), 6);
        assert_eq!(elapsed_samples(4, 4), 0);
    }

    #[test]
    fn progress_is_zero_before_start() {
        let clock = PlaybackClock::new(441);
        assert_eq!(clock.progress(200), 0.0);
    }

    #[test]
    fn progress_is_clamped() {
        let mut clock = PlaybackClock::new(441);
        clock.start();
        assert_eq!(clock.progress(0), 0.0);
        assert_relative_eq!(clock.progress(220), 220.0 / 441.0);
        assert_eq!(clock.progress(441), 1.0);
        assert_eq!(clock.progress(5000), 1.0);
    }

    #[test]
    fn minimum_wraps_like_the_hardware_counter() {
        let mut clock = PlaybackClock::new(1000);
        clock.minimum_position = u32::MAX - 499;
        clock.advance();
        assert_eq!(clock.minimum_position(), 500);

        clock.start();
        assert_relative_eq!(clock.progress(750), 0.25);
    }
}
