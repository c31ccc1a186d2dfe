/// View distance that grows over time after a spawn or teleport
///
/// The distance grows by one chunk side per second, from the initial
/// distance up to the target, so a fresh viewer does not schedule its whole
/// neighbourhood in a single frame.
#[derive(Debug, Clone)]
pub struct ViewDistanceRamp {
    initial: f32,
    target: f32,
    growth_per_second: f32,
    current: f32,
    spawned_at_ms: Option<u64>,
}

impl ViewDistanceRamp {
    pub fn new(initial: f32, target: f32, chunk_side: u32) -> Self {
        let initial = initial.min(target);
        Self {
            initial,
            target,
            growth_per_second: chunk_side as f32,
            current: initial,
            spawned_at_ms: None,
        }
    }

    /// Restart the ramp from the initial distance
    pub fn on_spawn(&mut self, now_ms: u64) {
        self.current = self.initial;
        self.spawned_at_ms = Some(now_ms);
    }

    /// Advance to `now_ms` and return the current distance
    pub fn advance(&mut self, now_ms: u64) -> f32 {
        let spawned_at = *self.spawned_at_ms.get_or_insert(now_ms);
        let elapsed_ms = now_ms.saturating_sub(spawned_at) as f32;
        let grown = self.initial + self.growth_per_second * elapsed_ms / 1000.0;
        self.current = self.current.max(grown.min(self.target));
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Change the target; a lower target shrinks the current distance at once
    pub fn set_target(&mut self, target: f32) {
        self.target = target.max(0.0);
        self.initial = self.initial.min(self.target);
        self.current = self.current.min(self.target);
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_grows_by_chunk_side_per_second() {
        let mut ramp = ViewDistanceRamp::new(1.0, 128.0, 32);
        ramp.on_spawn(1_000);
        assert_eq!(ramp.advance(1_000), 1.0);
        assert_eq!(ramp.advance(1_500), 17.0);
        assert_eq!(ramp.advance(3_000), 65.0);
        assert_eq!(ramp.advance(10_000), 128.0);
        assert!(ramp.is_complete());
    }

    #[test]
    fn test_ramp_matches_closed_form() {
        let side = 16;
        let target = 100.0;
        let mut ramp = ViewDistanceRamp::new(1.0, target, side);
        ramp.on_spawn(0);

        let mut previous = ramp.current();
        for t in (0..10_000u64).step_by(37) {
            let current = ramp.advance(t);
            let expected = f32::min(target, 1.0 + side as f32 * t as f32 / 1000.0);
            assert!((current - expected).abs() < 1e-3, "t={t}: {current} vs {expected}");
            assert!(current >= previous);
            assert!(current <= target);
            previous = current;
        }
    }

    #[test]
    fn test_spawn_resets_the_ramp() {
        let mut ramp = ViewDistanceRamp::new(1.0, 64.0, 32);
        ramp.on_spawn(0);
        ramp.advance(5_000);
        assert_eq!(ramp.current(), 64.0);

        ramp.on_spawn(6_000);
        assert_eq!(ramp.current(), 1.0);
        assert_eq!(ramp.advance(6_250), 9.0);
    }

    #[test]
    fn test_lower_target_shrinks_current() {
        let mut ramp = ViewDistanceRamp::new(1.0, 64.0, 32);
        ramp.on_spawn(0);
        ramp.advance(5_000);
        ramp.set_target(20.0);
        assert_eq!(ramp.current(), 20.0);
        assert_eq!(ramp.advance(6_000), 20.0);
    }

    #[test]
    fn test_first_advance_without_spawn_starts_the_clock() {
        let mut ramp = ViewDistanceRamp::new(2.0, 64.0, 8);
        assert_eq!(ramp.advance(42_000), 2.0);
        assert_eq!(ramp.advance(43_000), 10.0);
    }
}
