//! Linear parameter ramps
//!
//! A change of volume, pan or speed on a playing instance is spread over a
//! fixed number of output frames so the waveform never jumps. A new target
//! received mid-ramp restarts the ramp from wherever the value currently is.

/// One ramped parameter, advanced once per output frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    current: f64,
    target: f64,
    increment: f64,
    remaining: u32,
    steps: u32,
}

impl Ramp {
    /// A settled ramp sitting at `value`
    pub fn new(value: f64, steps: u32) -> Self {
        Self {
            current: value,
            target: value,
            increment: 0.0,
            remaining: 0,
            steps,
        }
    }

    /// Rebuild a ramp from stored state
    pub(crate) fn from_parts(
        current: f64,
        target: f64,
        increment: f64,
        remaining: u32,
        steps: u32,
    ) -> Self {
        Self {
            current,
            target,
            increment,
            remaining,
            steps,
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn increment(&self) -> f64 {
        self.increment
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Head for `target` over a fresh set of steps, starting from the current value
    pub fn retarget(&mut self, target: f64) {
        self.target = target;
        if self.steps == 0 {
            self.jump(target);
            return;
        }
        self.increment = (target - self.current) / self.steps as f64;
        self.remaining = self.steps;
    }

    /// Set the value immediately, cancelling any ramp in progress
    pub fn jump(&mut self, value: f64) {
        self.current = value;
        self.target = value;
        self.increment = 0.0;
        self.remaining = 0;
    }

    /// Advance one frame. Returns true when the value changed.
    ///
    /// The final step lands exactly on the target.
    #[inline]
    pub fn step(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.current = self.target;
        } else {
            self.current += self.increment;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_ramp_does_not_move() {
        let mut ramp = Ramp::new(0.5, 1024);
        assert!(!ramp.step());
        assert_eq!(ramp.value(), 0.5);
    }

    #[test]
    fn test_ramp_reaches_target_exactly() {
        let mut ramp = Ramp::new(0.0, 1024);
        ramp.retarget(0.3);
        let mut steps = 0;
        while ramp.step() {
            steps += 1;
        }
        assert_eq!(steps, 1024);
        assert_eq!(ramp.value(), 0.3);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn test_ramp_per_step_delta_bounded() {
        let mut ramp = Ramp::new(1.0, 1024);
        ramp.retarget(0.0);
        let mut last = ramp.value();
        while ramp.step() {
            let delta = (ramp.value() - last).abs();
            assert!(delta <= 1.0 / 1024.0 + 1e-12, "delta {} too large", delta);
            last = ramp.value();
        }
        assert_eq!(ramp.value(), 0.0);
    }

    #[test]
    fn test_retarget_midway_restarts_from_current() {
        let mut ramp = Ramp::new(0.0, 100);
        ramp.retarget(1.0);
        for _ in 0..50 {
            ramp.step();
        }
        let midway = ramp.value();
        assert!((midway - 0.5).abs() < 1e-9);

        ramp.retarget(0.0);
        assert_eq!(ramp.remaining(), 100);
        assert!((ramp.increment() + midway / 100.0).abs() < 1e-12);
        for _ in 0..100 {
            ramp.step();
        }
        assert_eq!(ramp.value(), 0.0);
    }

    #[test]
    fn test_jump_cancels_ramp() {
        let mut ramp = Ramp::new(1.0, 4096);
        ramp.retarget(2.0);
        ramp.step();
        ramp.jump(0.5);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.value(), 0.5);
        assert_eq!(ramp.target(), 0.5);
    }

    #[test]
    fn test_zero_steps_jumps() {
        let mut ramp = Ramp::new(0.0, 0);
        ramp.retarget(1.0);
        assert_eq!(ramp.value(), 1.0);
    }
}
