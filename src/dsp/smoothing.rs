//! Linear parameter smoothing.

/// Ramps linearly toward a target over a fixed time; snaps when the time is 0.
#[derive(Debug, Clone)]
pub struct LinearSmoother {
    current: f64,
    target: f64,
    step: f64,
    remaining: usize,
    ramp_samples: usize,
}

impl LinearSmoother {
    pub fn new(initial: f64) -> Self {
        LinearSmoother {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples: 0,
        }
    }

    /// Set the ramp length from a time in seconds.
    pub fn set_time(&mut self, seconds: f64, sample_rate: f64) {
        let samples = seconds.max(0.0) * sample_rate;
        self.ramp_samples = if samples.is_finite() { samples.round() as usize } else { 0 };
    }

    /// Begin ramping toward `target`; a no-op when the target is unchanged.
    pub fn set_target(&mut self, target: f64) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_samples == 0 {
            self.current = target;
            self.remaining = 0;
        } else {
            self.remaining = self.ramp_samples;
            self.step = (target - self.current) / self.ramp_samples as f64;
        }
    }

    /// Jump straight to `value`.
    pub fn snap(&mut self, value: f64) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// Advance one sample and return the smoothed value.
    #[inline]
    pub fn next_value(&mut self) -> f64 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}
