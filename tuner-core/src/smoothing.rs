/// Exponential smoothing of successive pitch estimates.
///
/// The first value after construction or [`reset`](Self::reset) passes
/// through unchanged. Only usable estimates may be fed in.
#[derive(Debug, Clone)]
pub struct FrequencySmoother {
    alpha: f32,
    previous: Option<f32>,
}

impl FrequencySmoother {
    /// `alpha` is the weight of the newest estimate, in `(0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            previous: None,
        }
    }

    pub fn smooth(&mut self, frequency: f32) -> f32 {
        let output = match self.previous {
            None => frequency,
            Some(previous) => self.alpha * frequency + (1.0 - self.alpha) * previous,
        };
        self.previous = Some(output);
        output
    }

    /// Current smoothed value, 0 before the first estimate.
    pub fn current(&self) -> f32 {
        self.previous.unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
