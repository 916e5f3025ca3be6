use std::time::Duration;

/// A run clock advanced by the data it consumes, never by the wall.
pub trait Clock: Clone + Send + Sync {
    fn elapsed(&self) -> Duration;
    fn advance(&mut self, n_samples: usize);
    fn reset(&mut self);
    fn stats(&self) -> ClockStats;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockStats {
    pub total_samples: u64,
    pub steps: u64,
    pub mean_step_samples: f64,
    pub min_step_samples: usize,
    pub max_step_samples: usize,
}

/// Elapsed time = samples consumed / sampling frequency.
///
/// The division is done in integer nanoseconds so the same sample count
/// always maps to the same instant.
#[derive(Debug, Clone)]
pub struct SampleClock {
    sfreq: u32,
    n_samples: u64,
    steps: u64,
    min_step: usize,
    max_step: usize,
}

impl SampleClock {
    /// Returns `None` for a zero sampling frequency.
    pub fn new(sfreq: u32) -> Option<Self> {
        (sfreq > 0).then_some(Self {
            sfreq,
            n_samples: 0,
            steps: 0,
            min_step: usize::MAX,
            max_step: 0,
        })
    }

    pub fn sfreq(&self) -> u32 {
        self.sfreq
    }

    pub fn n_samples(&self) -> u64 {
        self.n_samples
    }

    /// Duration covered by `n_samples` at this clock's rate.
    pub fn span(&self, n_samples: u64) -> Duration {
        let nanos = u128::from(n_samples) * 1_000_000_000 / u128::from(self.sfreq);
        Duration::new(
            (nanos / 1_000_000_000) as u64,
            (nanos % 1_000_000_000) as u32,
        )
    }
}

impl Clock for SampleClock {
    fn elapsed(&self) -> Duration {
        self.span(self.n_samples)
    }

    fn advance(&mut self, n_samples: usize) {
        self.n_samples += n_samples as u64;
        self.steps += 1;
        self.min_step = self.min_step.min(n_samples);
        self.max_step = self.max_step.max(n_samples);
    }

    fn reset(&mut self) {
        self.n_samples = 0;
        self.steps = 0;
        self.min_step = usize::MAX;
        self.max_step = 0;
    }

    fn stats(&self) -> ClockStats {
        if self.steps == 0 {
            return ClockStats {
                total_samples: 0,
                steps: 0,
                mean_step_samples: 0.0,
                min_step_samples: 0,
                max_step_samples: 0,
            };
        }
        ClockStats {
            total_samples: self.n_samples,
            steps: self.steps,
            mean_step_samples: self.n_samples as f64 / self.steps as f64,
            min_step_samples: self.min_step,
            max_step_samples: self.max_step,
        }
    }
}
