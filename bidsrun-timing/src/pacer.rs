use std::time::{Duration, Instant};

/// Holds a producer to real time: the n-th sample is not released before
/// `n / sfreq` seconds have passed since the pacer started.
///
/// Used by simulated devices so a run against them behaves like one against
/// hardware.
#[derive(Debug, Clone)]
pub struct Pacer {
    start: Instant,
    sfreq: u32,
    released: u64,
}

impl Pacer {
    pub fn new(sfreq: u32) -> Self {
        Self {
            start: Instant::now(),
            sfreq: sfreq.max(1),
            released: 0,
        }
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
        self.released = 0;
    }

    pub fn released(&self) -> u64 {
        self.released
    }

    /// Blocks until `n_samples` more samples are due, then counts them released.
    pub fn release(&mut self, n_samples: usize) {
        self.released += n_samples as u64;
        let due_nanos = u128::from(self.released) * 1_000_000_000 / u128::from(self.sfreq);
        let due = Duration::from_nanos(due_nanos as u64);
        let now = self.start.elapsed();
        if due > now {
            high_precision_sleep(due - now);
        }
    }
}

pub fn high_precision_sleep(duration: Duration) {
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

    let req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    unsafe {
        clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_waits_for_due_time() {
        let mut pacer = Pacer::new(1000);
        let start = Instant::now();
        pacer.release(20);
        assert!(start.elapsed() >= Duration::from_millis(19));
        assert_eq!(pacer.released(), 20);
    }

    #[test]
    fn restart_resets_count() {
        let mut pacer = Pacer::new(1000);
        pacer.release(1);
        pacer.restart();
        assert_eq!(pacer.released(), 0);
    }
}
