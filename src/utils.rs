//! Small shared helpers, mirroring the teacher's own `utils` module.

use std::time::Duration;

pub fn human_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 0.000_001 {
        format!("{:.1}ns", total_secs * 1_000_000_000.0)
    } else if total_secs < 0.001 {
        format!("{:.1}\u{b5}s", total_secs * 1_000_000.0)
    } else if total_secs < 1.0 {
        format!("{:.1}ms", total_secs * 1000.0)
    } else {
        format!("{:.1}s", total_secs)
    }
}

/// Tiered, capped backoff for a cooperative thread with nothing to do
/// (e.g. a worker whose LocalPool is empty and waiting on a hub dispatch).
pub struct Backoff {
    num_spins: usize,
    spin_limit: usize,
    num_yields: usize,
    yield_limit: usize,
    initial_sleep: Duration,
    current_sleep: Duration,
    sleep_limit: Duration,
    sleep_multiplier: f32,
}

impl Backoff {
    pub fn new(
        spin_limit: usize,
        yield_limit: usize,
        initial_sleep: Duration,
        sleep_limit: Duration,
        sleep_multiplier: f32,
    ) -> Self {
        Backoff {
            num_spins: 0,
            spin_limit,
            num_yields: 0,
            yield_limit,
            initial_sleep,
            current_sleep: initial_sleep,
            sleep_limit,
            sleep_multiplier,
        }
    }

    pub fn wait(&mut self) {
        if self.num_spins < self.spin_limit {
            std::hint::spin_loop();
            self.num_spins += 1;
        } else if self.num_yields < self.yield_limit {
            std::thread::yield_now();
            self.num_yields += 1;
        } else {
            std::thread::sleep(self.current_sleep);
            let next_sleep = self.current_sleep.as_secs_f32() * self.sleep_multiplier;
            self.current_sleep = Duration::from_secs_f32(next_sleep).min(self.sleep_limit);
        }
    }

    pub fn reset(&mut self) {
        self.num_spins = 0;
        self.num_yields = 0;
        self.current_sleep = self.initial_sleep;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(
            128,
            512,
            Duration::from_micros(1),
            Duration::from_millis(10),
            1.1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_duration_picks_a_unit() {
        assert_eq!(human_duration(Duration::from_secs(2)), "2.0s");
        assert_eq!(human_duration(Duration::from_millis(5)), "5.0ms");
    }

    #[test]
    fn backoff_escalates_then_caps() {
        let mut backoff = Backoff::new(1, 1, Duration::from_micros(1), Duration::from_micros(4), 2.0);
        backoff.wait(); // spin
        backoff.wait(); // yield
        backoff.wait(); // sleep at initial
        backoff.reset();
        assert_eq!(backoff.current_sleep, Duration::from_micros(1));
    }
}
