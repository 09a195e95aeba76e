//! Per-process time-sliced scheduling of pseudo-threads (spec §4.8, §9
//! "pseudo-thread hierarchy"). Replaces the original's OPT++/PEBBL-style
//! class tree with a tagged variant behind one capability trait — no
//! inheritance.

/// Which pseudo-thread role a [`Schedulable`] plays. Carried alongside the
/// trait object only for diagnostics; dispatch itself is by `bias()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Worker,
    Hub,
    IncumbentHeuristic,
    Repository,
    Auxiliary,
}

/// A cooperatively scheduled unit of work inside one process. `execute`
/// must return at or before `control_param` seconds of wall-clock work;
/// voluntary yield happens only at this boundary (spec §5 "Suspension
/// points").
pub trait Schedulable {
    fn kind(&self) -> ThreadKind;

    /// Priority for the next scheduling decision; higher runs first.
    fn bias(&self) -> f64;

    /// Runs for up to `control_param` seconds. Returns `true` if there is
    /// more work to do (another call would be useful), `false` if this
    /// pseudo-thread is currently idle.
    fn execute(&mut self, control_param: f64) -> bool;
}

/// Picks the highest-bias pseudo-thread each round and runs it for one
/// `time_slice`. Mirrors the teacher's single-threaded-per-process rule:
/// there is exactly one `CooperativeScheduler` per process thread, and it
/// never preempts mid-`execute`.
pub struct CooperativeScheduler {
    time_slice: f64,
    threads: Vec<Box<dyn Schedulable>>,
}

impl CooperativeScheduler {
    pub fn new(time_slice: f64) -> Self {
        CooperativeScheduler {
            time_slice,
            threads: Vec::new(),
        }
    }

    pub fn register(&mut self, thread: Box<dyn Schedulable>) {
        self.threads.push(thread);
    }

    /// Runs one scheduling round: picks the highest-bias thread and
    /// executes it for one `time_slice`. Returns `false` once every
    /// registered thread reports no more work, which the runtime treats as
    /// this process being quiescent for the round.
    pub fn run_once(&mut self) -> bool {
        let Some(best_idx) = self.pick_next() else {
            return false;
        };
        self.threads[best_idx].execute(self.time_slice)
    }

    fn pick_next(&self) -> Option<usize> {
        self.threads
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.bias()
                    .partial_cmp(&b.bias())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx)
    }
}

/// Computes the incumbent-heuristic pseudo-thread's bias (spec §4.8):
/// `clamp(incThreadBiasFactor * relativeGap^incThreadBiasPower,
/// incThreadMinBias, incThreadMaxBias)`, raised to `noIncumbentMinBias`
/// while no incumbent has been found yet.
pub fn incumbent_thread_bias(
    relative_gap: Option<f64>,
    bias_factor: f64,
    bias_power: f64,
    min_bias: f64,
    max_bias: f64,
    no_incumbent_min_bias: f64,
) -> f64 {
    let Some(gap) = relative_gap else {
        return no_incumbent_min_bias;
    };
    let raw = bias_factor * gap.max(0.0).powf(bias_power);
    raw.clamp(min_bias, max_bias)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        kind: ThreadKind,
        bias: f64,
        runs: usize,
        has_work: bool,
    }

    impl Schedulable for Counter {
        fn kind(&self) -> ThreadKind {
            self.kind
        }
        fn bias(&self) -> f64 {
            self.bias
        }
        fn execute(&mut self, _control_param: f64) -> bool {
            self.runs += 1;
            self.has_work
        }
    }

    #[test]
    fn picks_highest_bias_first() {
        let mut scheduler = CooperativeScheduler::new(0.1);
        scheduler.register(Box::new(Counter {
            kind: ThreadKind::Worker,
            bias: 1.0,
            runs: 0,
            has_work: true,
        }));
        scheduler.register(Box::new(Counter {
            kind: ThreadKind::Hub,
            bias: 5.0,
            runs: 0,
            has_work: true,
        }));
        assert_eq!(scheduler.pick_next(), Some(1));
        scheduler.run_once();
    }

    #[test]
    fn incumbent_bias_falls_back_without_incumbent() {
        let b = incumbent_thread_bias(None, 1.0, 1.0, 0.05, 1.0, 0.5);
        assert_eq!(b, 0.5);
    }

    #[test]
    fn incumbent_bias_is_clamped() {
        let b = incumbent_thread_bias(Some(100.0), 1.0, 1.0, 0.05, 1.0, 0.5);
        assert_eq!(b, 1.0);
    }
}
