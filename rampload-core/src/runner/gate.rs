use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared stop condition for closed-model (constant VU) scenarios.
///
/// With `iterations` the gate hands out exactly that many permits across all VUs. With
/// `duration` it stops handing them out once the deadline passes. With neither it allows a
/// single iteration.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.get_or_init(|| started + duration);
        }
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn next(&self) -> bool {
        if self.duration.is_some() {
            let now = Instant::now();
            self.start_at(now);

            if let Some(deadline) = self.deadline.get()
                && now >= *deadline
            {
                return false;
            }
        }

        let limit = match (self.iterations, self.duration) {
            (Some(total), _) => total,
            (None, Some(_)) => return true,
            (None, None) => 1,
        };

        self.counter.fetch_add(1, Ordering::Relaxed) < limit
    }
}
