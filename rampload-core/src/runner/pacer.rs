use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Token dispenser for arrival-rate executors.
///
/// The scheduler task releases tokens with [`ArrivalPacer::update_due`]; VU tasks take them with
/// [`ArrivalPacer::claim_next`] and report back with [`ArrivalPacer::finish_iteration`].
///
/// A release is dropped only when the pool cannot start it: every one of the `max_vus` VUs is
/// busy, or the unclaimed backlog already exceeds the idle VUs plus the release itself.
#[derive(Debug)]
pub struct ArrivalPacer {
    scheduled_total: AtomicU64,
    claimed_total: AtomicU64,
    dropped_total: AtomicU64,
    busy_vus: AtomicU64,

    active_vus: AtomicU64,
    pre_allocated_vus: u64,
    max_vus: u64,

    done: AtomicBool,
    notify: Notify,
}

impl ArrivalPacer {
    pub fn new(pre_allocated_vus: u64, max_vus: u64) -> Self {
        let max_vus = max_vus.max(1);
        let pre_allocated_vus = pre_allocated_vus.clamp(1, max_vus);
        Self {
            scheduled_total: AtomicU64::new(0),
            claimed_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            busy_vus: AtomicU64::new(0),
            active_vus: AtomicU64::new(pre_allocated_vus),
            pre_allocated_vus,
            max_vus,
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// No more tokens will be released. Waiters drain the backlog and then stop.
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total.load(Ordering::Relaxed)
    }

    pub fn claimed_total(&self) -> u64 {
        self.claimed_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn backlog(&self) -> u64 {
        self.scheduled_total().saturating_sub(self.claimed_total())
    }

    /// VUs currently running an iteration.
    pub fn busy_vus(&self) -> u64 {
        self.busy_vus.load(Ordering::Relaxed)
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn pre_allocated_vus(&self) -> u64 {
        self.pre_allocated_vus
    }

    pub fn max_vus(&self) -> u64 {
        self.max_vus
    }

    /// Release `add_due` new iteration starts. Returns how many of them were dropped because no
    /// VU was free to take them.
    pub fn update_due(&self, add_due: u64) -> u64 {
        if add_due == 0 {
            self.update_active_vus();
            return 0;
        }

        let idle = self.max_vus.saturating_sub(self.busy_vus());
        let allowed_to_add = if idle == 0 {
            0
        } else {
            idle.saturating_add(add_due).saturating_sub(self.backlog())
        };
        let to_add = add_due.min(allowed_to_add);
        let dropped = add_due - to_add;

        if to_add != 0 {
            self.scheduled_total.fetch_add(to_add, Ordering::Relaxed);
        }
        if dropped != 0 {
            self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
        }

        self.update_active_vus();
        self.notify.notify_waiters();
        dropped
    }

    /// Marks the iteration started by a successful [`ArrivalPacer::claim_next`] as finished.
    pub fn finish_iteration(&self) {
        let _ = self
            .busy_vus
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    fn update_active_vus(&self) {
        // At least `pre_allocated_vus`; with a backlog grow to backlog+1, capped at `max_vus`.
        let backlog = self.backlog();
        let desired = if backlog == 0 {
            self.pre_allocated_vus
        } else {
            self.pre_allocated_vus.max(backlog.saturating_add(1))
        };

        self.active_vus
            .store(desired.clamp(1, self.max_vus), Ordering::Relaxed);
    }

    fn try_claim(&self) -> bool {
        loop {
            let claimed = self.claimed_total.load(Ordering::Relaxed);
            let scheduled = self.scheduled_total.load(Ordering::Relaxed);
            if claimed >= scheduled {
                return false;
            }

            if self
                .claimed_total
                .compare_exchange_weak(
                    claimed,
                    claimed.saturating_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.busy_vus.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
    }

    /// Wait for a token. Returns `false` once the pacer is done and the backlog is empty.
    ///
    /// Every `true` must be paired with a [`ArrivalPacer::finish_iteration`].
    pub async fn claim_next(&self) -> bool {
        loop {
            // Register interest before checking state so a release between the check and the
            // await still wakes us.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.try_claim() {
                return true;
            }
            if self.is_done() {
                // A final release may have landed between the claim attempt and the flag.
                return self.try_claim();
            }

            notified.await;
        }
    }

    /// Wait until the next release or until the pacer is done.
    pub async fn wait_for_update(&self) {
        let mut notified = pin!(self.notify.notified());
        notified.as_mut().enable();

        if self.is_done() {
            return;
        }
        notified.await;
    }
}
