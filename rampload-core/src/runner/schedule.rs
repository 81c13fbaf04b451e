use std::time::Duration;

use super::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear target curve: starts at `start` and moves linearly to each stage's
/// `target` over that stage's `duration`.
#[derive(Debug, Clone)]
pub struct RampingU64Schedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

/// Position of an instant inside the schedule.
#[derive(Debug, Clone, Copy)]
struct Segment {
    index: usize,
    start: Duration,
    end: Duration,
    from: u64,
    to: u64,
}

impl Segment {
    fn len(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

impl RampingU64Schedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let cumulative_ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, s| {
                *acc = acc.saturating_add(s.duration);
                Some(*acc)
            })
            .collect();

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn segment(&self, index: usize) -> Segment {
        Segment {
            index,
            start: if index == 0 {
                Duration::ZERO
            } else {
                self.cumulative_ends[index - 1]
            },
            end: self.cumulative_ends[index],
            from: if index == 0 {
                self.start
            } else {
                self.stages[index - 1].target
            },
            to: self.stages[index].target,
        }
    }

    /// Segment containing `elapsed` (clamped to the last one). `None` without stages.
    fn locate(&self, elapsed: Duration) -> Option<Segment> {
        if self.stages.is_empty() {
            return None;
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) | Err(i) => i,
        };
        Some(self.segment(idx.min(self.stages.len() - 1)))
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed.is_zero() {
            return self.start;
        }

        let Some(seg) = self.locate(elapsed) else {
            return self.start;
        };
        if elapsed >= self.total_duration() {
            return seg.to;
        }

        let len = seg.len();
        if len.is_zero() {
            return seg.to;
        }

        let from = seg.from as i128;
        let delta = seg.to as i128 - from;
        let num = elapsed.saturating_sub(seg.start).as_nanos() as i128;
        let den = (len.as_nanos() as i128).max(1);

        let cur = from + delta.saturating_mul(num) / den;
        cur.clamp(0, u64::MAX as i128) as u64
    }

    /// Integral of the target curve from 0 to `elapsed`, in target-seconds.
    ///
    /// For an arrival-rate schedule with a 1s time unit this is the number of iterations due
    /// by `elapsed`. The curve is piecewise linear, so each segment is an exact trapezoid.
    pub fn area_until(&self, elapsed: Duration) -> f64 {
        let mut area = 0.0f64;

        for idx in 0..self.stages.len() {
            let seg = self.segment(idx);
            if elapsed <= seg.start {
                break;
            }

            let len = seg.len().as_secs_f64();
            if len <= 0.0 {
                continue;
            }

            let covered = elapsed.min(seg.end).saturating_sub(seg.start).as_secs_f64();
            let from = seg.from as f64;
            let at = from + (seg.to as f64 - from) * (covered / len);
            area += (from + at) * 0.5 * covered;
        }

        area
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let clamped = elapsed.min(self.total_duration());
        let seg = self.locate(clamped)?;

        let stage_elapsed = clamped.saturating_sub(seg.start);
        Some(StageSnapshot {
            index: seg.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: seg.len().saturating_sub(stage_elapsed),
            start_target: seg.from,
            end_target: seg.to,
            current_target: self.target_at(clamped),
        })
    }

    /// How long VU number `vu_index` (1-based) should sleep before re-checking whether the
    /// ramp has reached it.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        let default_sleep = Duration::from_millis(50);

        let Some(seg) = self.locate(elapsed) else {
            return default_sleep;
        };
        if elapsed >= self.total_duration() {
            return Duration::ZERO;
        }

        // Already active: re-check soon to pick up a ramp-down promptly.
        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = seg.end.saturating_sub(elapsed).min(default_sleep);

        // Flat or decreasing: this VU cannot become active within this stage.
        if seg.to <= seg.from {
            return until_stage_end;
        }

        let from = seg.from as i128;
        let want = vu_index as i128;
        let delta = seg.to as i128 - from;

        if want <= from {
            return Duration::ZERO;
        }
        if want > seg.to as i128 {
            return until_stage_end;
        }

        // Solve from + delta * t / len >= want for t.
        let len_ns = seg.len().as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(seg.start).as_nanos() as i128;
        let needed_ns = ((want - from).saturating_mul(len_ns) / delta).max(0);
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);

        Duration::from_nanos(wait_ns.min(u64::MAX as i128) as u64).min(default_sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_to_90k() -> RampingU64Schedule {
        RampingU64Schedule::new(
            0,
            vec![Stage {
                duration: secs(15 * 60),
                target: 90_000,
            }],
        )
    }

    #[test]
    fn single_stage_interpolates_linearly() {
        let s = ramp_to_90k();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(450)), 45_000);
        assert_eq!(s.target_at(secs(900)), 90_000);
        assert_eq!(s.target_at(secs(10_000)), 90_000);
        assert!(s.is_done(secs(900)));
        assert!(!s.is_done(secs(899)));
    }

    #[test]
    fn multi_stage_ramps_up_and_down() {
        let s = RampingU64Schedule::new(
            10,
            vec![
                Stage {
                    duration: secs(10),
                    target: 20,
                },
                Stage {
                    duration: secs(10),
                    target: 0,
                },
            ],
        );
        assert_eq!(s.target_at(secs(5)), 15);
        assert_eq!(s.target_at(secs(10)), 20);
        assert_eq!(s.target_at(secs(15)), 10);
        assert_eq!(s.total_duration(), secs(20));
    }

    #[test]
    fn area_matches_trapezoids() {
        let s = ramp_to_90k();
        // Full ramp: 0.5 * 90000 * 900.
        assert!((s.area_until(secs(900)) - 40_500_000.0).abs() < 1e-3);
        // Quadratic growth on a linear ramp: a quarter at half time.
        assert!((s.area_until(secs(450)) - 10_125_000.0).abs() < 1e-3);
        // Nothing accrues after the schedule ends.
        assert_eq!(s.area_until(secs(2_000)), s.area_until(secs(900)));
        assert_eq!(s.area_until(Duration::ZERO), 0.0);
    }

    #[test]
    fn area_accumulates_across_stages() {
        let s = RampingU64Schedule::new(
            4,
            vec![
                Stage {
                    duration: secs(2),
                    target: 4,
                },
                Stage {
                    duration: secs(2),
                    target: 0,
                },
            ],
        );
        // 4*2 flat + triangle 0.5*4*2.
        assert!((s.area_until(secs(4)) - 12.0).abs() < 1e-9);
        assert!((s.area_until(secs(3)) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn stage_snapshot_reports_position() {
        let s = ramp_to_90k();
        let snap = s
            .stage_snapshot_at(secs(300))
            .unwrap_or_else(|| panic!("expected a snapshot"));
        assert_eq!(snap.index, 0);
        assert_eq!(snap.count, 1);
        assert_eq!(snap.stage_elapsed, secs(300));
        assert_eq!(snap.stage_remaining, secs(600));
        assert_eq!(snap.start_target, 0);
        assert_eq!(snap.end_target, 90_000);
        assert_eq!(snap.current_target, 30_000);

        let end = s
            .stage_snapshot_at(secs(5_000))
            .unwrap_or_else(|| panic!("expected a snapshot"));
        assert_eq!(end.stage_remaining, Duration::ZERO);
        assert_eq!(end.current_target, 90_000);
    }

    #[test]
    fn empty_schedule_is_flat_at_start() {
        let s = RampingU64Schedule::new(3, Vec::new());
        assert_eq!(s.target_at(secs(1)), 3);
        assert!(s.stage_snapshot_at(secs(1)).is_none());
        assert_eq!(s.area_until(secs(1)), 0.0);
    }

    #[test]
    fn recheck_waits_for_the_ramp_to_reach_a_vu() {
        let s = RampingU64Schedule::new(
            0,
            vec![Stage {
                duration: secs(10),
                target: 10,
            }],
        );
        // VU 5 becomes active at t=5s; from t=4.99s that is 10ms away.
        let wait = s.next_recheck_in(Duration::from_millis(4_990), 5);
        assert_eq!(wait, Duration::from_millis(10));
        // Far away: capped.
        assert_eq!(s.next_recheck_in(secs(1), 9), Duration::from_millis(50));
        // Active already.
        assert_eq!(s.next_recheck_in(secs(6), 5), Duration::from_millis(1));
        // After the end.
        assert_eq!(s.next_recheck_in(secs(10), 5), Duration::ZERO);
    }
}
