//! Sliding window implementation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::rules::Rule;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was admitted and recorded in the window.
    Allowed {
        /// Admissions still available in the current window.
        remaining: u64,
    },
    /// The request was rejected; the window was left untouched.
    Rejected {
        /// Time until enough timestamps leave the window for one more
        /// admission.
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// The retry hint for a rejected request, `None` when admitted.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Rejected { retry_after } => Some(*retry_after),
        }
    }
}

/// Timestamps of admitted requests for one client on one resource.
///
/// Timestamps are kept oldest first and never decrease. Entries at or
/// before `now - window` are dropped lazily whenever the window is touched.
/// The window does not synchronize itself; callers hold it behind a lock.
#[derive(Debug)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
    /// Last time any check (admitted or not) touched this window
    last_seen: Instant,
}

impl SlidingWindow {
    /// Create an empty window first observed at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Prune expired entries and admit one request if the rule allows it.
    ///
    /// Returns `Decision::Allowed` and records `now` if fewer than
    /// `rule.limit()` timestamps remain in the window; otherwise returns
    /// `Decision::Rejected` without recording anything.
    pub fn admit(&mut self, rule: &Rule, now: Instant) -> Decision {
        // Keep the history ordered even if the caller's clock reading is
        // older than the newest entry.
        let now = match self.timestamps.back() {
            Some(&newest) if newest > now => newest,
            _ => now,
        };
        self.last_seen = self.last_seen.max(now);
        self.prune(rule.window(), now);

        let count = self.timestamps.len() as u64;
        if count < rule.limit() {
            self.timestamps.push_back(now);
            Decision::Allowed {
                remaining: rule.limit() - count - 1,
            }
        } else {
            Decision::Rejected {
                retry_after: self.retry_after(rule, now),
            }
        }
    }

    /// Drop every timestamp at or before `now - window`.
    ///
    /// A timestamp exactly `window` old is expired.
    pub fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Count the timestamps still inside the window at `now` without
    /// mutating the history.
    pub fn occupancy(&self, window: Duration, now: Instant) -> usize {
        self.timestamps
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) < window)
            .count()
    }

    /// Number of retained timestamps, expired or not.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps are retained.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Whether the window has not been checked for at least `idle_after`.
    pub fn is_idle(&self, idle_after: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= idle_after
    }

    /// Time until the window drops below the rule's limit.
    ///
    /// Assumes the window is already pruned and holds at least `limit`
    /// entries. If the rule was tightened the window may hold more than
    /// `limit`, in which case several entries have to expire first.
    fn retry_after(&self, rule: &Rule, now: Instant) -> Duration {
        let limit = usize::try_from(rule.limit()).unwrap_or(usize::MAX);
        let excess = self.timestamps.len().saturating_sub(limit);
        match self.timestamps.get(excess) {
            Some(&ts) => ts
                .checked_add(rule.window())
                .map(|expires_at| expires_at.saturating_duration_since(now))
                .unwrap_or(rule.window()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(limit: u64, window_secs: u64) -> Rule {
        Rule::from_duration(limit, Duration::from_secs(window_secs)).unwrap()
    }

    #[test]
    fn test_admit_within_limit() {
        let now = Instant::now();
        let mut window = SlidingWindow::new(now);
        let rule = rule(3, 10);

        assert_eq!(window.admit(&rule, now), Decision::Allowed { remaining: 2 });
        assert_eq!(window.admit(&rule, now), Decision::Allowed { remaining: 1 });
        assert_eq!(window.admit(&rule, now), Decision::Allowed { remaining: 0 });
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_reject_does_not_record() {
        let now = Instant::now();
        let mut window = SlidingWindow::new(now);
        let rule = rule(2, 10);

        assert!(window.admit(&rule, now).is_allowed());
        assert!(window.admit(&rule, now).is_allowed());
        assert!(!window.admit(&rule, now).is_allowed());
        assert!(!window.admit(&rule, now + Duration::from_secs(1)).is_allowed());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_timestamp_at_cutoff_is_expired() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(1, 10);

        assert!(window.admit(&rule, start).is_allowed());
        // Just inside the window: still counted
        let almost = start + Duration::from_secs(10) - Duration::from_nanos(1);
        assert!(!window.admit(&rule, almost).is_allowed());
        // Exactly one window later: the old entry no longer counts
        assert!(window.admit(&rule, start + Duration::from_secs(10)).is_allowed());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_retry_after_points_at_oldest_entry() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(2, 10);

        window.admit(&rule, start);
        window.admit(&rule, start + Duration::from_secs(3));

        let decision = window.admit(&rule, start + Duration::from_secs(4));
        assert_eq!(decision.retry_after(), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_retry_after_with_tightened_rule() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let loose = rule(3, 10);
        let tight = rule(1, 10);

        window.admit(&loose, start);
        window.admit(&loose, start + Duration::from_secs(2));
        window.admit(&loose, start + Duration::from_secs(4));

        // Every entry has to expire before the single slot frees up
        let decision = window.admit(&tight, start + Duration::from_secs(5));
        assert_eq!(decision.retry_after(), Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_retry_after_with_huge_limit() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(u64::MAX, 10);

        assert_eq!(
            window.admit(&rule, start),
            Decision::Allowed {
                remaining: u64::MAX - 1
            }
        );
        // Fewer entries than the limit: nothing needs to expire
        assert_eq!(window.retry_after(&rule, start), Duration::ZERO);
    }

    #[test]
    fn test_stale_clock_reading_is_clamped() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(5, 10);

        window.admit(&rule, start + Duration::from_secs(2));
        window.admit(&rule, start);

        let stamps: Vec<Instant> = window.timestamps.iter().copied().collect();
        assert_eq!(stamps[0], stamps[1]);
    }

    #[test]
    fn test_occupancy_is_read_only() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(5, 10);

        window.admit(&rule, start);
        window.admit(&rule, start + Duration::from_secs(6));

        let later = start + Duration::from_secs(12);
        assert_eq!(window.occupancy(rule.window(), later), 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_idle_tracking() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(start);
        let rule = rule(1, 1);

        window.admit(&rule, start);
        // A rejected check still counts as activity
        window.admit(&rule, start + Duration::from_millis(500));

        let idle_after = Duration::from_secs(5);
        assert!(!window.is_idle(idle_after, start + Duration::from_secs(5)));
        assert!(window.is_idle(idle_after, start + Duration::from_millis(5500)));
    }
}
