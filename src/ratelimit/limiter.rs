//! Core rate limiter implementation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::WindowKey;
use super::rules::RuleRegistry;
use super::window::{Decision, SlidingWindow};
use crate::error::{Result, TurnstileError};

/// The core rate limiter that owns one sliding window per client and
/// resource.
///
/// Windows live in a sharded map. A check holds the write guard of the
/// window's shard for the whole prune, compare and append sequence, so two
/// concurrent checks for the same client and resource cannot both take the
/// last slot, while checks that land in other shards run in parallel.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Rules used to resolve the limit for each resource
    rules: Arc<RuleRegistry>,
    /// Sliding windows indexed by client and resource
    windows: DashMap<WindowKey, SlidingWindow>,
}

impl RateLimiter {
    /// Create a new rate limiter backed by `rules`.
    pub fn new(rules: Arc<RuleRegistry>) -> Self {
        Self {
            rules,
            windows: DashMap::new(),
        }
    }

    /// Create a rate limiter whose default rule is `limit` admissions per
    /// `window_seconds`, with no resource-specific rules yet.
    pub fn with_default(limit: u64, window_seconds: f64) -> Result<Self> {
        Ok(Self::new(Arc::new(RuleRegistry::with_default(
            limit,
            window_seconds,
        )?)))
    }

    /// The rules this limiter resolves against.
    ///
    /// Rules may be changed while the limiter is serving checks; each check
    /// uses whichever rule is in force when it resolves.
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Decide whether `client` may call `resource` now.
    ///
    /// Returns `Ok(true)` and records the request if admitted, `Ok(false)`
    /// if the client is over the limit for this resource.
    pub fn is_allowed(&self, client: &str, resource: &str) -> Result<bool> {
        Ok(self.check(client, resource)?.is_allowed())
    }

    /// Like [`is_allowed`](Self::is_allowed), but also reports the remaining
    /// quota or how long to wait before retrying.
    pub fn check(&self, client: &str, resource: &str) -> Result<Decision> {
        self.admit(client, resource, Instant::now)
    }

    /// Decide at an explicit instant instead of reading the clock.
    ///
    /// An instant older than the newest admission already recorded for the
    /// pair is treated as that admission's instant.
    pub fn check_at(&self, client: &str, resource: &str, now: Instant) -> Result<Decision> {
        self.admit(client, resource, || now)
    }

    fn admit<F>(&self, client: &str, resource: &str, now: F) -> Result<Decision>
    where
        F: FnOnce() -> Instant,
    {
        validate_key("client", client)?;
        validate_key("resource", resource)?;

        let rule = self.rules.resolve(resource);
        let key = WindowKey::new(client, resource);

        trace!(
            key = %key,
            limit = rule.limit(),
            window = ?rule.window(),
            "Checking rate limit"
        );

        let decision = {
            // The entry keeps the shard write-locked until the end of this
            // block. The clock is read under it so admissions for the same
            // key are recorded in order.
            let entry = self.windows.entry(key.clone());
            let now = now();
            let mut window = entry.or_insert_with(|| {
                debug!(key = %key, "Creating new sliding window");
                SlidingWindow::new(now)
            });
            window.admit(&rule, now)
        };

        if let Decision::Rejected { retry_after } = decision {
            debug!(
                key = %key,
                limit = rule.limit(),
                window = ?rule.window(),
                retry_after = ?retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Number of admissions currently counted for `client` on `resource`.
    ///
    /// Returns `None` if no window exists for the pair. Does not prune.
    pub fn occupancy(&self, client: &str, resource: &str) -> Option<usize> {
        let rule = self.rules.resolve(resource);
        let key = WindowKey::new(client, resource);
        self.windows
            .get(&key)
            .map(|window| window.occupancy(rule.window(), Instant::now()))
    }

    /// Evict windows that are empty and have not been checked for at least
    /// `idle_after`. Returns the number of windows removed.
    pub fn evict_idle(&self, idle_after: Duration) -> usize {
        self.evict_idle_at(Instant::now(), idle_after)
    }

    /// [`evict_idle`](Self::evict_idle) evaluated at an explicit instant.
    ///
    /// Each window is pruned under the rule currently in force for its
    /// resource first, so a window still holding counted admissions is
    /// never removed.
    pub fn evict_idle_at(&self, now: Instant, idle_after: Duration) -> usize {
        // Counted inside retain: windows created by concurrent checks
        // during the sweep change len() but were not evicted.
        let mut evicted = 0;
        self.windows.retain(|key, window| {
            let rule = self.rules.resolve(&key.resource);
            window.prune(rule.window(), now);
            let remove = window.is_empty() && window.is_idle(idle_after, now);
            if remove {
                evicted += 1;
            }
            !remove
        });

        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Evicted idle windows");
        }
        evicted
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Get the number of live windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

fn validate_key(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TurnstileError::InvalidArgument(format!(
            "{} must be a non-empty string",
            name
        )));
    }
    Ok(())
}
