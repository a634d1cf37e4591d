//! Rate limit rules and per-resource rule resolution.
//!
//! This module holds the `Rule` type, the `RuleRegistry` that resolves the
//! rule in force for a resource, and the YAML rule file format used to
//! populate a registry at startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};

/// A rate limit rule: at most `limit` admissions per sliding `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    limit: u64,
    window: Duration,
}

impl Rule {
    /// Create a rule from a limit and a window length in seconds.
    ///
    /// Fractional seconds are accepted. Fails if `limit` is zero or if
    /// `window_seconds` is not a positive, finite number.
    pub fn new(limit: u64, window_seconds: f64) -> Result<Self> {
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(TurnstileError::InvalidConfiguration(format!(
                "window must be a positive number of seconds, got {}",
                window_seconds
            )));
        }

        let window = Duration::try_from_secs_f64(window_seconds).map_err(|e| {
            TurnstileError::InvalidConfiguration(format!(
                "window of {} seconds is out of range: {}",
                window_seconds, e
            ))
        })?;

        Self::from_duration(limit, window)
    }

    /// Create a rule from a limit and a window duration.
    pub fn from_duration(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "limit must be a positive integer".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::InvalidConfiguration(
                "window must be longer than zero".to_string(),
            ));
        }

        Ok(Self { limit, window })
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Resolves the rule in force for a resource.
///
/// The default rule is fixed at construction. Resource rules can be added,
/// replaced and removed at any time; each `resolve` observes either the old
/// or the new rule for a resource, never a mix of both.
#[derive(Debug)]
pub struct RuleRegistry {
    /// Fallback rule for resources without an explicit rule
    default: Rule,
    /// Resource-specific rules, keyed by exact resource name
    rules: RwLock<HashMap<String, Rule>>,
}

impl RuleRegistry {
    /// Create a registry with the given default rule.
    pub fn new(default: Rule) -> Self {
        Self {
            default,
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry whose default rule is `limit` admissions per
    /// `window_seconds`.
    pub fn with_default(limit: u64, window_seconds: f64) -> Result<Self> {
        Ok(Self::new(Rule::new(limit, window_seconds)?))
    }

    /// Register or replace the rule for `resource`.
    ///
    /// The whole rule is validated before anything is stored, so a failed
    /// call leaves the previous rule for `resource` in place.
    pub fn set_rule(&self, resource: &str, limit: u64, window_seconds: f64) -> Result<()> {
        if resource.is_empty() {
            return Err(TurnstileError::InvalidConfiguration(
                "resource must be a non-empty string".to_string(),
            ));
        }
        let rule = Rule::new(limit, window_seconds)?;

        let previous = self.rules.write().insert(resource.to_string(), rule);

        info!(
            resource = %resource,
            limit = rule.limit(),
            window = ?rule.window(),
            replaced = previous.is_some(),
            "Registered rate limit rule"
        );
        Ok(())
    }

    /// Remove the rule for `resource`, returning it if one was registered.
    ///
    /// The resource falls back to the default rule afterwards.
    pub fn remove_rule(&self, resource: &str) -> Option<Rule> {
        let removed = self.rules.write().remove(resource);
        if removed.is_some() {
            debug!(resource = %resource, "Removed rate limit rule");
        }
        removed
    }

    /// The rule registered for exactly `resource`, if any.
    pub fn override_for(&self, resource: &str) -> Option<Rule> {
        self.rules.read().get(resource).copied()
    }

    /// The rule in force for `resource`: its own rule if registered,
    /// otherwise the default.
    pub fn resolve(&self, resource: &str) -> Rule {
        self.override_for(resource).unwrap_or(self.default)
    }

    /// The fallback rule.
    pub fn default_rule(&self) -> Rule {
        self.default
    }

    /// Number of resource-specific rules.
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }
}

/// A rule file: a default rule plus resource-specific rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rule applied to resources without their own entry
    pub default: RuleSpec,
    /// Resource-specific rules
    #[serde(default)]
    pub rules: Vec<ResourceRule>,
}

/// Limit and window as written in a rule file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Maximum admissions per window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: f64,
}

/// A rule for one resource as written in a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRule {
    /// Exact resource name the rule applies to
    pub resource: String,
    /// Maximum admissions per window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: f64,
}

impl Default for RuleSet {
    /// Five requests per 15 seconds by default, with a tight limit on
    /// `/limited` and a loose one on `/unlimited`.
    fn default() -> Self {
        Self {
            default: RuleSpec {
                limit: 5,
                window_seconds: 15.0,
            },
            rules: vec![
                ResourceRule {
                    resource: "/limited".to_string(),
                    limit: 2,
                    window_seconds: 10.0,
                },
                ResourceRule {
                    resource: "/unlimited".to_string(),
                    limit: 1000,
                    window_seconds: 60.0,
                },
            ],
        }
    }
}

impl RuleSet {
    /// Load a rule set from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a rule set from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TurnstileError::InvalidConfiguration(format!("Failed to parse rate limit rules: {}", e))
        })
    }

    /// Validate every rule and build a registry from them.
    ///
    /// Later entries for the same resource replace earlier ones.
    pub fn build_registry(&self) -> Result<RuleRegistry> {
        let registry =
            RuleRegistry::with_default(self.default.limit, self.default.window_seconds)?;
        for rule in &self.rules {
            registry.set_rule(&rule.resource, rule.limit, rule.window_seconds)?;
        }
        Ok(registry)
    }
}
