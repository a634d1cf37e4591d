//! Rate limiting logic and state management.

mod key;
mod limiter;
mod rules;
mod sweeper;
mod window;

pub use key::WindowKey;
pub use limiter::RateLimiter;
pub use rules::{ResourceRule, Rule, RuleRegistry, RuleSet, RuleSpec};
pub use sweeper::{IdleSweeper, SweepConfig};
pub use window::{Decision, SlidingWindow};
