//! Policy documents and grant matching
//!
//! Provides:
//! - JSON policy documents in the IAM wire shape (single or listed statements/actions)
//! - Allow-only action matching with `*` and `namespace:*` wildcards
//! - A single-flight per-run cache for shared managed policies

mod cache;
mod pattern;
mod policy;

pub use cache::{CacheStats, PolicyCache};
pub use pattern::{action_grants, parse_targets, TargetAction};
pub use policy::{statement_grants, ActionList, Effect, PolicyDocument, Statement};
