//! # grantscan - Who Can Do What in an IAM Account
//!
//! `grantscan` answers one question: which roles, users, and groups are
//! granted a given set of actions, and by which policy.
//!
//! - **Principal enumeration** across roles, users, and groups
//! - **Inline and managed policy resolution**, with managed documents fetched
//!   once per run through a shared cache
//! - **Wildcard-aware matching** of `Allow` statements (`*`, `service:*`)
//! - **Bounded concurrent evaluation** with abort or isolate failure modes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grantscan::{MemoryBackend, PermissionSearch, ScanConfig, Result};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let backend = MemoryBackend::load("account.json")?;
//! let search = PermissionSearch::new(Arc::new(backend), ScanConfig::default())?;
//!
//! let report = search.run(&["iam:PassRole", "s3:GetObject"]).await?;
//! for entry in report.results.iter() {
//!     for grant in &entry.grants {
//!         println!("{} <- {} ({})", entry.action, grant.principal, grant.policy_identifier);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Matching
//!
//! ```rust
//! use grantscan::{action_grants, TargetAction};
//!
//! let target = TargetAction::parse("s3:GetObject").unwrap();
//! assert!(action_grants("*", &target).unwrap());
//! assert!(action_grants("s3:*", &target).unwrap());
//! assert!(!action_grants("s3:Get*", &target).unwrap());
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod iam;
pub mod principal;
pub mod report;
pub mod search;

pub use crate::backend::{AccountSnapshot, IamBackend, MemoryBackend, PrincipalSnapshot};
#[cfg(feature = "aws")]
pub use crate::backend::AwsIamBackend;
pub use crate::config::{FailureMode, ScanConfig, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use crate::error::{Result, ScanError};
pub use crate::evaluator::{GrantRecord, PolicyKind, PrincipalEvaluator};
pub use crate::iam::{
    action_grants, parse_targets, statement_grants, ActionList, CacheStats, Effect,
    PolicyCache, PolicyDocument, Statement, TargetAction,
};
pub use crate::principal::{KindOperations, Principal, PrincipalKind};
pub use crate::report::{render_csv, render_table, OutputFormat};
pub use crate::search::{
    ActionGrants, PermissionSearch, PrincipalFailure, SearchReport, SearchResult,
};
