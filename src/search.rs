//! Search orchestration
//!
//! For each principal kind, enumerate principals and evaluate them on a
//! bounded worker pool. Each worker returns its own grant records and the
//! orchestrator merges them one at a time, so the result map has a single
//! writer. The report is only handed back once every dispatched worker has
//! finished and been merged.

use crate::backend::IamBackend;
use crate::config::{FailureMode, ScanConfig};
use crate::error::{Result, ScanError};
use crate::evaluator::{GrantRecord, PrincipalEvaluator};
use crate::iam::{parse_targets, CacheStats, PolicyCache, TargetAction};
use crate::principal::{Principal, PrincipalKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Grants found for one target action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionGrants {
    pub action: TargetAction,
    pub grants: Vec<GrantRecord>,
}

/// Mapping from every requested target action to its grants, in request order.
///
/// Grants within an action appear in evaluation completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SearchResult {
    entries: Vec<ActionGrants>,
}

impl SearchResult {
    /// Start a result with an empty grant list for every target
    pub fn new(targets: &[TargetAction]) -> Self {
        SearchResult {
            entries: targets
                .iter()
                .map(|action| ActionGrants {
                    action: action.clone(),
                    grants: Vec::new(),
                })
                .collect(),
        }
    }

    /// Route a record to its target action's list
    pub(crate) fn merge(&mut self, record: GrantRecord) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.action == record.target_action)
        {
            Some(entry) => entry.grants.push(record),
            None => warn!(
                "Dropping grant for unrequested action {}",
                record.target_action
            ),
        }
    }

    /// Grants for one action, if it was requested
    pub fn get(&self, action: &str) -> Option<&[GrantRecord]> {
        self.entries
            .iter()
            .find(|entry| entry.action.as_str() == action)
            .map(|entry| entry.grants.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionGrants> {
        self.entries.iter()
    }

    /// Requested target actions, in request order
    pub fn actions(&self) -> impl Iterator<Item = &TargetAction> {
        self.entries.iter().map(|entry| &entry.action)
    }

    /// Number of target actions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Grant records across all actions
    pub fn total_grants(&self) -> usize {
        self.entries.iter().map(|entry| entry.grants.len()).sum()
    }

    /// Every grant as an unordered set, for comparing runs
    pub fn grant_set(&self) -> HashSet<GrantRecord> {
        self.entries
            .iter()
            .flat_map(|entry| entry.grants.iter().cloned())
            .collect()
    }
}

/// A principal that could not be evaluated. Never conflated with zero grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalFailure {
    pub principal: Principal,
    pub error: String,
}

/// Outcome of one search run
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub results: SearchResult,
    /// Principals skipped because of an isolated failure
    pub failures: Vec<PrincipalFailure>,
    /// Principals whose evaluation completed (successfully or not)
    pub principals_evaluated: usize,
    /// The run was cancelled before every principal was dispatched
    pub cancelled: bool,
    pub cache: CacheStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SearchReport {
    /// True when every principal was evaluated
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Progress accumulated while a run is in flight
struct RunState {
    results: SearchResult,
    failures: Vec<PrincipalFailure>,
    evaluated: usize,
    cancelled: bool,
}

/// Searches every principal for grants of a set of target actions
pub struct PermissionSearch {
    backend: Arc<dyn IamBackend>,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl PermissionSearch {
    /// Create a search over `backend`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn new(backend: Arc<dyn IamBackend>, config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(PermissionSearch {
            backend,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this search; clone it to cancel from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Parse the caller's action strings and run the search.
    ///
    /// Invalid actions are rejected before any backend call is made.
    pub async fn run<S: AsRef<str>>(&self, actions: &[S]) -> Result<SearchReport> {
        let targets = parse_targets(actions)?;
        self.run_targets(targets).await
    }

    /// Run the search for already-validated target actions
    pub async fn run_targets(&self, targets: Vec<TargetAction>) -> Result<SearchReport> {
        let started_at = Utc::now();
        let mut unique: Vec<TargetAction> = Vec::with_capacity(targets.len());
        for target in targets {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }

        info!(
            "Searching {} kinds for {} actions (concurrency {})",
            self.config.kinds.len(),
            unique.len(),
            self.config.concurrency
        );

        // One cache per run; documents never outlive the scan that fetched them
        let cache = Arc::new(PolicyCache::new());
        let evaluator = PrincipalEvaluator::new(self.backend.clone(), cache.clone(), unique.clone())
            .with_trust(self.config.include_trust);
        let pool = Arc::new(Semaphore::new(self.config.concurrency));

        let mut state = RunState {
            results: SearchResult::new(&unique),
            failures: Vec::new(),
            evaluated: 0,
            cancelled: false,
        };

        for kind in &self.config.kinds {
            if self.cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }
            self.search_kind(*kind, &evaluator, &pool, &mut state).await?;
            if state.cancelled {
                break;
            }
        }

        let report = SearchReport {
            results: state.results,
            failures: state.failures,
            principals_evaluated: state.evaluated,
            cancelled: state.cancelled,
            cache: cache.stats(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Search finished: {} principals, {} grants, {} failures, {} managed fetches{}",
            report.principals_evaluated,
            report.results.total_grants(),
            report.failures.len(),
            report.cache.fetches,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Enumerate one kind and evaluate its principals on the worker pool
    async fn search_kind(
        &self,
        kind: PrincipalKind,
        evaluator: &PrincipalEvaluator,
        pool: &Arc<Semaphore>,
        state: &mut RunState,
    ) -> Result<()> {
        let names = self.backend.list_principals(kind).await?;
        info!("Evaluating {} {}s", names.len(), kind.as_str());

        let mut workers: JoinSet<(Principal, Result<Vec<GrantRecord>>)> = JoinSet::new();

        for name in names {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Search cancelled; draining in-flight {}s", kind.as_str());
                    state.cancelled = true;
                    break;
                }
                permit = pool.clone().acquire_owned() => permit
                    .map_err(|_| ScanError::Worker("worker pool closed".to_string()))?,
            };

            let principal = Principal::new(kind, name);
            let evaluator = evaluator.clone();
            workers.spawn(async move {
                let _permit = permit;
                let outcome = evaluator.evaluate(&principal).await;
                (principal, outcome)
            });

            // Merge whatever already finished so abort mode fails fast
            while let Some(joined) = workers.try_join_next() {
                self.merge(joined, state)?;
            }
        }

        while let Some(joined) = workers.join_next().await {
            self.merge(joined, state)?;
        }

        Ok(())
    }

    /// Fold one worker's output into the run state.
    ///
    /// Returning an error drops the JoinSet, which aborts remaining workers.
    fn merge(
        &self,
        joined: std::result::Result<(Principal, Result<Vec<GrantRecord>>), tokio::task::JoinError>,
        state: &mut RunState,
    ) -> Result<()> {
        let (principal, outcome) = joined.map_err(|e| ScanError::Worker(e.to_string()))?;
        state.evaluated += 1;

        match outcome {
            Ok(records) => {
                debug!("{} produced {} grants", principal, records.len());
                for record in records {
                    state.results.merge(record);
                }
                Ok(())
            }
            Err(e) if e.is_fatal() || self.config.failure_mode == FailureMode::Abort => {
                warn!("Evaluating {} failed, aborting search: {}", principal, e);
                Err(e)
            }
            Err(e) => {
                warn!("Evaluating {} failed, continuing: {}", principal, e);
                state.failures.push(PrincipalFailure {
                    principal,
                    error: e.to_string(),
                });
                Ok(())
            }
        }
    }
}
