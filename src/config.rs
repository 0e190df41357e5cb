//! Scan configuration
//!
//! Loaded from TOML, e.g.:
//!
//! ```toml
//! concurrency = 8
//! failure_mode = "isolate"
//! kinds = ["role", "user"]
//! include_trust = true
//! ```

use crate::error::{Result, ScanError};
use crate::principal::PrincipalKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of principals evaluated at once
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Upper bound on worker width; each worker holds one backend call in flight
pub const MAX_CONCURRENCY: usize = 1024;

/// What a run does when one principal cannot be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Fail the whole run on the first principal failure
    #[default]
    Abort,
    /// Record the failed principal in the report and keep going
    Isolate,
}

impl std::str::FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailureMode::Abort),
            "isolate" | "skip" => Ok(FailureMode::Isolate),
            _ => Err(format!(
                "Invalid failure mode '{}'. Valid options: abort, isolate",
                s
            )),
        }
    }
}

/// Settings for one permission search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Maximum principals evaluated concurrently; bounds outstanding backend calls
    pub concurrency: usize,

    /// Abort on the first failed principal, or isolate failures
    pub failure_mode: FailureMode,

    /// Principal kinds to scan, in processing order
    pub kinds: Vec<PrincipalKind>,

    /// Attach a summary of each role's trust policy to its grants
    pub include_trust: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            concurrency: DEFAULT_CONCURRENCY,
            failure_mode: FailureMode::Abort,
            kinds: PrincipalKind::ALL.to_vec(),
            include_trust: false,
        }
    }
}

impl ScanConfig {
    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ScanConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ScanError::Config("concurrency must be at least 1".to_string()));
        }

        if self.concurrency > MAX_CONCURRENCY {
            return Err(ScanError::Config(format!(
                "concurrency {} exceeds the maximum of {}",
                self.concurrency, MAX_CONCURRENCY
            )));
        }

        if self.kinds.is_empty() {
            return Err(ScanError::Config(
                "at least one principal kind must be scanned".to_string(),
            ));
        }

        for (i, kind) in self.kinds.iter().enumerate() {
            if self.kinds[..i].contains(kind) {
                return Err(ScanError::Config(format!(
                    "principal kind '{}' listed more than once",
                    kind.as_str()
                )));
            }
        }

        Ok(())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<PrincipalKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_trust(mut self, include_trust: bool) -> Self {
        self.include_trust = include_trust;
        self
    }
}
