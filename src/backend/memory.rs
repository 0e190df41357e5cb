//! In-process IAM backend
//!
//! Holds principals and policies in memory, either built up programmatically
//! or loaded from a JSON account snapshot:
//!
//! ```json
//! {
//!   "roles": [{"name": "deploy", "inline": {"Name": {...}}, "attached": ["arn"], "trust": {...}}],
//!   "users": [],
//!   "groups": [],
//!   "managed": {"arn": {...}}
//! }
//! ```
//!
//! Documents are stored raw and parsed on fetch, so a malformed document
//! surfaces during the scan exactly as it would from a live backend. Every
//! call is counted, which lets tests assert how often the backend was hit.

use super::IamBackend;
use crate::error::{Result, ScanError};
use crate::iam::PolicyDocument;
use crate::principal::{Principal, PrincipalKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// One principal in an account snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalSnapshot {
    pub name: String,
    /// Inline policy name -> document
    pub inline: BTreeMap<String, serde_json::Value>,
    /// Attached managed policy identifiers
    pub attached: Vec<String>,
    /// Trust policy (roles only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<serde_json::Value>,
}

/// Serialized form of a whole account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSnapshot {
    pub roles: Vec<PrincipalSnapshot>,
    pub users: Vec<PrincipalSnapshot>,
    pub groups: Vec<PrincipalSnapshot>,
    /// Managed policy identifier -> active version document
    pub managed: BTreeMap<String, serde_json::Value>,
}

/// IAM backend served from memory
#[derive(Default)]
pub struct MemoryBackend {
    principals: BTreeMap<PrincipalKind, BTreeMap<String, PrincipalSnapshot>>,
    managed: HashMap<String, serde_json::Value>,
    unavailable: HashSet<Principal>,
    vanished: HashSet<Principal>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    managed_fetches: Mutex<HashMap<String, usize>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend from a snapshot
    pub fn from_snapshot(snapshot: AccountSnapshot) -> Self {
        let mut backend = Self::new();
        let kinds = [
            (PrincipalKind::Role, snapshot.roles),
            (PrincipalKind::User, snapshot.users),
            (PrincipalKind::Group, snapshot.groups),
        ];
        for (kind, entries) in kinds {
            let by_name = backend.principals.entry(kind).or_default();
            for entry in entries {
                by_name.insert(entry.name.clone(), entry);
            }
        }
        backend.managed = snapshot.managed.into_iter().collect();
        backend
    }

    /// Parse a snapshot from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: AccountSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    fn entry_mut(&mut self, principal: &Principal) -> &mut PrincipalSnapshot {
        self.principals
            .entry(principal.kind)
            .or_default()
            .entry(principal.name.clone())
            .or_insert_with(|| PrincipalSnapshot {
                name: principal.name.clone(),
                ..Default::default()
            })
    }

    /// Add a principal with no policies
    pub fn add_principal(&mut self, principal: &Principal) -> &mut Self {
        self.entry_mut(principal);
        self
    }

    /// Embed an inline policy in a principal, creating the principal if needed
    pub fn put_inline_policy(
        &mut self,
        principal: &Principal,
        policy_name: &str,
        document: serde_json::Value,
    ) -> &mut Self {
        self.entry_mut(principal)
            .inline
            .insert(policy_name.to_string(), document);
        self
    }

    /// Attach a managed policy identifier to a principal
    pub fn attach_managed_policy(&mut self, principal: &Principal, identifier: &str) -> &mut Self {
        self.entry_mut(principal).attached.push(identifier.to_string());
        self
    }

    /// Define the active document of a managed policy
    pub fn put_managed_policy(&mut self, identifier: &str, document: serde_json::Value) -> &mut Self {
        self.managed.insert(identifier.to_string(), document);
        self
    }

    /// Set a role's trust policy
    pub fn set_trust_policy(&mut self, role: &Principal, document: serde_json::Value) -> &mut Self {
        self.entry_mut(role).trust = Some(document);
        self
    }

    /// Make every per-principal call for `principal` fail as unavailable
    pub fn mark_unavailable(&mut self, principal: &Principal) -> &mut Self {
        self.unavailable.insert(principal.clone());
        self
    }

    /// Keep `principal` in listings but answer NotFound for it afterwards,
    /// as if it were deleted mid-scan
    pub fn mark_vanished(&mut self, principal: &Principal) -> &mut Self {
        self.vanished.insert(principal.clone());
        self
    }

    /// Delay every call, to simulate network round trips
    pub fn set_latency(&mut self, latency: Duration) -> &mut Self {
        self.latency = Some(latency);
        self
    }

    /// Total calls served
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Times a managed policy document was fetched
    pub fn managed_fetch_count(&self, identifier: &str) -> usize {
        self.managed_fetches
            .lock()
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    /// Managed policy fetches across all identifiers
    pub fn total_managed_fetches(&self) -> usize {
        self.managed_fetches.lock().values().sum()
    }

    async fn begin_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lookup(&self, principal: &Principal, operation: &str) -> Result<&PrincipalSnapshot> {
        if self.unavailable.contains(principal) {
            return Err(ScanError::unavailable(
                operation,
                format!("simulated outage for {}", principal),
            ));
        }
        if self.vanished.contains(principal) {
            return Err(ScanError::NotFound(principal.to_string()));
        }
        self.principals
            .get(&principal.kind)
            .and_then(|by_name| by_name.get(&principal.name))
            .ok_or_else(|| ScanError::NotFound(principal.to_string()))
    }
}

#[async_trait]
impl IamBackend for MemoryBackend {
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<String>> {
        self.begin_call().await;
        Ok(self
            .principals
            .get(&kind)
            .map(|by_name| by_name.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_inline_policy_names(&self, principal: &Principal) -> Result<Vec<String>> {
        self.begin_call().await;
        let entry = self.lookup(principal, principal.kind.operations().list_inline)?;
        Ok(entry.inline.keys().cloned().collect())
    }

    async fn fetch_inline_policy_document(
        &self,
        principal: &Principal,
        policy_name: &str,
    ) -> Result<PolicyDocument> {
        self.begin_call().await;
        let entry = self.lookup(principal, principal.kind.operations().get_inline)?;
        let document = entry.inline.get(policy_name).ok_or_else(|| {
            ScanError::NotFound(format!("inline policy {} on {}", policy_name, principal))
        })?;
        PolicyDocument::from_value(document.clone())
    }

    async fn list_attached_policy_identifiers(&self, principal: &Principal) -> Result<Vec<String>> {
        self.begin_call().await;
        let entry = self.lookup(principal, principal.kind.operations().list_attached)?;
        Ok(entry.attached.clone())
    }

    async fn fetch_managed_policy_document(&self, identifier: &str) -> Result<PolicyDocument> {
        self.begin_call().await;
        *self
            .managed_fetches
            .lock()
            .entry(identifier.to_string())
            .or_insert(0) += 1;
        debug!("Serving managed policy {}", identifier);

        let document = self
            .managed
            .get(identifier)
            .ok_or_else(|| ScanError::NotFound(format!("managed policy {}", identifier)))?;
        PolicyDocument::from_value(document.clone())
    }

    async fn fetch_trust_policy_document(&self, role: &Principal) -> Result<Option<PolicyDocument>> {
        self.begin_call().await;
        if !role.kind.has_trust_policy() {
            return Ok(None);
        }
        let entry = self.lookup(role, "GetRole")?;
        entry
            .trust
            .clone()
            .map(PolicyDocument::from_value)
            .transpose()
    }
}
