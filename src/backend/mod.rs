//! Backend client adapter
//!
//! The engine reaches the identity backend only through [`IamBackend`].
//! Implementations drain pagination before returning, do no caching or
//! retrying, and map the backend's errors onto
//! [`ScanError::BackendUnavailable`](crate::ScanError::BackendUnavailable) and
//! [`ScanError::NotFound`](crate::ScanError::NotFound).

#[cfg(feature = "aws")]
mod aws;
mod memory;

#[cfg(feature = "aws")]
pub use aws::AwsIamBackend;
pub use memory::{AccountSnapshot, MemoryBackend, PrincipalSnapshot};

use crate::error::Result;
use crate::iam::PolicyDocument;
use crate::principal::{Principal, PrincipalKind};
use async_trait::async_trait;

/// Retrieval contract for principals and their policy documents
#[async_trait]
pub trait IamBackend: Send + Sync {
    /// Names of every principal of `kind`, across all pages
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<String>>;

    /// Names of the inline policies embedded in `principal`
    async fn list_inline_policy_names(&self, principal: &Principal) -> Result<Vec<String>>;

    /// Fetch one inline policy document
    async fn fetch_inline_policy_document(
        &self,
        principal: &Principal,
        policy_name: &str,
    ) -> Result<PolicyDocument>;

    /// Identifiers of the managed policies attached to `principal`
    async fn list_attached_policy_identifiers(&self, principal: &Principal) -> Result<Vec<String>>;

    /// Fetch the currently active version of a managed policy
    async fn fetch_managed_policy_document(&self, identifier: &str) -> Result<PolicyDocument>;

    /// Fetch a role's trust (assume-role) policy, if the backend exposes one
    async fn fetch_trust_policy_document(&self, _role: &Principal) -> Result<Option<PolicyDocument>> {
        Ok(None)
    }
}
