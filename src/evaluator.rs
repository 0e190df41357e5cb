//! Per-principal evaluation
//!
//! Resolves every policy reaching one principal and runs the matcher against
//! each target action. Inline documents are principal-scoped and fetched
//! directly; managed documents go through the run's shared [`PolicyCache`].

use crate::backend::IamBackend;
use crate::error::Result;
use crate::iam::{PolicyCache, PolicyDocument, TargetAction};
use crate::principal::Principal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a policy reaches a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PolicyKind {
    /// Embedded in the principal
    Inline,
    /// Independently addressable, attached to the principal
    Managed,
}

impl PolicyKind {
    /// Report label ("Inline Policy" / "Managed Policy")
    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::Inline => "Inline Policy",
            PolicyKind::Managed => "Managed Policy",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One confirmed grant: `principal` is allowed `target_action` by a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GrantRecord {
    pub target_action: TargetAction,
    pub principal: Principal,
    pub policy_kind: PolicyKind,
    /// Inline policy name or managed policy identifier
    pub policy_identifier: String,
    /// Summary of the role's trust policy, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<String>,
}

/// Evaluates single principals against a fixed set of target actions.
///
/// Cloning is cheap; every clone shares the backend, cache and targets.
#[derive(Clone)]
pub struct PrincipalEvaluator {
    backend: Arc<dyn IamBackend>,
    cache: Arc<PolicyCache>,
    targets: Arc<[TargetAction]>,
    include_trust: bool,
}

impl PrincipalEvaluator {
    pub fn new(
        backend: Arc<dyn IamBackend>,
        cache: Arc<PolicyCache>,
        targets: impl Into<Arc<[TargetAction]>>,
    ) -> Self {
        PrincipalEvaluator {
            backend,
            cache,
            targets: targets.into(),
            include_trust: false,
        }
    }

    /// Attach trust policy summaries to role grants
    pub fn with_trust(mut self, include_trust: bool) -> Self {
        self.include_trust = include_trust;
        self
    }

    pub fn targets(&self) -> &[TargetAction] {
        &self.targets
    }

    /// Produce every grant record for `principal`: inline policies first,
    /// then attached managed policies, each in backend order.
    ///
    /// A principal that vanished mid-scan contributes zero grants, even if
    /// some of its policies were already read; a vanished policy is skipped.
    /// Any other failure is returned as this principal's failure.
    pub async fn evaluate(&self, principal: &Principal) -> Result<Vec<GrantRecord>> {
        let mut records = Vec::new();

        let inline_names = match self.backend.list_inline_policy_names(principal).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                warn!("{} disappeared before evaluation: {}", principal, e);
                return Ok(records);
            }
            Err(e) => return Err(e),
        };

        for policy_name in &inline_names {
            let document = match self
                .backend
                .fetch_inline_policy_document(principal, policy_name)
                .await
            {
                Ok(document) => document,
                Err(e) if e.is_not_found() => {
                    warn!("Inline policy {} on {} disappeared: {}", policy_name, principal, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.match_document(principal, &document, PolicyKind::Inline, policy_name, &mut records)?;
        }

        let attached = match self.backend.list_attached_policy_identifiers(principal).await {
            Ok(identifiers) => identifiers,
            Err(e) if e.is_not_found() => {
                // Drop inline grants too: a deleted principal holds nothing
                warn!("{} disappeared during evaluation: {}", principal, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        for identifier in &attached {
            let backend = &self.backend;
            let document = match self
                .cache
                .get_or_fetch(identifier, || backend.fetch_managed_policy_document(identifier))
                .await
            {
                Ok(document) => document,
                Err(e) if e.is_not_found() => {
                    warn!("Managed policy {} attached to {} not found: {}", identifier, principal, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.match_document(principal, &document, PolicyKind::Managed, identifier, &mut records)?;
        }

        if self.include_trust && principal.kind.has_trust_policy() && !records.is_empty() {
            let trust = self.trust_summary(principal).await?;
            for record in &mut records {
                record.trust = trust.clone();
            }
        }

        debug!(
            "{}: {} inline, {} attached, {} grants",
            principal,
            inline_names.len(),
            attached.len(),
            records.len()
        );
        Ok(records)
    }

    fn match_document(
        &self,
        principal: &Principal,
        document: &PolicyDocument,
        policy_kind: PolicyKind,
        policy_identifier: &str,
        records: &mut Vec<GrantRecord>,
    ) -> Result<()> {
        for target in self.targets.iter() {
            if document.grants(target)? {
                records.push(GrantRecord {
                    target_action: target.clone(),
                    principal: principal.clone(),
                    policy_kind,
                    policy_identifier: policy_identifier.to_string(),
                    trust: None,
                });
            }
        }
        Ok(())
    }

    async fn trust_summary(&self, role: &Principal) -> Result<Option<String>> {
        match self.backend.fetch_trust_policy_document(role).await {
            Ok(document) => Ok(document.and_then(|d| d.trust_summary())),
            Err(e) if e.is_not_found() => {
                warn!("Trust policy for {} not found: {}", role, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::ScanError;
    use crate::iam::parse_targets;
    use crate::principal::PrincipalKind;
    use async_trait::async_trait;
    use serde_json::json;

    /// Memory backend that loses objects after enumeration
    struct Disappearing {
        inner: MemoryBackend,
        deleted_after_inline: Option<Principal>,
        deleted_inline_policy: Option<&'static str>,
    }

    #[async_trait]
    impl IamBackend for Disappearing {
        async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<String>> {
            self.inner.list_principals(kind).await
        }

        async fn list_inline_policy_names(&self, principal: &Principal) -> Result<Vec<String>> {
            self.inner.list_inline_policy_names(principal).await
        }

        async fn fetch_inline_policy_document(
            &self,
            principal: &Principal,
            policy_name: &str,
        ) -> Result<PolicyDocument> {
            if self.deleted_inline_policy == Some(policy_name) {
                return Err(ScanError::NotFound(format!("inline policy {}", policy_name)));
            }
            self.inner.fetch_inline_policy_document(principal, policy_name).await
        }

        async fn list_attached_policy_identifiers(&self, principal: &Principal) -> Result<Vec<String>> {
            if self.deleted_after_inline.as_ref() == Some(principal) {
                return Err(ScanError::NotFound(principal.to_string()));
            }
            self.inner.list_attached_policy_identifiers(principal).await
        }

        async fn fetch_managed_policy_document(&self, identifier: &str) -> Result<PolicyDocument> {
            self.inner.fetch_managed_policy_document(identifier).await
        }
    }

    fn disappearing_evaluator(backend: Disappearing, targets: &[&str]) -> PrincipalEvaluator {
        PrincipalEvaluator::new(
            Arc::new(backend),
            Arc::new(PolicyCache::new()),
            parse_targets(targets).unwrap(),
        )
    }

    fn allow(actions: serde_json::Value) -> serde_json::Value {
        json!({"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": actions, "Resource": "*"}]})
    }

    fn evaluator(backend: MemoryBackend, targets: &[&str]) -> (PrincipalEvaluator, Arc<MemoryBackend>) {
        let backend = Arc::new(backend);
        let evaluator = PrincipalEvaluator::new(
            backend.clone(),
            Arc::new(PolicyCache::new()),
            parse_targets(targets).unwrap(),
        );
        (evaluator, backend)
    }

    #[tokio::test]
    async fn test_inline_and_managed_grants() {
        let role = Principal::role("ops");
        let mut backend = MemoryBackend::new();
        backend
            .put_inline_policy(&role, "storage", allow(json!("s3:*")))
            .attach_managed_policy(&role, "arn:aws:iam::aws:policy/IAMFullAccess")
            .put_managed_policy("arn:aws:iam::aws:policy/IAMFullAccess", allow(json!(["iam:*"])));

        let (evaluator, _) = evaluator(backend, &["s3:GetObject", "iam:PassRole", "ec2:RunInstances"]);
        let records = evaluator.evaluate(&role).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target_action.as_str(), "s3:GetObject");
        assert_eq!(records[0].policy_kind, PolicyKind::Inline);
        assert_eq!(records[0].policy_identifier, "storage");
        assert_eq!(records[1].target_action.as_str(), "iam:PassRole");
        assert_eq!(records[1].policy_kind, PolicyKind::Managed);
        assert_eq!(records[1].policy_identifier, "arn:aws:iam::aws:policy/IAMFullAccess");
        assert!(records.iter().all(|r| r.principal == role && r.trust.is_none()));
    }

    #[tokio::test]
    async fn test_one_record_per_policy_and_action() {
        let user = Principal::user("bob");
        let mut backend = MemoryBackend::new();
        backend
            .put_inline_policy(&user, "a", allow(json!(["iam:PassRole", "iam:*"])))
            .put_inline_policy(&user, "b", allow(json!("*")));

        let (evaluator, _) = evaluator(backend, &["iam:PassRole"]);
        let records = evaluator.evaluate(&user).await.unwrap();

        let policies: Vec<&str> = records.iter().map(|r| r.policy_identifier.as_str()).collect();
        assert_eq!(policies, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_managed_policy_is_zero_grants() {
        let group = Principal::group("devs");
        let mut backend = MemoryBackend::new();
        backend
            .attach_managed_policy(&group, "arn:deleted")
            .attach_managed_policy(&group, "arn:live")
            .put_managed_policy("arn:live", allow(json!("ec2:*")));

        let (evaluator, _) = evaluator(backend, &["ec2:RunInstances"]);
        let records = evaluator.evaluate(&group).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].policy_identifier, "arn:live");
    }

    #[tokio::test]
    async fn test_vanished_principal_is_zero_grants() {
        let user = Principal::user("gone");
        let mut backend = MemoryBackend::new();
        backend
            .put_inline_policy(&user, "all", allow(json!("*")))
            .mark_vanished(&user);

        let (evaluator, _) = evaluator(backend, &["s3:GetObject"]);
        assert!(evaluator.evaluate(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_principal() {
        let user = Principal::user("flaky");
        let mut backend = MemoryBackend::new();
        backend.add_principal(&user).mark_unavailable(&user);

        let (evaluator, _) = evaluator(backend, &["s3:GetObject"]);
        let err = evaluator.evaluate(&user).await.unwrap_err();
        assert!(matches!(err, ScanError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_inline_policy_fails() {
        let role = Principal::role("broken");
        let mut backend = MemoryBackend::new();
        backend.put_inline_policy(&role, "bad", allow(json!("GetObject")));

        let (evaluator, _) = evaluator(backend, &["s3:GetObject"]);
        let err = evaluator.evaluate(&role).await.unwrap_err();
        assert!(matches!(err, ScanError::MalformedPolicy(_)));
    }

    #[tokio::test]
    async fn test_trust_summary_on_role_grants() {
        let role = Principal::role("lambda-exec");
        let mut backend = MemoryBackend::new();
        backend
            .put_inline_policy(&role, "logs", allow(json!("logs:*")))
            .set_trust_policy(
                &role,
                json!({"Statement": [{"Effect": "Allow", "Principal": {"Service": "lambda.amazonaws.com"}, "Action": "sts:AssumeRole"}]}),
            );

        let (evaluator, _) = evaluator(backend, &["logs:PutLogEvents"]);
        let evaluator = evaluator.with_trust(true);
        let records = evaluator.evaluate(&role).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trust.as_deref(), Some("Service:lambda.amazonaws.com"));
    }

    #[tokio::test]
    async fn test_trust_skipped_without_grants() {
        let role = Principal::role("idle");
        let mut backend = MemoryBackend::new();
        backend.set_trust_policy(&role, json!({"Statement": []}));

        let (evaluator, backend) = evaluator(backend, &["s3:GetObject"]);
        let evaluator = evaluator.with_trust(true);
        assert!(evaluator.evaluate(&role).await.unwrap().is_empty());

        // list inline + list attached, no trust fetch
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_principal_deleted_after_inline_read_drops_inline_grants() {
        let user = Principal::user("leaver");
        let mut inner = MemoryBackend::new();
        inner
            .put_inline_policy(&user, "everything", allow(json!("*")))
            .attach_managed_policy(&user, "arn:admin")
            .put_managed_policy("arn:admin", allow(json!("*")));

        let evaluator = disappearing_evaluator(
            Disappearing {
                inner,
                deleted_after_inline: Some(user.clone()),
                deleted_inline_policy: None,
            },
            &["iam:PassRole"],
        );

        assert!(evaluator.evaluate(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_inline_policy_is_skipped() {
        let role = Principal::role("builder");
        let mut inner = MemoryBackend::new();
        inner
            .put_inline_policy(&role, "a-removed", allow(json!("s3:*")))
            .put_inline_policy(&role, "b-kept", allow(json!(["s3:GetObject"])));

        let evaluator = disappearing_evaluator(
            Disappearing {
                inner,
                deleted_after_inline: None,
                deleted_inline_policy: Some("a-removed"),
            },
            &["s3:GetObject"],
        );

        let records = evaluator.evaluate(&role).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].policy_identifier, "b-kept");
        assert_eq!(records[0].policy_kind, PolicyKind::Inline);
    }
}
