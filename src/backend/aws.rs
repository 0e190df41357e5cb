//! Live IAM backend over the AWS SDK
//!
//! Credentials and region come from the standard AWS configuration chain,
//! optionally narrowed to a named profile.

use super::IamBackend;
use crate::error::{Result, ScanError};
use crate::iam::PolicyDocument;
use crate::principal::{Principal, PrincipalKind};
use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::Client;
use tracing::{debug, info};

/// IAM backend talking to the AWS IAM API
pub struct AwsIamBackend {
    client: Client,
}

impl AwsIamBackend {
    /// Wrap an existing SDK client
    pub fn new(client: Client) -> Self {
        AwsIamBackend { client }
    }

    /// Build a client from the default credential chain, or from `profile`
    pub async fn from_profile(profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = profile {
            info!("Using AWS profile {}", profile);
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

/// Map an SDK failure onto the scan taxonomy; `NoSuchEntity` is the only
/// service error that means the object is gone
fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ScanError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let Some(service_error) = err.as_service_error() {
        if service_error.code() == Some("NoSuchEntity") {
            let message = service_error.message().unwrap_or(operation).to_string();
            return ScanError::NotFound(message);
        }
    }
    ScanError::unavailable(operation, DisplayErrorContext(&err))
}

fn encoded_document(operation: &str, document: Option<&str>) -> Result<PolicyDocument> {
    let document = document.ok_or_else(|| {
        ScanError::MalformedPolicy(format!("{} returned no policy document", operation))
    })?;
    PolicyDocument::from_encoded(document)
}

#[async_trait]
impl IamBackend for AwsIamBackend {
    async fn list_principals(&self, kind: PrincipalKind) -> Result<Vec<String>> {
        let operation = kind.operations().list;
        let mut names = Vec::new();

        match kind {
            PrincipalKind::Role => {
                let mut pages = self.client.list_roles().into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    names.extend(page.roles().iter().map(|r| r.role_name().to_string()));
                }
            }
            PrincipalKind::User => {
                let mut pages = self.client.list_users().into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    names.extend(page.users().iter().map(|u| u.user_name().to_string()));
                }
            }
            PrincipalKind::Group => {
                let mut pages = self.client.list_groups().into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    names.extend(page.groups().iter().map(|g| g.group_name().to_string()));
                }
            }
        }

        debug!("{} returned {} principals", operation, names.len());
        Ok(names)
    }

    async fn list_inline_policy_names(&self, principal: &Principal) -> Result<Vec<String>> {
        let operation = principal.kind.operations().list_inline;
        let name = principal.name.as_str();
        let mut policies = Vec::new();

        match principal.kind {
            PrincipalKind::Role => {
                let mut pages = self.client.list_role_policies().role_name(name).into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    policies.extend(page.policy_names().iter().cloned());
                }
            }
            PrincipalKind::User => {
                let mut pages = self.client.list_user_policies().user_name(name).into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    policies.extend(page.policy_names().iter().cloned());
                }
            }
            PrincipalKind::Group => {
                let mut pages = self.client.list_group_policies().group_name(name).into_paginator().send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    policies.extend(page.policy_names().iter().cloned());
                }
            }
        }

        Ok(policies)
    }

    async fn fetch_inline_policy_document(
        &self,
        principal: &Principal,
        policy_name: &str,
    ) -> Result<PolicyDocument> {
        let operation = principal.kind.operations().get_inline;
        let name = principal.name.as_str();

        let document = match principal.kind {
            PrincipalKind::Role => self
                .client
                .get_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| map_sdk_error(operation, e))?
                .policy_document()
                .to_string(),
            PrincipalKind::User => self
                .client
                .get_user_policy()
                .user_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| map_sdk_error(operation, e))?
                .policy_document()
                .to_string(),
            PrincipalKind::Group => self
                .client
                .get_group_policy()
                .group_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| map_sdk_error(operation, e))?
                .policy_document()
                .to_string(),
        };

        PolicyDocument::from_encoded(&document)
    }

    async fn list_attached_policy_identifiers(&self, principal: &Principal) -> Result<Vec<String>> {
        let operation = principal.kind.operations().list_attached;
        let name = principal.name.as_str();
        let mut arns = Vec::new();

        match principal.kind {
            PrincipalKind::Role => {
                let mut pages = self
                    .client
                    .list_attached_role_policies()
                    .role_name(name)
                    .into_paginator()
                    .send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    arns.extend(
                        page.attached_policies()
                            .iter()
                            .filter_map(|p| p.policy_arn().map(str::to_string)),
                    );
                }
            }
            PrincipalKind::User => {
                let mut pages = self
                    .client
                    .list_attached_user_policies()
                    .user_name(name)
                    .into_paginator()
                    .send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    arns.extend(
                        page.attached_policies()
                            .iter()
                            .filter_map(|p| p.policy_arn().map(str::to_string)),
                    );
                }
            }
            PrincipalKind::Group => {
                let mut pages = self
                    .client
                    .list_attached_group_policies()
                    .group_name(name)
                    .into_paginator()
                    .send();
                while let Some(page) = pages.next().await {
                    let page = page.map_err(|e| map_sdk_error(operation, e))?;
                    arns.extend(
                        page.attached_policies()
                            .iter()
                            .filter_map(|p| p.policy_arn().map(str::to_string)),
                    );
                }
            }
        }

        Ok(arns)
    }

    async fn fetch_managed_policy_document(&self, identifier: &str) -> Result<PolicyDocument> {
        // Identifier -> active version id -> version document
        let policy = self
            .client
            .get_policy()
            .policy_arn(identifier)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetPolicy", e))?;
        let version_id = policy
            .policy()
            .and_then(|p| p.default_version_id())
            .ok_or_else(|| {
                ScanError::MalformedPolicy(format!("{} has no default version", identifier))
            })?
            .to_string();

        let version = self
            .client
            .get_policy_version()
            .policy_arn(identifier)
            .version_id(&version_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetPolicyVersion", e))?;

        encoded_document(
            "GetPolicyVersion",
            version.policy_version().and_then(|v| v.document()),
        )
    }

    async fn fetch_trust_policy_document(&self, role: &Principal) -> Result<Option<PolicyDocument>> {
        if !role.kind.has_trust_policy() {
            return Ok(None);
        }

        let output = self
            .client
            .get_role()
            .role_name(&role.name)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetRole", e))?;

        output
            .role()
            .and_then(|r| r.assume_role_policy_document())
            .map(PolicyDocument::from_encoded)
            .transpose()
    }
}
