//! IAM policy document structure
//!
//! Documents are parsed in the backend's native JSON shape. Only the
//! `Effect`, `Action` and `Principal` elements are read; `Resource`,
//! `NotAction` and `Condition` are accepted and ignored.

use super::pattern::{action_grants, TargetAction};
use crate::error::{Result, ScanError};
use serde::{Deserialize, Deserializer, Serialize};

/// Effect of a policy statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (parsed, never applied by the matcher)
    Deny,
}

/// The `Action` element: a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    Single(String),
    Multiple(Vec<String>),
}

impl ActionList {
    /// Iterate the listed actions; a single string behaves as a one-element list
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            ActionList::Single(action) => std::slice::from_ref(action),
            ActionList::Multiple(actions) => actions,
        };
        slice.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        match self {
            ActionList::Single(_) => 1,
            ActionList::Multiple(actions) => actions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for ActionList {
    fn from(action: &str) -> Self {
        ActionList::Single(action.to_string())
    }
}

impl From<Vec<&str>> for ActionList {
    fn from(actions: Vec<&str>) -> Self {
        ActionList::Multiple(actions.into_iter().map(String::from).collect())
    }
}

/// A single policy statement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Statement ID (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Actions this statement applies to; absent for `NotAction` statements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionList>,

    /// Principals this statement applies to (trust policies only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<serde_json::Value>,
}

impl Statement {
    /// Create a new statement
    pub fn new(effect: Effect, action: impl Into<ActionList>) -> Self {
        Statement {
            sid: None,
            effect,
            action: Some(action.into()),
            principal: None,
        }
    }

    /// Check whether this statement grants the target action.
    ///
    /// Deny statements and statements without an `Action` element never grant.
    pub fn grants(&self, target: &TargetAction) -> Result<bool> {
        if self.effect != Effect::Allow {
            return Ok(false);
        }

        let Some(actions) = &self.action else {
            return Ok(false);
        };

        for action in actions.iter() {
            if action_grants(action, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Complete IAM policy document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Policy statements, in document order
    #[serde(deserialize_with = "one_or_many")]
    pub statement: Vec<Statement>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<Statement>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Statement),
        Many(Vec<Statement>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(statement) => vec![statement],
        OneOrMany::Many(statements) => statements,
    })
}

impl PolicyDocument {
    /// Create a new empty policy
    pub fn new() -> Self {
        PolicyDocument {
            version: Some("2012-10-17".to_string()),
            statement: Vec::new(),
        }
    }

    /// Add a statement to this policy
    pub fn add_statement(&mut self, statement: Statement) {
        self.statement.push(statement);
    }

    /// Parse a policy from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScanError::MalformedPolicy(e.to_string()))
    }

    /// Parse a policy from an already-decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ScanError::MalformedPolicy(e.to_string()))
    }

    /// Parse a policy as returned by the IAM API, which URL-encodes documents
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let decoded = urlencoding::decode(encoded)
            .map_err(|e| ScanError::MalformedPolicy(format!("undecodable document: {}", e)))?;
        Self::from_json(&decoded)
    }

    /// Serialize policy to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check whether any Allow statement grants the target action
    pub fn grants(&self, target: &TargetAction) -> Result<bool> {
        statement_grants(self, target)
    }

    /// Principals trusted by this document's Allow statements, rendered as
    /// `Type:value` (or `*` for an unrestricted principal), without duplicates
    pub fn trusted_principals(&self) -> Vec<String> {
        let mut trusted: Vec<String> = Vec::new();
        let mut push = |entry: String| {
            if !trusted.contains(&entry) {
                trusted.push(entry);
            }
        };

        for statement in &self.statement {
            if statement.effect != Effect::Allow {
                continue;
            }
            match &statement.principal {
                Some(serde_json::Value::String(any)) => push(any.clone()),
                Some(serde_json::Value::Object(map)) => {
                    for (kind, value) in map {
                        match value {
                            serde_json::Value::String(id) => push(format!("{}:{}", kind, id)),
                            serde_json::Value::Array(ids) => ids
                                .iter()
                                .filter_map(|id| id.as_str())
                                .for_each(|id| push(format!("{}:{}", kind, id))),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        trusted
    }

    /// `;`-joined [`trusted_principals`](Self::trusted_principals), or `None` if empty
    pub fn trust_summary(&self) -> Option<String> {
        let trusted = self.trusted_principals();
        if trusted.is_empty() {
            None
        } else {
            Some(trusted.join(";"))
        }
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide whether a policy document grants the target action.
///
/// True iff at least one `Allow` statement lists an action that
/// [`action_grants`] the target. Deny statements are skipped entirely; this
/// reports the presence of a grant, not a full access decision.
pub fn statement_grants(document: &PolicyDocument, target: &TargetAction) -> Result<bool> {
    for statement in &document.statement {
        if statement.grants(target)? {
            return Ok(true);
        }
    }
    Ok(false)
}
