//! Action matching
//!
//! Policy actions support two wildcards:
//! - `*` - Grants every action in every namespace
//! - `namespace:*` - Grants every verb within one namespace (e.g., `iam:*`)
//!
//! Partial verb wildcards such as `iam:Get*` are not expanded; they only
//! match a target that is literally the same string.

use crate::error::{Result, ScanError};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

/// A caller-supplied action to search grants for, of the form `namespace:verb`.
///
/// Wildcards are policy content, never valid input here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetAction(String);

impl TargetAction {
    /// Pattern for `namespace:verb` with no wildcards and a single separator
    const PATTERN: &'static str = r"^[A-Za-z0-9][A-Za-z0-9_.-]*:[A-Za-z0-9][A-Za-z0-9_.-]*$";

    /// Parse and validate a target action
    ///
    /// # Errors
    ///
    /// Returns `InvalidTargetAction` if the action is not `namespace:verb`.
    ///
    /// # Examples
    ///
    /// ```
    /// use grantscan::TargetAction;
    ///
    /// let action = TargetAction::parse("iam:PassRole").unwrap();
    /// assert_eq!(action.namespace(), "iam");
    /// assert_eq!(action.verb(), "PassRole");
    ///
    /// assert!(TargetAction::parse("iam:*").is_err());
    /// assert!(TargetAction::parse("PassRole").is_err());
    /// ```
    pub fn parse(action: impl Into<String>) -> Result<Self> {
        let action = action.into();

        if action.contains('*') {
            return Err(ScanError::InvalidTargetAction(format!(
                "'{}' contains a wildcard; target actions must name a single action",
                action
            )));
        }

        let re = Regex::new(Self::PATTERN)
            .map_err(|e| ScanError::InvalidTargetAction(e.to_string()))?;
        if !re.is_match(&action) {
            return Err(ScanError::InvalidTargetAction(format!(
                "'{}' must be of the form namespace:verb",
                action
            )));
        }

        Ok(TargetAction(action))
    }

    /// Service namespace, e.g. `iam`
    pub fn namespace(&self) -> &str {
        self.split().0
    }

    /// Action verb, e.g. `PassRole`
    pub fn verb(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Validated in parse()
        self.0.split_once(':').unwrap_or((self.0.as_str(), ""))
    }
}

impl AsRef<str> for TargetAction {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TargetAction {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        TargetAction::parse(s)
    }
}

impl Serialize for TargetAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Parse a list of caller actions, dropping duplicates but keeping first-seen order
pub fn parse_targets<S: AsRef<str>>(actions: &[S]) -> Result<Vec<TargetAction>> {
    let mut targets: Vec<TargetAction> = Vec::with_capacity(actions.len());
    for action in actions {
        let target = TargetAction::parse(action.as_ref())?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Split a policy action into `(namespace, verb)`
fn split_policy_action(action: &str) -> Result<(&str, &str)> {
    match action.split_once(':') {
        Some((namespace, verb))
            if !namespace.is_empty() && !verb.is_empty() && !verb.contains(':') =>
        {
            Ok((namespace, verb))
        }
        _ => Err(ScanError::MalformedPolicy(format!(
            "action '{}' is not of the form namespace:verb",
            action
        ))),
    }
}

/// Check whether a single policy action grants the target action
///
/// # Errors
///
/// Returns `MalformedPolicy` when the action needs to be split and has no
/// single `:` separator.
///
/// # Examples
///
/// ```
/// use grantscan::{action_grants, TargetAction};
///
/// let target = TargetAction::parse("iam:PassRole").unwrap();
/// assert!(action_grants("*", &target).unwrap());
/// assert!(action_grants("iam:*", &target).unwrap());
/// assert!(!action_grants("s3:*", &target).unwrap());
/// ```
pub fn action_grants(action: &str, target: &TargetAction) -> Result<bool> {
    if action == "*" {
        return Ok(true);
    }

    if action == target.as_str() {
        return Ok(true);
    }

    let (namespace, verb) = split_policy_action(action)?;

    // e.g. iam:* grants iam:PassRole
    Ok(namespace == target.namespace() && verb == "*")
}
