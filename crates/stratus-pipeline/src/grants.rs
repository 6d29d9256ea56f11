//! Cross-account trust grants for the pipeline's self-update identity.
//!
//! Deploying a stage into another account requires support resources in
//! that account, and updating those is part of the pipeline updating its
//! own description. Which accounts are involved is only known once every
//! stage has been composed, and by then the identity's baseline
//! permissions are locked in, so the missing trust is appended here, after
//! the pipeline's internal structure is finalised.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{AccountId, Environment, StageName};

/// Action appended for every cross-account stage.
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

/// Role-tag key the trusted roles are selected by.
pub const BOOTSTRAP_ROLE_TAG_KEY: &str = "iam:ResourceTag/bootstrap-role";

/// Role-name tags a grant is scoped to.
pub const BOOTSTRAP_ROLE_TAG_VALUES: [&str; 2] = ["file-publishing", "deploy"];

/// Effect of a policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Permit the listed actions.
    Allow,
    /// Refuse the listed actions.
    Deny,
}

/// A condition narrowing a policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition operator (e.g. `ForAnyValue:StringEquals`).
    pub operator: String,
    /// Condition key.
    pub key: String,
    /// Values any of which satisfies the condition.
    pub values: Vec<String>,
}

/// One permission statement on an execution identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Statement effect.
    pub effect: Effect,
    /// Actions the statement covers.
    pub actions: Vec<String>,
    /// Resources the statement covers.
    pub resources: Vec<String>,
    /// Conditions narrowing the statement.
    pub conditions: Vec<Condition>,
}

impl PolicyStatement {
    /// Create an allow statement.
    #[must_use]
    pub fn allow(actions: Vec<String>, resources: Vec<String>) -> Self {
        Self {
            effect: Effect::Allow,
            actions,
            resources,
            conditions: Vec::new(),
        }
    }

    /// Narrow the statement with a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// The permission principal under which the pipeline updates its own
/// description.
///
/// Statements can only be appended, never removed or replaced, so ordering
/// among grants is irrelevant and repeated application cannot shrink the
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    role_id: String,
    statements: Vec<PolicyStatement>,
}

impl ExecutionIdentity {
    /// Create an identity with no additional statements.
    #[must_use]
    pub fn new(role_id: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            statements: Vec::new(),
        }
    }

    /// Role identifier of the identity.
    #[must_use]
    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    /// Append a permission statement.
    pub fn append(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    /// Statements appended so far.
    #[must_use]
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }
}

/// Record of one cross-account trust grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossAccountGrant {
    /// Stage the grant was produced for.
    pub stage: StageName,
    /// Account the trusted roles live in.
    pub account: AccountId,
    /// Role-name tags the grant is scoped to.
    pub role_tags: Vec<String>,
}

/// Extend the self-update identity for every cross-account stage.
///
/// Appends one assume-role statement per entry, scoped to roles in the
/// stage's account carrying one of the convention tags. Same-account
/// stages must not appear in `stages`; each entry contributes exactly one
/// statement.
pub fn grant_cross_account_update(
    identity: &mut ExecutionIdentity,
    stages: &[(StageName, Environment)],
) -> Vec<CrossAccountGrant> {
    let mut grants = Vec::with_capacity(stages.len());

    for (stage, env) in stages {
        debug!(
            stage = %stage,
            account = %env.account,
            role = identity.role_id(),
            "extending self-update identity for cross-account stage"
        );

        let statement = PolicyStatement::allow(
            vec![ASSUME_ROLE_ACTION.to_owned()],
            vec![format!("arn:*:iam::{}:role/*", env.account)],
        )
        .with_condition(Condition {
            operator: "ForAnyValue:StringEquals".to_owned(),
            key: BOOTSTRAP_ROLE_TAG_KEY.to_owned(),
            values: BOOTSTRAP_ROLE_TAG_VALUES
                .iter()
                .map(|tag| (*tag).to_owned())
                .collect(),
        });
        identity.append(statement);

        grants.push(CrossAccountGrant {
            stage: stage.clone(),
            account: env.account.clone(),
            role_tags: BOOTSTRAP_ROLE_TAG_VALUES
                .iter()
                .map(|tag| (*tag).to_owned())
                .collect(),
        });
    }

    grants
}
