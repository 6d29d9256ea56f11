//! Core types for stratus-pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cloud account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Cloud region identifier (e.g. `us-east-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Create a new region identifier.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    /// Get the region as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of one release stage (e.g. `UAT`, `PROD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    /// Create a new stage name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of the service stack deployed into one stage.
///
/// Derived from the application name and the stage name; see
/// [`ServiceName::for_stage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a service name from a raw string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the conventional service name for a stage.
    ///
    /// The release runtime creates its application and deployment group under
    /// this exact name, so the convention must not drift.
    #[must_use]
    pub fn for_stage(application: &str, stage: &StageName) -> Self {
        Self(format!("{application}Service-{stage}"))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Create a new pipeline ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique pipeline ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PipelineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Target environment for one stage: an account and a region.
///
/// Both fields are required. A blank account or region is a configuration
/// error detected at description time, before any resource is described.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    /// Account the stage deploys into.
    pub account: AccountId,
    /// Region the stage deploys into.
    pub region: Region,
}

impl Environment {
    /// Create a new environment.
    #[must_use]
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: AccountId::new(account),
            region: Region::new(region),
        }
    }

    /// Check that both account and region are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.account.as_str().trim().is_empty() && !self.region.as_str().trim().is_empty()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// Immutable description of one release stage.
///
/// Created by the caller before the pipeline build; the builder never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name, unique within a pipeline.
    pub name: StageName,
    /// How fast traffic shifts to a new revision in this stage.
    pub ramp_policy: RampUpPolicy,
    /// Account and region the stage deploys into.
    pub environment: Environment,
}

impl StageSpec {
    /// Create a stage description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ramp_policy: RampUpPolicy,
        environment: Environment,
    ) -> Self {
        Self {
            name: StageName::new(name),
            ramp_policy,
            environment,
        }
    }
}

/// Declarative rule governing how fast traffic shifts from the blue target
/// to a new revision during a release.
///
/// The policy is description only. Enforcement, including the bake window
/// and rollback on failure, belongs to the external release runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RampUpPolicy {
    /// Shift all traffic at once.
    AllAtOnce,
    /// Shift a fixed percentage, bake, then shift the remainder.
    Canary {
        /// Percentage of traffic shifted in the first increment.
        percent: u8,
        /// Bake time between the canary increment and the full shift.
        interval_minutes: u32,
    },
    /// Shift traffic in equal increments with a fixed interval between them.
    Linear {
        /// Percentage of traffic shifted per increment.
        percent: u8,
        /// Interval between increments.
        interval_minutes: u32,
    },
}

impl RampUpPolicy {
    /// Canary: 10% first, remainder after five minutes.
    pub const CANARY_10_PERCENT_5_MINUTES: Self = Self::Canary {
        percent: 10,
        interval_minutes: 5,
    };

    /// Linear: 10% per minute.
    pub const LINEAR_10_PERCENT_EVERY_1_MINUTE: Self = Self::Linear {
        percent: 10,
        interval_minutes: 1,
    };

    /// The deployment-configuration name the release runtime knows this
    /// policy by.
    #[must_use]
    pub fn deployment_config_name(&self) -> String {
        match self {
            Self::AllAtOnce => "CodeDeployDefault.ECSAllAtOnce".to_owned(),
            Self::Canary {
                percent,
                interval_minutes,
            } => {
                format!("CodeDeployDefault.ECSCanary{percent}Percent{interval_minutes}Minutes")
            }
            Self::Linear {
                percent,
                interval_minutes,
            } => {
                format!("CodeDeployDefault.ECSLinear{percent}PercentEvery{interval_minutes}Minutes")
            }
        }
    }
}

impl Default for RampUpPolicy {
    fn default() -> Self {
        Self::AllAtOnce
    }
}

impl fmt::Display for RampUpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.deployment_config_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_convention() {
        let name = ServiceName::for_stage("Demo", &StageName::new("UAT"));
        assert_eq!(name.as_str(), "DemoService-UAT");
    }

    #[test]
    fn environment_completeness() {
        assert!(Environment::new("742584497250", "us-east-1").is_complete());
        assert!(!Environment::new("", "us-east-1").is_complete());
        assert!(!Environment::new("742584497250", "  ").is_complete());
    }

    #[test]
    fn ramp_policy_config_names() {
        assert_eq!(
            RampUpPolicy::CANARY_10_PERCENT_5_MINUTES.deployment_config_name(),
            "CodeDeployDefault.ECSCanary10Percent5Minutes"
        );
        assert_eq!(
            RampUpPolicy::LINEAR_10_PERCENT_EVERY_1_MINUTE.deployment_config_name(),
            "CodeDeployDefault.ECSLinear10PercentEvery1Minutes"
        );
        assert_eq!(
            RampUpPolicy::AllAtOnce.deployment_config_name(),
            "CodeDeployDefault.ECSAllAtOnce"
        );
    }

    #[test]
    fn serde_roundtrip() {
        let policies = [
            RampUpPolicy::AllAtOnce,
            RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
            RampUpPolicy::LINEAR_10_PERCENT_EVERY_1_MINUTE,
        ];

        for policy in policies {
            let json = serde_json::to_string(&policy).unwrap();
            let parsed: RampUpPolicy = serde_json::from_str(&json).unwrap();
            assert_eq!(policy, parsed);
        }
    }

    #[test]
    fn environment_serde_roundtrip() {
        let env = Environment::new("742584497250", "us-east-2");
        let json = serde_json::to_string(&env).unwrap();
        let parsed: Environment = serde_json::from_str(&json).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn generated_pipeline_ids_are_unique() {
        let a = PipelineId::generate();
        let b = PipelineId::generate();
        assert_ne!(a, b);
    }
}
