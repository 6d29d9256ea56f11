//! Late-bound references to release-runtime resources.
//!
//! The deployment group that executes a release for a stage is created by
//! the release runtime the first time the pipeline deploys the service
//! stack, so it does not exist when the pipeline itself is described.
//! Referencing it by naming convention breaks the circular dependency
//! between "describe the pipeline" and "the pipeline has already run once".
//!
//! The resource state is encoded in the type system: only a
//! [`Referenced`] deployment group can be constructed here, and reading
//! live attributes is only defined for [`Materialised`] groups, which have
//! no description-time constructor. Dereferencing a group before the
//! runtime has created it is therefore a compile error, not a runtime
//! check.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::types::{Environment, RampUpPolicy, ServiceName, StageName};

/// Marker trait for resource states.
pub trait ResourceState: private::Sealed + Send + Sync {
    /// Get the state name for diagnostics.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// The resource is known only by its conventional name and location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Referenced;

/// The resource exists in the target account.
///
/// Only the release runtime materialises deployment groups; there is no
/// constructor for this state at description time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Materialised;

impl private::Sealed for Referenced {}
impl private::Sealed for Materialised {}

impl ResourceState for Referenced {
    fn name() -> &'static str {
        "referenced"
    }
}

impl ResourceState for Materialised {
    fn name() -> &'static str {
        "materialised"
    }
}

/// A deployment group in the release runtime, parameterised by resource
/// state.
///
/// Equality is structural: resolving the same inputs twice yields an
/// identical reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentGroup<S: ResourceState> {
    attributes: DeploymentGroupAttributes,
    _state: PhantomData<S>,
}

/// The naming-convention attributes of a deployment group.
///
/// These must agree bit-exactly with the names the release runtime uses
/// when it creates the group, or the mismatch surfaces as a
/// group-not-found failure at release-execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentGroupAttributes {
    /// Application identifier in the release runtime.
    pub application_name: ServiceName,
    /// ARN of the application, composed by convention.
    pub application_arn: String,
    /// Deployment-group identifier in the release runtime.
    pub group_name: ServiceName,
    /// Ramp-up policy the group releases with.
    pub ramp_policy: RampUpPolicy,
    /// Environment the group lives in.
    pub environment: Environment,
    /// Stage the group belongs to.
    pub stage: StageName,
}

/// A deployment group known only by convention.
pub type DeploymentGroupRef = DeploymentGroup<Referenced>;

impl DeploymentGroup<Referenced> {
    /// Resolve a reference to the deployment group for one stage.
    ///
    /// Both the application identifier and the group identifier are the
    /// service name. Nothing is fetched or validated; a naming mismatch is
    /// undetectable until the runtime executes a release into the target
    /// environment.
    #[must_use]
    pub fn resolve(
        env: &Environment,
        service_name: &ServiceName,
        ramp_policy: &RampUpPolicy,
        stage: &StageName,
    ) -> Self {
        let application_arn = format!(
            "arn:aws:codedeploy:{}:{}:application:{}",
            env.region, env.account, service_name
        );

        Self {
            attributes: DeploymentGroupAttributes {
                application_name: service_name.clone(),
                application_arn,
                group_name: service_name.clone(),
                ramp_policy: ramp_policy.clone(),
                environment: env.clone(),
                stage: stage.clone(),
            },
            _state: PhantomData,
        }
    }

    /// The conventional attributes this reference was composed from.
    #[must_use]
    pub const fn attributes(&self) -> &DeploymentGroupAttributes {
        &self.attributes
    }
}

impl DeploymentGroup<Materialised> {
    /// Live attributes of the materialised group.
    #[must_use]
    pub const fn live_attributes(&self) -> &DeploymentGroupAttributes {
        &self.attributes
    }
}

impl<S: ResourceState> DeploymentGroup<S> {
    /// The resource-state name, for diagnostics.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_env() -> Environment {
        Environment::new("742584497250", "us-east-2")
    }

    #[test]
    fn resolve_is_idempotent() {
        let env = test_env();
        let service = ServiceName::new("DemoService-UAT");
        let policy = RampUpPolicy::CANARY_10_PERCENT_5_MINUTES;
        let stage = StageName::new("UAT");

        let first = DeploymentGroup::resolve(&env, &service, &policy, &stage);
        let second = DeploymentGroup::resolve(&env, &service, &policy, &stage);
        assert_eq!(first, second);
    }

    #[test]
    fn names_follow_the_service_name() {
        let group = DeploymentGroup::resolve(
            &test_env(),
            &ServiceName::new("DemoService-UAT"),
            &RampUpPolicy::AllAtOnce,
            &StageName::new("UAT"),
        );

        let attrs = group.attributes();
        assert_eq!(attrs.application_name.as_str(), "DemoService-UAT");
        assert_eq!(attrs.group_name.as_str(), "DemoService-UAT");
        assert_eq!(
            attrs.application_arn,
            "arn:aws:codedeploy:us-east-2:742584497250:application:DemoService-UAT"
        );
    }

    #[test]
    fn reference_state_is_visible() {
        let group = DeploymentGroup::resolve(
            &test_env(),
            &ServiceName::new("DemoService-UAT"),
            &RampUpPolicy::AllAtOnce,
            &StageName::new("UAT"),
        );
        assert_eq!(group.state_name(), "referenced");
    }
}
