//! The deploy step and the action it emits.
//!
//! A deploy step moves through a strict lifecycle encoded in the type
//! system:
//!
//! ```text
//! Created ──▶ Produced ──▶ Consumed
//! ```
//!
//! `Created` is only reachable through [`DeployStepBuilder`], which
//! requires the configure-step dependency up front: an unlinked deploy
//! step cannot be built, so the dependency-ordering error is prevented
//! structurally rather than detected later. Producing the deployment
//! action moves the step to `Produced`; accounting its run-order unit when
//! the pipeline assembles the execution graph moves it to `Consumed`.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::codedeploy::{DeploymentGroupAttributes, DeploymentGroupRef};
use crate::error::{PipelineError, PipelineResult};
use crate::graph::StepId;
use crate::steps::FileSet;
use crate::types::StageName;

/// Placeholder token in the task-definition template that the release
/// runtime substitutes with the container image reference.
pub const CONTAINER_IMAGE_PLACEHOLDER: &str = "IMAGE1_NAME";

/// Per-stage namespace the deploy action publishes its values under.
///
/// Consumers reading cross-stage outputs must use this prefix; it keeps
/// values from colliding across stages sharing one pipeline.
#[must_use]
pub fn variables_namespace(stage: &StageName) -> String {
    format!("deployment-{stage}")
}

/// Conventional identifier of the deploy step for a stage.
#[must_use]
pub fn deploy_step_id(stage: &StageName) -> StepId {
    StepId::new(format!("codedeploy-{}", stage.as_str().to_lowercase()))
}

/// Marker trait for deploy-step lifecycle states.
pub trait StepState: private::Sealed + Send + Sync {
    /// Get the state name for diagnostics.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// Step built and linked, action not yet emitted.
#[derive(Debug, Clone, Copy)]
pub struct Created;

/// Deployment action emitted.
#[derive(Debug, Clone, Copy)]
pub struct Produced;

/// Run-order unit accounted by the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Consumed;

impl private::Sealed for Created {}
impl private::Sealed for Produced {}
impl private::Sealed for Consumed {}

impl StepState for Created {
    fn name() -> &'static str {
        "created"
    }
}

impl StepState for Produced {
    fn name() -> &'static str {
        "produced"
    }
}

impl StepState for Consumed {
    fn name() -> &'static str {
        "consumed"
    }
}

/// The container-image substitution input of a deployment action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImageInput {
    /// Artifact carrying the image reference.
    pub input: FileSet,
    /// Placeholder token to substitute.
    pub placeholder: String,
}

/// The deployment action a deploy step emits into the execution graph.
///
/// One action per stage. The configure step's sole output artifact is used
/// identically as the app-specification input and the task-definition
/// template input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAction {
    /// Action name within the stage.
    pub action_name: String,
    /// App-specification template input.
    pub app_spec_template_input: FileSet,
    /// Task-definition template input.
    pub task_definition_template_input: FileSet,
    /// Container-image substitution.
    pub container_image_input: ContainerImageInput,
    /// The deployment group executing the release.
    pub deployment_group: DeploymentGroupAttributes,
    /// Namespace the action's values are published under.
    pub variables_namespace: String,
    /// Position in the stage's run order.
    pub run_order: u32,
}

/// Result of producing a deploy step's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedAction {
    /// The emitted action.
    pub action: DeploymentAction,
    /// Run-order units consumed from the pipeline's budget. Always one.
    pub run_orders_consumed: u32,
}

/// Factory for deploy steps.
///
/// The configure-step dependency must be established before [`build`]
/// is invoked; building without it fails with a dependency-ordering error.
///
/// [`build`]: DeployStepBuilder::build
#[derive(Debug, Clone)]
pub struct DeployStepBuilder {
    input: FileSet,
    deployment_group: DeploymentGroupRef,
    stage: StageName,
    dependency: Option<StepId>,
}

impl DeployStepBuilder {
    /// Start describing the deploy step for one stage.
    ///
    /// `input` is the configure step's sole output artifact.
    #[must_use]
    pub fn new(input: FileSet, deployment_group: DeploymentGroupRef, stage: StageName) -> Self {
        Self {
            input,
            deployment_group,
            stage,
            dependency: None,
        }
    }

    /// Establish the dependency on the configure step.
    #[must_use]
    pub fn depends_on(mut self, configure_step: &StepId) -> Self {
        self.dependency = Some(configure_step.clone());
        self
    }

    /// Build the deploy step.
    ///
    /// Fails with [`PipelineError::MissingDependency`] when no configure
    /// step dependency has been established.
    pub fn build(self) -> PipelineResult<DeployStep<Created>> {
        let id = deploy_step_id(&self.stage);
        let Some(dependency) = self.dependency else {
            return Err(PipelineError::MissingDependency {
                step: id.to_string(),
            });
        };

        Ok(DeployStep {
            id,
            input: self.input,
            deployment_group: self.deployment_group,
            stage: self.stage,
            dependency,
            _state: PhantomData,
        })
    }
}

/// A deploy step in a specific lifecycle state.
#[derive(Debug, Clone)]
pub struct DeployStep<S: StepState = Created> {
    id: StepId,
    input: FileSet,
    deployment_group: DeploymentGroupRef,
    stage: StageName,
    dependency: StepId,
    _state: PhantomData<S>,
}

impl<S: StepState> DeployStep<S> {
    /// Step identifier.
    #[must_use]
    pub const fn id(&self) -> &StepId {
        &self.id
    }

    /// The configure step this deploy step depends on.
    #[must_use]
    pub const fn dependency(&self) -> &StepId {
        &self.dependency
    }

    /// Stage the step belongs to.
    #[must_use]
    pub const fn stage(&self) -> &StageName {
        &self.stage
    }

    /// The lifecycle-state name, for diagnostics.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::name()
    }

    fn transition<T: StepState>(self) -> DeployStep<T> {
        DeployStep {
            id: self.id,
            input: self.input,
            deployment_group: self.deployment_group,
            stage: self.stage,
            dependency: self.dependency,
            _state: PhantomData,
        }
    }
}

impl DeployStep<Created> {
    /// Emit the deployment action for this stage.
    ///
    /// The configure step's output artifact serves as both template
    /// inputs and carries the image reference for the placeholder
    /// substitution. Exactly one run-order unit is consumed.
    #[must_use]
    pub fn produce(self, run_order: u32) -> (DeployStep<Produced>, ProducedAction) {
        let action = DeploymentAction {
            action_name: "Deploy".to_owned(),
            app_spec_template_input: self.input.clone(),
            task_definition_template_input: self.input.clone(),
            container_image_input: ContainerImageInput {
                input: self.input.clone(),
                placeholder: CONTAINER_IMAGE_PLACEHOLDER.to_owned(),
            },
            deployment_group: self.deployment_group.attributes().clone(),
            variables_namespace: variables_namespace(&self.stage),
            run_order,
        };

        (
            self.transition(),
            ProducedAction {
                action,
                run_orders_consumed: 1,
            },
        )
    }
}

impl DeployStep<Produced> {
    /// Account the consumed run-order unit.
    #[must_use]
    pub fn mark_consumed(self) -> DeployStep<Consumed> {
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codedeploy::DeploymentGroup;
    use crate::types::{Environment, RampUpPolicy, ServiceName};

    fn test_group(stage: &StageName) -> DeploymentGroupRef {
        DeploymentGroup::resolve(
            &Environment::new("742584497250", "us-east-2"),
            &ServiceName::for_stage("Demo", stage),
            &RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
            stage,
        )
    }

    fn test_input() -> FileSet {
        FileSet::new(StepId::new("configure-bluegreen-uat"), "codedeploy")
    }

    #[test]
    fn build_without_dependency_fails() {
        let stage = StageName::new("UAT");
        let result = DeployStepBuilder::new(test_input(), test_group(&stage), stage).build();

        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency { ref step }
            if step == "codedeploy-uat"));
    }

    #[test]
    fn build_with_dependency_succeeds() {
        let stage = StageName::new("UAT");
        let configure = StepId::new("configure-bluegreen-uat");
        let step = DeployStepBuilder::new(test_input(), test_group(&stage), stage)
            .depends_on(&configure)
            .build()
            .unwrap();

        assert_eq!(step.id().as_str(), "codedeploy-uat");
        assert_eq!(step.dependency(), &configure);
        assert_eq!(step.state_name(), "created");
    }

    #[test]
    fn produced_action_uses_one_artifact_for_both_templates() {
        let stage = StageName::new("UAT");
        let configure = StepId::new("configure-bluegreen-uat");
        let step = DeployStepBuilder::new(test_input(), test_group(&stage), stage)
            .depends_on(&configure)
            .build()
            .unwrap();

        let (produced, result) = step.produce(2);
        assert_eq!(produced.state_name(), "produced");
        assert_eq!(result.run_orders_consumed, 1);

        let action = &result.action;
        assert_eq!(action.action_name, "Deploy");
        assert_eq!(
            action.app_spec_template_input,
            action.task_definition_template_input
        );
        assert_eq!(action.container_image_input.input, action.app_spec_template_input);
        assert_eq!(action.container_image_input.placeholder, "IMAGE1_NAME");
        assert_eq!(action.variables_namespace, "deployment-UAT");
        assert_eq!(action.run_order, 2);
    }

    #[test]
    fn lifecycle_reaches_consumed() {
        let stage = StageName::new("UAT");
        let configure = StepId::new("configure-bluegreen-uat");
        let step = DeployStepBuilder::new(test_input(), test_group(&stage), stage)
            .depends_on(&configure)
            .build()
            .unwrap();

        let (produced, _) = step.produce(2);
        let consumed = produced.mark_consumed();
        assert_eq!(consumed.state_name(), "consumed");
    }
}
