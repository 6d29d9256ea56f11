//! Stage composition.
//!
//! The composer turns one [`StageSpec`] into everything the pipeline needs
//! for that stage: the service stack description, the configure step, the
//! deployment-group reference and the deploy step, wired into the step
//! graph in the only valid order. Configuration errors (duplicate stage
//! name, unusable environment) are raised here, before any resource is
//! described.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::codedeploy::DeploymentGroup;
use crate::config::ServiceConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::{StepGraph, StepId};
use crate::release::ServiceRelease;
use crate::steps::{
    ConfigureParameters, ConfigureStep, Created, DeployStep, DeployStepBuilder, FileSet,
};
use crate::types::{PipelineId, ServiceName, StageName, StageSpec};

/// One fully composed stage.
#[derive(Debug, Clone)]
pub struct ComposedStage {
    /// The stage description this was composed from.
    pub spec: StageSpec,
    /// Derived service stack name.
    pub service_name: ServiceName,
    /// The service stack instantiated in the stage's scope.
    pub release: ServiceRelease,
    /// First post-deployment step: derive the deployment configuration.
    pub configure: ConfigureStep,
    /// Second post-deployment step: hand off to the release runtime.
    pub deploy: DeployStep<Created>,
}

impl ComposedStage {
    /// The post-deployment steps in execution order.
    #[must_use]
    pub fn post_deployment_order(&self) -> [&StepId; 2] {
        [self.configure.id(), self.deploy.id()]
    }
}

/// Composes stages into a pipeline under construction.
#[derive(Debug)]
pub struct StageComposer {
    application: String,
    pipeline_id: PipelineId,
    packaged_output: FileSet,
    service_config: ServiceConfig,
    registered: HashSet<StageName>,
    graph: StepGraph,
    stages: Vec<ComposedStage>,
}

impl StageComposer {
    /// Start composing stages.
    ///
    /// `packaged_output` is the pipeline's packaged-output file set; its
    /// producer is registered as the root of the step graph so every
    /// configure step can depend on it.
    pub fn new(
        application: impl Into<String>,
        pipeline_id: PipelineId,
        packaged_output: FileSet,
        service_config: ServiceConfig,
    ) -> PipelineResult<Self> {
        let mut graph = StepGraph::new();
        graph.add_step(packaged_output.producer.clone())?;

        Ok(Self {
            application: application.into(),
            pipeline_id,
            packaged_output,
            service_config,
            registered: HashSet::new(),
            graph,
            stages: Vec::new(),
        })
    }

    /// Compose one stage and append it to the pipeline's stage sequence.
    ///
    /// Stage order is release order; callers add stages in the order they
    /// release.
    pub fn add_stage(&mut self, spec: &StageSpec) -> PipelineResult<ComposedStage> {
        if self.registered.contains(&spec.name) {
            return Err(PipelineError::duplicate_stage(spec.name.as_str()));
        }
        if spec.environment.account.as_str().trim().is_empty() {
            return Err(PipelineError::MissingEnvironment {
                stage: spec.name.to_string(),
                reason: "account is blank",
            });
        }
        if spec.environment.region.as_str().trim().is_empty() {
            return Err(PipelineError::MissingEnvironment {
                stage: spec.name.to_string(),
                reason: "region is blank",
            });
        }

        let service_name = ServiceName::for_stage(&self.application, &spec.name);
        debug!(
            stage = %spec.name,
            service = %service_name,
            environment = %spec.environment,
            "composing stage"
        );

        let release = ServiceRelease::describe(
            service_name.clone(),
            spec.name.clone(),
            spec.ramp_policy.clone(),
            &self.service_config,
        );

        let configure = ConfigureStep::new(
            self.packaged_output.clone(),
            ConfigureParameters {
                account: spec.environment.account.clone(),
                region: spec.environment.region.clone(),
                application: self.application.clone(),
                stage: spec.name.clone(),
                pipeline_id: self.pipeline_id.clone(),
                service_name: service_name.clone(),
            },
        );
        self.graph.add_step(configure.id().clone())?;
        self.graph
            .must_complete_before(configure.id(), &self.packaged_output.producer)?;

        let group = DeploymentGroup::resolve(
            &spec.environment,
            &service_name,
            &spec.ramp_policy,
            &spec.name,
        );

        let deploy = DeployStepBuilder::new(configure.primary_output(), group, spec.name.clone())
            .depends_on(configure.id())
            .build()?;
        self.graph.add_step(deploy.id().clone())?;
        self.graph.must_complete_before(deploy.id(), configure.id())?;

        info!(
            stage = %spec.name,
            service = %service_name,
            "stage composed"
        );

        self.registered.insert(spec.name.clone());
        let composed = ComposedStage {
            spec: spec.clone(),
            service_name,
            release,
            configure,
            deploy,
        };
        self.stages.push(composed.clone());

        Ok(composed)
    }

    /// Finish composing: the stages in insertion order and the step graph.
    #[must_use]
    pub fn into_parts(self) -> (Vec<ComposedStage>, StepGraph) {
        (self.stages, self.graph)
    }
}
