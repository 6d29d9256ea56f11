//! Pipeline description and the two-phase build.
//!
//! The builder accumulates stage descriptions and builds in two phases:
//! phase one composes every stage in insertion order (stage order is
//! release order) and collects the environments of cross-account stages;
//! phase two runs at most once, only after composition has finished for
//! *all* stages, and extends the self-update identity with the collected
//! cross-account trust. Finalising earlier would lock the identity's
//! permissions in before they are computed; granting per stage would apply
//! them redundantly and out of order.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compose::{ComposedStage, StageComposer};
use crate::config::{PipelineConfig, ServiceConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::graph::{StepGraph, StepId};
use crate::grants::{grant_cross_account_update, CrossAccountGrant, ExecutionIdentity, PolicyStatement};
use crate::release::ServiceRelease;
use crate::steps::{ConfigureStep, Consumed, DeployStep, DeploymentAction, FileSet};
use crate::types::{Environment, PipelineId, RampUpPolicy, ServiceName, StageName, StageSpec};

/// Identifier of the synth step, the root of the step graph.
const SYNTH_STEP_ID: &str = "synth";

/// Directory the synth step writes the packaged output into.
const PACKAGED_OUTPUT_DIR: &str = "assembly";

/// How the source repository triggers the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTrigger {
    /// No automatic trigger.
    None,
    /// Poll the repository for changes.
    #[default]
    Poll,
    /// React to repository events.
    Events,
}

/// The source repository the pipeline watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Repository identifier.
    pub repository: String,
    /// Branch that triggers the pipeline.
    pub branch: String,
    /// Trigger mode.
    pub trigger: SourceTrigger,
}

/// The build-and-synthesise step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthSpec {
    /// Commands run before the build.
    pub install_commands: Vec<String>,
    /// Commands that package the service and synthesise the description.
    pub commands: Vec<String>,
}

/// Complete description of a pipeline before it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Application name, the prefix of every derived resource name.
    pub application: String,
    /// Account and region the pipeline itself lives in.
    pub environment: Environment,
    /// Source repository.
    pub source: SourceSpec,
    /// Build-and-synthesise step.
    pub synth: SynthSpec,
    /// Whether the pipeline keeps its own description up to date.
    pub self_update: bool,
    /// Publish packaged assets one at a time.
    pub publish_assets_in_parallel: bool,
    /// The self-update step may build container images.
    pub docker_enabled_for_self_update: bool,
    /// Encrypt artifacts so other accounts can read them.
    pub cross_account_keys: bool,
    /// Stage descriptions, in release order.
    pub stages: Vec<StageSpec>,
}

/// One stage of a finalised pipeline.
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// Stage name.
    pub name: StageName,
    /// Target environment.
    pub environment: Environment,
    /// Ramp-up policy.
    pub ramp_policy: RampUpPolicy,
    /// Derived service stack name.
    pub service_name: ServiceName,
    /// The service stack description.
    pub release: ServiceRelease,
    /// The configure step.
    pub configure: ConfigureStep,
    /// The deploy step, with its run-order unit accounted.
    pub deploy: DeployStep<Consumed>,
    /// The deployment action emitted for this stage.
    pub action: DeploymentAction,
}

/// A finalised pipeline description.
///
/// Produced by [`PipelineBuilder::build`]; immutable afterwards. Execution
/// belongs to the external orchestration runtime: stages execute in the
/// order they appear here, and within a stage the configure step strictly
/// precedes the deploy step.
#[derive(Debug, Clone)]
pub struct Pipeline {
    spec: PipelineSpec,
    stages: Vec<StageRecord>,
    graph: StepGraph,
    execution_order: Vec<StepId>,
    self_update_identity: ExecutionIdentity,
    grants: Vec<CrossAccountGrant>,
    run_orders_consumed: u32,
}

impl Pipeline {
    /// The description this pipeline was built from.
    #[must_use]
    pub const fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    /// Pipeline identifier.
    #[must_use]
    pub const fn id(&self) -> &PipelineId {
        &self.spec.id
    }

    /// Finalised stages, in release order.
    #[must_use]
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Stage names, in release order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&StageName> {
        self.stages.iter().map(|stage| &stage.name).collect()
    }

    /// The step graph the build validated.
    #[must_use]
    pub const fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// The validated execution order of all steps.
    #[must_use]
    pub fn execution_order(&self) -> &[StepId] {
        &self.execution_order
    }

    /// The pipeline's self-update execution identity.
    #[must_use]
    pub const fn self_update_identity(&self) -> &ExecutionIdentity {
        &self.self_update_identity
    }

    /// Cross-account grants applied during the build.
    #[must_use]
    pub fn grants(&self) -> &[CrossAccountGrant] {
        &self.grants
    }

    /// Run-order units consumed by deploy steps.
    #[must_use]
    pub const fn run_orders_consumed(&self) -> u32 {
        self.run_orders_consumed
    }

    /// Render the pipeline as a serialisable manifest.
    #[must_use]
    pub fn manifest(&self) -> PipelineManifest {
        PipelineManifest {
            id: self.spec.id.clone(),
            application: self.spec.application.clone(),
            environment: self.spec.environment.clone(),
            source: self.spec.source.clone(),
            synth: self.spec.synth.clone(),
            self_update: self.spec.self_update,
            stages: self
                .stages
                .iter()
                .map(|stage| StageManifest {
                    name: stage.name.clone(),
                    environment: stage.environment.clone(),
                    deployment_config: stage.ramp_policy.deployment_config_name(),
                    service_name: stage.service_name.clone(),
                    release: stage.release.clone(),
                    post_deployment: vec![
                        stage.configure.id().clone(),
                        stage.deploy.id().clone(),
                    ],
                    action: stage.action.clone(),
                })
                .collect(),
            execution_order: self.execution_order.clone(),
            self_update_statements: self.self_update_identity.statements().to_vec(),
            grants: self.grants.clone(),
        }
    }
}

/// Serialisable projection of a finalised pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Application name.
    pub application: String,
    /// Pipeline environment.
    pub environment: Environment,
    /// Source repository.
    pub source: SourceSpec,
    /// Build-and-synthesise step.
    pub synth: SynthSpec,
    /// Whether self-update is enabled.
    pub self_update: bool,
    /// Stages in release order.
    pub stages: Vec<StageManifest>,
    /// Validated step execution order.
    pub execution_order: Vec<StepId>,
    /// Statements on the self-update identity.
    pub self_update_statements: Vec<PolicyStatement>,
    /// Cross-account grants applied.
    pub grants: Vec<CrossAccountGrant>,
}

/// Serialisable projection of one finalised stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest {
    /// Stage name.
    pub name: StageName,
    /// Target environment.
    pub environment: Environment,
    /// Deployment-configuration name of the ramp-up policy.
    pub deployment_config: String,
    /// Service stack name.
    pub service_name: ServiceName,
    /// The service stack description.
    pub release: ServiceRelease,
    /// Post-deployment steps in execution order.
    pub post_deployment: Vec<StepId>,
    /// The deployment action.
    pub action: DeploymentAction,
}

/// Fluent accumulator for pipeline descriptions.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    id: Option<PipelineId>,
    application: String,
    environment: Environment,
    repository: Option<String>,
    branch: String,
    trigger: SourceTrigger,
    install_commands: Vec<String>,
    synth_commands: Vec<String>,
    self_update: bool,
    service_config: ServiceConfig,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Start describing a pipeline for an application in its home
    /// environment.
    #[must_use]
    pub fn new(application: impl Into<String>, environment: Environment) -> Self {
        let config = PipelineConfig::default();
        Self {
            id: None,
            application: application.into(),
            environment,
            repository: config.source.repository,
            branch: config.source.branch,
            trigger: SourceTrigger::default(),
            install_commands: config.synth.install_commands,
            synth_commands: config.synth.commands,
            self_update: true,
            service_config: config.service,
            stages: Vec::new(),
        }
    }

    /// Start describing a pipeline from loaded configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, environment: Environment) -> Self {
        let mut builder = Self::new(config.application.name.clone(), environment);
        builder.repository = config.source.repository.clone();
        builder.branch = config.source.branch.clone();
        builder.install_commands = config.synth.install_commands.clone();
        builder.synth_commands = config.synth.commands.clone();
        builder.service_config = config.service.clone();
        builder
    }

    /// Set the pipeline identifier. Generated when not supplied.
    #[must_use]
    pub fn pipeline_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(PipelineId::new(id));
        self
    }

    /// Set the source repository and branch.
    #[must_use]
    pub fn source(mut self, repository: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self.branch = branch.into();
        self
    }

    /// Set the source trigger mode.
    #[must_use]
    pub const fn trigger(mut self, trigger: SourceTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Set the commands run before the build.
    #[must_use]
    pub fn install_commands(mut self, commands: Vec<String>) -> Self {
        self.install_commands = commands;
        self
    }

    /// Set the package-and-synthesise commands.
    #[must_use]
    pub fn synth_commands(mut self, commands: Vec<String>) -> Self {
        self.synth_commands = commands;
        self
    }

    /// Enable or disable self-update.
    ///
    /// Disabling self-update also disables cross-account trust grants:
    /// there is no self-update identity to extend. A pipeline with
    /// cross-account stages and self-update disabled will fail to update
    /// cross-account support resources at execution time; the build warns
    /// but does not refuse.
    #[must_use]
    pub const fn self_update(mut self, enabled: bool) -> Self {
        self.self_update = enabled;
        self
    }

    /// Override the per-stage service stack settings.
    #[must_use]
    pub fn service_config(mut self, config: ServiceConfig) -> Self {
        self.service_config = config;
        self
    }

    /// Append a stage. Stage order is release order.
    #[must_use]
    pub fn add_stage(
        mut self,
        name: impl Into<String>,
        ramp_policy: RampUpPolicy,
        environment: Environment,
    ) -> Self {
        self.stages
            .push(StageSpec::new(name, ramp_policy, environment));
        self
    }

    /// Append an already-constructed stage description.
    #[must_use]
    pub fn add_stage_spec(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Build the pipeline.
    ///
    /// Phase one composes every stage in insertion order. Phase two, only
    /// when self-update is enabled and at least one stage is
    /// cross-account, extends the self-update identity exactly once, with
    /// the complete cross-account set.
    pub fn build(self) -> PipelineResult<Pipeline> {
        if !self.environment.is_complete() {
            return Err(PipelineError::config(
                "pipeline environment needs both account and region",
            ));
        }
        if self.application.trim().is_empty() {
            return Err(PipelineError::config("application name is blank"));
        }

        // The repository defaults to the application name, the convention
        // the source account provisions repositories under.
        let repository = self
            .repository
            .unwrap_or_else(|| self.application.clone());

        let spec = PipelineSpec {
            id: self.id.unwrap_or_else(PipelineId::generate),
            application: self.application,
            environment: self.environment,
            source: SourceSpec {
                repository,
                branch: self.branch,
                trigger: self.trigger,
            },
            synth: SynthSpec {
                install_commands: self.install_commands,
                commands: self.synth_commands,
            },
            self_update: self.self_update,
            publish_assets_in_parallel: false,
            docker_enabled_for_self_update: true,
            cross_account_keys: true,
            stages: self.stages,
        };

        build_pipeline(spec, self.service_config)
    }
}

/// Phase one: compose every stage, collecting cross-account environments.
fn compose_stages(
    spec: &PipelineSpec,
    service_config: &ServiceConfig,
) -> PipelineResult<(Vec<ComposedStage>, StepGraph, Vec<(StageName, Environment)>)> {
    let packaged_output = FileSet::new(StepId::new(SYNTH_STEP_ID), PACKAGED_OUTPUT_DIR);
    let mut composer = StageComposer::new(
        spec.application.clone(),
        spec.id.clone(),
        packaged_output,
        service_config.clone(),
    )?;

    let mut cross_account = Vec::new();
    for stage in &spec.stages {
        composer.add_stage(stage)?;
        if stage.environment.account != spec.environment.account {
            cross_account.push((stage.name.clone(), stage.environment.clone()));
        }
    }

    let (stages, graph) = composer.into_parts();
    Ok((stages, graph, cross_account))
}

/// Assemble the execution graph and apply cross-account grants.
fn build_pipeline(spec: PipelineSpec, service_config: ServiceConfig) -> PipelineResult<Pipeline> {
    let (composed, graph, cross_account) = compose_stages(&spec, &service_config)?;

    // The internal structure is final from here on: validate the graph and
    // let every deploy step emit its action and account its run order.
    let execution_order = graph.execution_order()?;

    let mut stages = Vec::with_capacity(composed.len());
    let mut run_orders_consumed = 0;
    for stage in composed {
        let ComposedStage {
            spec: stage_spec,
            service_name,
            release,
            configure,
            deploy,
        } = stage;

        // Within a stage the configure step holds run order one.
        let (produced, result) = deploy.produce(2);
        run_orders_consumed += result.run_orders_consumed;

        stages.push(StageRecord {
            name: stage_spec.name,
            environment: stage_spec.environment,
            ramp_policy: stage_spec.ramp_policy,
            service_name,
            release,
            configure,
            deploy: produced.mark_consumed(),
            action: result.action,
        });
    }

    let mut identity = ExecutionIdentity::new(format!("{}-self-update", spec.id));

    let grants = if cross_account.is_empty() {
        Vec::new()
    } else if spec.self_update {
        grant_cross_account_update(&mut identity, &cross_account)
    } else {
        let affected: Vec<&str> = cross_account
            .iter()
            .map(|(stage, _)| stage.as_str())
            .collect();
        warn!(
            stages = ?affected,
            "self-update disabled: cross-account stages get no trust grants \
             and their support resources cannot be updated by this pipeline"
        );
        Vec::new()
    };

    info!(
        pipeline_id = %spec.id,
        stages = stages.len(),
        grants = grants.len(),
        "pipeline description finalised"
    );

    Ok(Pipeline {
        spec,
        stages,
        graph,
        execution_order,
        self_update_identity: identity,
        grants,
        run_orders_consumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_ACCOUNT: &str = "742584497250";

    fn home() -> Environment {
        Environment::new(PIPELINE_ACCOUNT, "us-east-1")
    }

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new("Demo", home()).pipeline_id("demo-toolchain")
    }

    #[test]
    fn stage_order_is_insertion_order() {
        let pipeline = builder()
            .add_stage(
                "Alpha",
                RampUpPolicy::AllAtOnce,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .add_stage(
                "Beta",
                RampUpPolicy::AllAtOnce,
                Environment::new(PIPELINE_ACCOUNT, "us-west-2"),
            )
            .add_stage(
                "Gamma",
                RampUpPolicy::AllAtOnce,
                Environment::new(PIPELINE_ACCOUNT, "eu-west-1"),
            )
            .build()
            .unwrap();

        let names: Vec<&str> = pipeline
            .stage_names()
            .iter()
            .map(|name| name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn synth_precedes_every_stage_step() {
        let pipeline = builder()
            .add_stage(
                "UAT",
                RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .build()
            .unwrap();

        let order = pipeline.execution_order();
        assert_eq!(order[0].as_str(), "synth");

        let configure = order
            .iter()
            .position(|step| step.as_str() == "configure-bluegreen-uat")
            .unwrap();
        let deploy = order
            .iter()
            .position(|step| step.as_str() == "codedeploy-uat")
            .unwrap();
        assert!(configure < deploy);
    }

    #[test]
    fn same_account_stages_produce_no_grants() {
        let pipeline = builder()
            .add_stage(
                "UAT",
                RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .build()
            .unwrap();

        assert!(pipeline.grants().is_empty());
        assert!(pipeline.self_update_identity().statements().is_empty());
    }

    #[test]
    fn cross_account_stage_produces_exactly_one_grant() {
        let pipeline = builder()
            .add_stage(
                "UAT",
                RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .add_stage(
                "PROD",
                RampUpPolicy::LINEAR_10_PERCENT_EVERY_1_MINUTE,
                Environment::new("111111111111", "us-east-1"),
            )
            .build()
            .unwrap();

        assert_eq!(pipeline.grants().len(), 1);
        assert_eq!(pipeline.grants()[0].stage.as_str(), "PROD");
        assert_eq!(pipeline.self_update_identity().statements().len(), 1);
    }

    #[test]
    fn disabling_self_update_skips_grants() {
        let pipeline = builder()
            .self_update(false)
            .add_stage(
                "PROD",
                RampUpPolicy::AllAtOnce,
                Environment::new("111111111111", "us-east-1"),
            )
            .build()
            .unwrap();

        assert!(pipeline.grants().is_empty());
        assert!(pipeline.self_update_identity().statements().is_empty());
    }

    #[test]
    fn each_deploy_step_consumes_one_run_order() {
        let pipeline = builder()
            .add_stage(
                "UAT",
                RampUpPolicy::AllAtOnce,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .add_stage(
                "PROD",
                RampUpPolicy::AllAtOnce,
                Environment::new(PIPELINE_ACCOUNT, "us-west-2"),
            )
            .build()
            .unwrap();

        assert_eq!(pipeline.run_orders_consumed(), 2);
        for stage in pipeline.stages() {
            assert_eq!(stage.action.run_order, 2);
            assert_eq!(stage.deploy.state_name(), "consumed");
        }
    }

    #[test]
    fn blank_pipeline_environment_rejected() {
        let err = PipelineBuilder::new("Demo", Environment::new("", "us-east-1"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn generated_id_when_not_supplied() {
        let pipeline = PipelineBuilder::new("Demo", home()).build().unwrap();
        assert!(!pipeline.id().as_str().is_empty());
    }

    #[test]
    fn manifest_serialises() {
        let pipeline = builder()
            .add_stage(
                "UAT",
                RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
                Environment::new(PIPELINE_ACCOUNT, "us-east-2"),
            )
            .build()
            .unwrap();

        let json = serde_json::to_string_pretty(&pipeline.manifest()).unwrap();
        assert!(json.contains("\"deployment-UAT\""));
        assert!(json.contains("IMAGE1_NAME"));

        let parsed: PipelineManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pipeline.manifest());
    }
}
