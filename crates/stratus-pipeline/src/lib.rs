//! Stratus Pipeline
//!
//! This crate describes continuous-delivery pipelines that release a
//! containerised service across one or more target environments with a
//! blue/green traffic shift, including environments in accounts other than
//! the pipeline's own.
//!
//! # Architecture
//!
//! Describing a pipeline is synchronous, single-threaded graph
//! construction:
//!
//! - **Stage composition**: each stage description yields a service stack
//!   (with its blue and green target pairs), a configure step and a deploy
//!   step, wired into an explicit dependency graph
//! - **Late-bound resolution**: the deployment group a stage releases
//!   through is created by the release runtime on first execution, so it is
//!   referenced purely by naming convention
//! - **Two-phase build**: every stage is composed before cross-account
//!   trust is computed and appended, exactly once, to the pipeline's
//!   self-update execution identity
//!
//! Execution of the described pipeline belongs to an external orchestration
//! runtime and is modelled only at its contract boundary.
//!
//! # Deploy-step lifecycle
//!
//! Deploy steps follow a strict lifecycle enforced at compile time using
//! the typestate pattern:
//!
//! ```text
//! Created ──▶ Produced ──▶ Consumed
//! ```
//!
//! A deploy step cannot be created without its configure-step dependency,
//! and a deployment group cannot be dereferenced before the runtime has
//! materialised it. Both are compile errors, not runtime checks.
//!
//! # Example
//!
//! ```ignore
//! use stratus_pipeline::{Environment, PipelineBuilder, RampUpPolicy};
//!
//! let pipeline = PipelineBuilder::new("Demo", Environment::new("742584497250", "us-east-1"))
//!     .source("demo-service", "main")
//!     .add_stage(
//!         "UAT",
//!         RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
//!         Environment::new("742584497250", "us-east-2"),
//!     )
//!     .build()?;
//!
//! assert_eq!(pipeline.stage_names().len(), 1);
//! # Ok::<(), stratus_pipeline::PipelineError>(())
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod codedeploy;
pub mod compose;
pub mod config;
pub mod error;
pub mod graph;
pub mod grants;
pub mod pipeline;
pub mod release;
pub mod steps;
pub mod types;

// Re-export commonly used types at the crate root
pub use codedeploy::{DeploymentGroup, DeploymentGroupAttributes, DeploymentGroupRef, Referenced};
pub use compose::{ComposedStage, StageComposer};
pub use config::{PipelineConfig, ServiceConfig};
pub use error::{PipelineError, PipelineResult};
pub use graph::{StepGraph, StepId};
pub use grants::{CrossAccountGrant, ExecutionIdentity, PolicyStatement};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineManifest, PipelineSpec, SourceSpec, SourceTrigger,
    StageRecord, SynthSpec,
};
pub use release::{
    BlueGreenTopology, DeploymentController, ReleaseConfiguration, ServiceRelease, TargetPair,
};
pub use steps::{ConfigureStep, DeployStep, DeployStepBuilder, DeploymentAction, FileSet};
pub use types::{
    AccountId, Environment, PipelineId, RampUpPolicy, Region, ServiceName, StageName, StageSpec,
};
