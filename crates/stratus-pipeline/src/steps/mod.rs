//! Post-deployment steps attached to each stage.
//!
//! Every stage carries an ordered pair of steps: a configure step that
//! derives the deployment configuration from the pipeline's packaged
//! output, and a deploy step that hands the result to the release runtime.
//! The deploy step never runs before its configure step; the edge is
//! recorded in the pipeline's step graph and enforced structurally by the
//! deploy-step factory.

mod configure;
mod deploy;

pub use configure::{
    ConfigureParameters, ConfigureStep, CONFIGURATION_OUTPUT_DIR, CONFIGURATION_SCRIPT,
};
pub use deploy::{
    deploy_step_id, variables_namespace, Consumed, ContainerImageInput, Created, DeployStep,
    DeployStepBuilder, DeploymentAction, Produced, ProducedAction, StepState,
    CONTAINER_IMAGE_PLACEHOLDER,
};

use serde::{Deserialize, Serialize};

use crate::graph::StepId;

/// A named set of files produced by one step and consumed by another.
///
/// This is a reference, not the files themselves: it names the producing
/// step and the directory the producer writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    /// Step that produces this file set.
    pub producer: StepId,
    /// Directory within the producer's workspace.
    pub directory: String,
}

impl FileSet {
    /// Create a file-set reference.
    #[must_use]
    pub fn new(producer: StepId, directory: impl Into<String>) -> Self {
        Self {
            producer,
            directory: directory.into(),
        }
    }
}
