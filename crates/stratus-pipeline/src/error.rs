//! Error types for stratus-pipeline.

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while describing a pipeline.
///
/// Everything here is a description-time failure. Late-bound problems, such
/// as a deployment group whose conventional name does not match what the
/// release runtime created, are undetectable until a release executes and
/// surface in the target environment, not as a variant of this enum.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage name was added to the same pipeline twice.
    #[error("duplicate stage name: {stage}")]
    DuplicateStage {
        /// The offending stage name.
        stage: String,
    },

    /// A stage was declared without a usable target environment.
    #[error("stage {stage} has no target environment: {reason}")]
    MissingEnvironment {
        /// The stage lacking an environment.
        stage: String,
        /// What was missing.
        reason: &'static str,
    },

    /// A deploy step was produced without its configure-step prerequisite.
    #[error("deploy step {step} has no configure-step dependency")]
    MissingDependency {
        /// The unlinked deploy step.
        step: String,
    },

    /// A dependency edge referenced a step that is not in the graph.
    #[error("unknown step in dependency edge: {step}")]
    UnknownStep {
        /// The missing step identifier.
        step: String,
    },

    /// The step graph contains a cycle.
    #[error("step dependency cycle involving {step}")]
    DependencyCycle {
        /// A step on the cycle.
        step: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Create a duplicate-stage error.
    #[must_use]
    pub fn duplicate_stage(stage: impl Into<String>) -> Self {
        Self::DuplicateStage {
            stage: stage.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
