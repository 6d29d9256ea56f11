//! The deployment-configuration step.

use serde::{Deserialize, Serialize};

use crate::graph::StepId;
use crate::steps::FileSet;
use crate::types::{AccountId, PipelineId, Region, ServiceName, StageName};

/// Directory the configuration script writes its output into.
///
/// The deploy step consumes this directory verbatim, so the name is part of
/// the contract with the configuration script.
pub const CONFIGURATION_OUTPUT_DIR: &str = "codedeploy";

/// Path of the configuration script inside the packaged output.
pub const CONFIGURATION_SCRIPT: &str = "./codedeploy/codedeploy_configuration.sh";

/// The six positional values the configuration script is invoked with.
///
/// Together with the packaged output these fully determine the step's
/// output, making the step reproducible from the stage and pipeline
/// descriptions alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureParameters {
    /// Target account.
    pub account: AccountId,
    /// Target region.
    pub region: Region,
    /// Application name.
    pub application: String,
    /// Stage name.
    pub stage: StageName,
    /// Pipeline identifier.
    pub pipeline_id: PipelineId,
    /// Service stack name.
    pub service_name: ServiceName,
}

impl ConfigureParameters {
    /// The positional argument list, in contract order.
    #[must_use]
    pub fn positional(&self) -> [String; 6] {
        [
            self.account.to_string(),
            self.region.to_string(),
            self.application.clone(),
            self.stage.to_string(),
            self.pipeline_id.to_string(),
            self.service_name.to_string(),
        ]
    }
}

/// Deterministic transformation step producing the deployment
/// configuration for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureStep {
    id: StepId,
    input: FileSet,
    output_directory: String,
    commands: Vec<String>,
    parameters: ConfigureParameters,
}

impl ConfigureStep {
    /// Describe the configure step for one stage.
    ///
    /// `input` is the pipeline's packaged-output file set. The command list
    /// is derived entirely from the parameters.
    #[must_use]
    pub fn new(input: FileSet, parameters: ConfigureParameters) -> Self {
        let id = StepId::new(format!(
            "configure-bluegreen-{}",
            parameters.stage.as_str().to_lowercase()
        ));
        let [account, region, application, stage, pipeline_id, service_name] =
            parameters.positional();
        let commands = vec![
            format!("chmod a+x {CONFIGURATION_SCRIPT}"),
            format!(
                "{CONFIGURATION_SCRIPT} {account} {region} {application} {stage} \
                 {pipeline_id} {service_name}"
            ),
        ];

        Self {
            id,
            input,
            output_directory: CONFIGURATION_OUTPUT_DIR.to_owned(),
            commands,
            parameters,
        }
    }

    /// Step identifier.
    #[must_use]
    pub const fn id(&self) -> &StepId {
        &self.id
    }

    /// The packaged-output file set this step consumes.
    #[must_use]
    pub const fn input(&self) -> &FileSet {
        &self.input
    }

    /// Commands the step runs.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// The parameters the step was derived from.
    #[must_use]
    pub const fn parameters(&self) -> &ConfigureParameters {
        &self.parameters
    }

    /// The step's sole output: the derived deployment-configuration
    /// directory.
    #[must_use]
    pub fn primary_output(&self) -> FileSet {
        FileSet::new(self.id.clone(), self.output_directory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_parameters() -> ConfigureParameters {
        ConfigureParameters {
            account: AccountId::new("742584497250"),
            region: Region::new("us-east-2"),
            application: "Demo".to_owned(),
            stage: StageName::new("UAT"),
            pipeline_id: PipelineId::new("demo-toolchain"),
            service_name: ServiceName::new("DemoService-UAT"),
        }
    }

    fn test_input() -> FileSet {
        FileSet::new(StepId::new("synth"), "assembly")
    }

    #[test]
    fn six_positional_arguments_in_contract_order() {
        let args = test_parameters().positional();
        assert_eq!(
            args,
            [
                "742584497250".to_owned(),
                "us-east-2".to_owned(),
                "Demo".to_owned(),
                "UAT".to_owned(),
                "demo-toolchain".to_owned(),
                "DemoService-UAT".to_owned(),
            ]
        );
    }

    #[test]
    fn commands_are_reproducible() {
        let first = ConfigureStep::new(test_input(), test_parameters());
        let second = ConfigureStep::new(test_input(), test_parameters());
        assert_eq!(first, second);

        assert_eq!(first.commands().len(), 2);
        assert_eq!(
            first.commands()[0],
            "chmod a+x ./codedeploy/codedeploy_configuration.sh"
        );
        assert!(first.commands()[1].ends_with(
            "742584497250 us-east-2 Demo UAT demo-toolchain DemoService-UAT"
        ));
    }

    #[test]
    fn primary_output_is_the_configuration_directory() {
        let step = ConfigureStep::new(test_input(), test_parameters());
        let output = step.primary_output();
        assert_eq!(output.producer, *step.id());
        assert_eq!(output.directory, CONFIGURATION_OUTPUT_DIR);
    }

    #[test]
    fn id_is_stage_scoped() {
        let step = ConfigureStep::new(test_input(), test_parameters());
        assert_eq!(step.id().as_str(), "configure-bluegreen-uat");
    }
}
