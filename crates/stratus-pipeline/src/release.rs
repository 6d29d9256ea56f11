//! Per-stage service stack description, including the blue/green target
//! switch.
//!
//! Each stage instantiates one [`ServiceRelease`]: the task definition, the
//! roles it runs with, and exactly one blue and one green target pair on the
//! same routing tier. Swapping is entirely description: the switch only
//! says where the ramp-up policy will route traffic once the external
//! release runtime executes a release; it never performs a traffic cut
//! itself.

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::types::{RampUpPolicy, ServiceName, StageName};

/// Maximum length of a target-group identifier on the routing platform.
pub const MAX_TARGET_GROUP_NAME_LEN: usize = 32;

/// Principal that service tasks run as.
pub const TASK_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Principal the release runtime assumes to execute a release.
pub const RELEASE_PRINCIPAL: &str = "codedeploy.amazonaws.com";

/// Clamp an identifier to `max` characters, keeping the suffix.
///
/// When a derived name is too long the *trailing* characters are kept: the
/// suffix carries the stage-specific part of the name, so uniqueness wins
/// over readability.
#[must_use]
pub fn clamp_identifier(name: &str, max: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() > max {
        chars[chars.len() - max..].iter().collect()
    } else {
        name.to_owned()
    }
}

/// Who moves traffic when the service is updated.
///
/// Blue/green releases hand the traffic shift to the external release
/// runtime; the orchestrator's own rolling update is listed only so the
/// manifest states the choice explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentController {
    /// Rolling update performed by the container orchestrator itself.
    Rolling,
    /// Traffic shift delegated to the external release runtime.
    #[default]
    ExternalRelease,
}

/// One target group on the routing tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Target-group identifier, clamped to the platform maximum.
    pub name: String,
    /// Port the group's targets receive traffic on.
    pub port: u16,
}

/// One listener on the load balancer, forwarding to a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    /// Listener identifier within the service stack.
    pub id: String,
    /// Port the listener accepts traffic on.
    pub port: u16,
    /// Name of the target group the listener forwards to.
    pub target_group: String,
}

/// A target group bound to the listener that feeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPair {
    /// The target group.
    pub target_group: TargetGroup,
    /// The listener forwarding to it.
    pub listener: Listener,
}

/// The two traffic targets of one service stack.
///
/// Blue serves live traffic on the public port; green validates a new
/// revision on the test port before it becomes blue. There is always
/// exactly one of each; there is no N-way colour model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueGreenTopology {
    /// The live pair.
    pub blue: TargetPair,
    /// The pre-swap validation pair.
    pub green: TargetPair,
}

impl BlueGreenTopology {
    /// Describe the two target pairs for one service stack.
    ///
    /// The blue pair is bound to the public port; the green pair is created
    /// on the container's own test port, on the same routing tier. The green
    /// target-group name is derived from the stage identifier and clamped by
    /// keeping the suffix.
    #[must_use]
    pub fn switch(stage_identifier: &str, config: &ServiceConfig) -> Self {
        let blue = TargetPair {
            target_group: TargetGroup {
                name: clamp_identifier(stage_identifier, MAX_TARGET_GROUP_NAME_LEN),
                port: config.public_port,
            },
            listener: Listener {
                id: "PublicListener".to_owned(),
                port: config.public_port,
                target_group: clamp_identifier(stage_identifier, MAX_TARGET_GROUP_NAME_LEN),
            },
        };

        let green_name = green_target_group_name(stage_identifier);
        let green = TargetPair {
            target_group: TargetGroup {
                name: green_name.clone(),
                port: config.container_port,
            },
            listener: Listener {
                id: "GreenListener".to_owned(),
                port: config.container_port,
                target_group: green_name,
            },
        };

        Self { blue, green }
    }

    /// Both pairs, blue first.
    #[must_use]
    pub fn pairs(&self) -> [&TargetPair; 2] {
        [&self.blue, &self.green]
    }
}

/// Conventional green target-group name for a stage identifier.
#[must_use]
pub fn green_target_group_name(stage_identifier: &str) -> String {
    clamp_identifier(
        &format!("GreenTG{stage_identifier}"),
        MAX_TARGET_GROUP_NAME_LEN,
    )
}

/// The routing description the release runtime consumes.
///
/// The four-tuple of blue/green target groups and listeners is the sole
/// input; it can only be supplied as a [`BlueGreenTopology`], so a release
/// configuration with a missing or surplus colour cannot be described.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfiguration {
    /// Where traffic is routed during and after the ramp-up window.
    pub topology: BlueGreenTopology,
    /// Ramp-up policy the release executes with.
    pub ramp_policy: RampUpPolicy,
    /// How long the replaced task set is kept after a successful shift.
    pub termination_wait_minutes: u32,
}

impl ReleaseConfiguration {
    /// Build the release configuration from the target switch output.
    #[must_use]
    pub fn new(
        topology: BlueGreenTopology,
        ramp_policy: RampUpPolicy,
        termination_wait_minutes: u32,
    ) -> Self {
        Self {
            topology,
            ramp_policy,
            termination_wait_minutes,
        }
    }
}

/// A role the service stack is described with.
///
/// Only the identity and trust principal are described here; policy
/// catalogues belong to the accounts that own them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role identifier within the service stack.
    pub id: String,
    /// Service principal allowed to assume the role.
    pub assumed_by: String,
}

impl RoleSpec {
    /// Describe a role assumed by a service principal.
    #[must_use]
    pub fn assumed_by(id: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assumed_by: principal.into(),
        }
    }
}

/// The container of the service task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    /// Container name; matches the service name.
    pub name: String,
    /// Port the container listens on.
    pub port: u16,
    /// Soft memory reservation in MiB.
    pub memory_reservation_mib: u32,
    /// Hard memory limit in MiB.
    pub memory_limit_mib: u32,
    /// The task fails if this container stops.
    pub essential: bool,
}

/// The task definition of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task family; matches the service name.
    pub family: String,
    /// CPU units for the task.
    pub cpu: u32,
    /// Task memory in MiB.
    pub memory_mib: u32,
    /// The single application container.
    pub container: ContainerDefinition,
}

/// A value the service stack publishes for its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Human description.
    pub description: String,
    /// Output value, derived from the stack description.
    pub value: String,
}

/// The service stack instantiated for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRelease {
    /// Service stack name.
    pub service_name: ServiceName,
    /// Stage the stack belongs to.
    pub stage: StageName,
    /// Number of tasks kept running.
    pub desired_count: u32,
    /// Who moves traffic when the service is updated.
    pub deployment_controller: DeploymentController,
    /// Load balancer name.
    pub load_balancer_name: String,
    /// The service task definition.
    pub task_definition: TaskDefinition,
    /// Role the application code runs as.
    pub task_role: RoleSpec,
    /// Role that launches the task.
    pub execution_role: RoleSpec,
    /// Role the release runtime executes releases with.
    pub release_role: RoleSpec,
    /// Routing description consumed by the release runtime.
    pub release_configuration: ReleaseConfiguration,
    /// Values the stack publishes.
    pub outputs: Vec<StackOutput>,
}

impl ServiceRelease {
    /// Describe the service stack for one stage.
    #[must_use]
    pub fn describe(
        service_name: ServiceName,
        stage: StageName,
        ramp_policy: RampUpPolicy,
        config: &ServiceConfig,
    ) -> Self {
        let id = service_name.as_str();
        let topology = BlueGreenTopology::switch(id, config);
        let release_configuration = ReleaseConfiguration::new(
            topology,
            ramp_policy,
            config.termination_wait_minutes,
        );

        let task_role = RoleSpec::assumed_by(format!("EcsTaskRole{id}"), TASK_PRINCIPAL);
        let execution_role = RoleSpec::assumed_by(format!("EcsExecutionRole{id}"), TASK_PRINCIPAL);
        let release_role =
            RoleSpec::assumed_by(format!("CodeDeployExecRole{id}"), RELEASE_PRINCIPAL);

        let task_definition = TaskDefinition {
            family: id.to_owned(),
            cpu: config.task_cpu,
            memory_mib: config.task_memory_mib,
            container: ContainerDefinition {
                name: id.to_owned(),
                port: config.container_port,
                memory_reservation_mib: config.container_memory_reservation_mib,
                memory_limit_mib: config.container_memory_limit_mib,
                essential: true,
            },
        };

        let load_balancer_name = format!("Alb{id}");
        let outputs = vec![
            StackOutput {
                key: "ServiceURL".to_owned(),
                description: "Application is accessible from this url".to_owned(),
                value: format!("http://{load_balancer_name}"),
            },
            StackOutput {
                key: "ECSCluster".to_owned(),
                description: "Name of the ECS cluster".to_owned(),
                value: format!("{id}-cluster"),
            },
            StackOutput {
                key: "TaskRole".to_owned(),
                description: "Role name of the task being executed".to_owned(),
                value: task_role.id.clone(),
            },
            StackOutput {
                key: "ExecutionRole".to_owned(),
                description: "Execution role name of the task being executed".to_owned(),
                value: execution_role.id.clone(),
            },
        ];

        Self {
            service_name,
            stage,
            desired_count: config.desired_count,
            deployment_controller: DeploymentController::ExternalRelease,
            load_balancer_name,
            task_definition,
            task_role,
            execution_role,
            release_role,
            release_configuration,
            outputs,
        }
    }

    /// The blue/green topology of this release.
    #[must_use]
    pub const fn topology(&self) -> &BlueGreenTopology {
        &self.release_configuration.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_release(stage: &str) -> ServiceRelease {
        let stage = StageName::new(stage);
        let service = ServiceName::for_stage("Demo", &stage);
        ServiceRelease::describe(
            service,
            stage,
            RampUpPolicy::CANARY_10_PERCENT_5_MINUTES,
            &ServiceConfig::default(),
        )
    }

    #[test]
    fn exactly_one_blue_and_one_green_pair() {
        let release = test_release("UAT");
        let pairs = release.topology().pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].listener.port, 80);
        assert_eq!(pairs[1].listener.port, 8080);
    }

    #[test]
    fn listeners_forward_to_their_own_colour() {
        let release = test_release("UAT");
        let topology = release.topology();
        assert_eq!(
            topology.blue.listener.target_group,
            topology.blue.target_group.name
        );
        assert_eq!(
            topology.green.listener.target_group,
            topology.green.target_group.name
        );
    }

    #[test]
    fn green_name_short_identifier_untouched() {
        assert_eq!(green_target_group_name("Web"), "GreenTGWeb");
    }

    #[test]
    fn green_name_clamped_to_suffix() {
        let stage = "VeryLongStageNameThatExceedsThirtyTwoCharacters";
        let name = green_target_group_name(stage);

        let full = format!("GreenTG{stage}");
        let expected: String = full
            .chars()
            .skip(full.chars().count() - MAX_TARGET_GROUP_NAME_LEN)
            .collect();
        assert_eq!(name, expected);
        assert_eq!(name.chars().count(), MAX_TARGET_GROUP_NAME_LEN);
    }

    #[test]
    fn green_name_is_deterministic() {
        let stage = "VeryLongStageNameThatExceedsThirtyTwoCharacters";
        assert_eq!(green_target_group_name(stage), green_target_group_name(stage));
    }

    #[test]
    fn task_definition_follows_service_config() {
        let release = test_release("UAT");
        assert_eq!(release.task_definition.family, "DemoService-UAT");
        assert_eq!(release.task_definition.cpu, 1024);
        assert_eq!(release.task_definition.memory_mib, 2048);
        assert_eq!(release.task_definition.container.port, 8080);
        assert!(release.task_definition.container.essential);
        assert_eq!(release.desired_count, 2);
    }

    #[test]
    fn roles_have_expected_principals() {
        let release = test_release("UAT");
        assert_eq!(release.task_role.assumed_by, TASK_PRINCIPAL);
        assert_eq!(release.execution_role.assumed_by, TASK_PRINCIPAL);
        assert_eq!(release.release_role.assumed_by, RELEASE_PRINCIPAL);
    }

    #[test]
    fn releases_are_externally_controlled() {
        let release = test_release("UAT");
        assert_eq!(
            release.deployment_controller,
            DeploymentController::ExternalRelease
        );
    }

    #[test]
    fn termination_wait_comes_from_config() {
        let release = test_release("UAT");
        assert_eq!(release.release_configuration.termination_wait_minutes, 15);
    }
}
