//! Configuration for stratus-pipeline.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

/// Top-level configuration for pipeline descriptions.
///
/// These are the ambient defaults a description is parameterised with; the
/// per-stage facts (name, ramp-up policy, target environment) always come
/// from the caller.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineConfig {
    /// Application-level settings.
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Source repository settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Build and synthesis settings.
    #[serde(default)]
    pub synth: SynthConfig,

    /// Per-stage service stack settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl PipelineConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier):
    /// 1. Default values
    /// 2. `pipeline.toml` in the current directory (if present)
    /// 3. Environment variables with `STRATUS_PIPELINE_` prefix
    pub fn load() -> PipelineResult<Self> {
        Figment::new()
            .merge(Toml::file("pipeline.toml"))
            .merge(Env::prefixed("STRATUS_PIPELINE_").split("__"))
            .extract()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> PipelineResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATUS_PIPELINE_").split("__"))
            .extract()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Application name, used as the prefix of every derived resource name.
    #[serde(default = "default_application_name")]
    pub name: String,
}

fn default_application_name() -> String {
    "Demo".to_owned()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_application_name(),
        }
    }
}

/// Source repository settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Repository the pipeline watches. Defaults to the application name.
    #[serde(default)]
    pub repository: Option<String>,

    /// Branch that triggers the pipeline.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_owned()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repository: None,
            branch: default_branch(),
        }
    }
}

/// Build and synthesis settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthConfig {
    /// Commands run before the build (toolchain setup).
    #[serde(default = "default_install_commands")]
    pub install_commands: Vec<String>,

    /// Commands that package the service and synthesise the description.
    #[serde(default = "default_synth_commands")]
    pub commands: Vec<String>,
}

fn default_install_commands() -> Vec<String> {
    vec!["npm install".to_owned()]
}

fn default_synth_commands() -> Vec<String> {
    vec!["make package".to_owned(), "make synth".to_owned()]
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            install_commands: default_install_commands(),
            commands: default_synth_commands(),
        }
    }
}

/// Per-stage service stack settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Number of service tasks kept running.
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    /// Task CPU units.
    #[serde(default = "default_task_cpu")]
    pub task_cpu: u32,

    /// Task memory in MiB.
    #[serde(default = "default_task_memory_mib")]
    pub task_memory_mib: u32,

    /// Container soft memory reservation in MiB.
    #[serde(default = "default_container_memory_reservation_mib")]
    pub container_memory_reservation_mib: u32,

    /// Container hard memory limit in MiB.
    #[serde(default = "default_container_memory_limit_mib")]
    pub container_memory_limit_mib: u32,

    /// Port the public (blue) listener serves.
    #[serde(default = "default_public_port")]
    pub public_port: u16,

    /// Container port, also used by the green test listener.
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// How long the old task set is kept after a successful traffic shift.
    #[serde(default = "default_termination_wait_minutes")]
    pub termination_wait_minutes: u32,
}

const fn default_desired_count() -> u32 {
    2
}

const fn default_task_cpu() -> u32 {
    1024
}

const fn default_task_memory_mib() -> u32 {
    2048
}

const fn default_container_memory_reservation_mib() -> u32 {
    256
}

const fn default_container_memory_limit_mib() -> u32 {
    512
}

const fn default_public_port() -> u16 {
    80
}

const fn default_container_port() -> u16 {
    8080
}

const fn default_termination_wait_minutes() -> u32 {
    15
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            desired_count: default_desired_count(),
            task_cpu: default_task_cpu(),
            task_memory_mib: default_task_memory_mib(),
            container_memory_reservation_mib: default_container_memory_reservation_mib(),
            container_memory_limit_mib: default_container_memory_limit_mib(),
            public_port: default_public_port(),
            container_port: default_container_port(),
            termination_wait_minutes: default_termination_wait_minutes(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.application.name, "Demo");
        assert_eq!(config.source.branch, "main");
        assert_eq!(config.service.desired_count, 2);
        assert_eq!(config.service.public_port, 80);
        assert_eq!(config.service.container_port, 8080);
        assert_eq!(config.service.termination_wait_minutes, 15);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [application]
            name = "Checkout"

            [source]
            repository = "checkout-service"
            branch = "release"

            [service]
            desired_count = 4
            public_port = 443
        "#;

        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.application.name, "Checkout");
        assert_eq!(config.source.repository.as_deref(), Some("checkout-service"));
        assert_eq!(config.source.branch, "release");
        assert_eq!(config.service.desired_count, 4);
        assert_eq!(config.service.public_port, 443);
        // Unset fields keep their defaults.
        assert_eq!(config.service.container_port, 8080);
    }
}
