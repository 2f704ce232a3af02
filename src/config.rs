//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::fs::{HomeDir, HomeDirError};
use crate::public_ip::DEFAULT_PUBLIC_IP_URL;
use crate::ssh::{
    DEFAULT_SSH_KEYGEN_BIN, DEFAULT_SSH_KEYSCAN_BIN, HostKeyPolicy, ParseHostKeyPolicyError,
};
use crate::terraform::DEFAULT_TERRAFORM_BIN;

/// Settings for the simulator, merged from defaults, `simulator.toml`, and
/// `SIMULATOR_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SIMULATOR",
    discovery(
        app_name = "simulator",
        env_var = "SIMULATOR_CONFIG_PATH",
        config_file_name = "simulator.toml",
        dotfile_name = ".simulator.toml",
        project_file_name = "simulator.toml"
    )
)]
pub struct SimulatorConfig {
    /// Terraform working directory.
    #[ortho_config(default = "./terraform/deployments/AWS".to_owned())]
    pub tf_dir: String,
    /// Terraform executable.
    #[ortho_config(default = DEFAULT_TERRAFORM_BIN.to_owned())]
    pub tf_bin: String,
    /// Directory holding `scenarios.yaml`.
    #[ortho_config(default = "./simulation-scripts/scenario".to_owned())]
    pub scenarios_dir: String,
    /// Script that stages a scenario on the cluster.
    #[ortho_config(default = "./simulation-scripts/perturb.sh".to_owned())]
    pub perturb_script: String,
    /// Remote state bucket handed to Terraform.
    pub state_bucket: Option<String>,
    /// Attack container image tag handed to Terraform.
    pub attack_container_tag: Option<String>,
    /// Private key used for the bastion. `~` expands to the home directory.
    #[ortho_config(default = "~/.ssh/cp_simulator_rsa".to_owned())]
    pub ssh_key_path: String,
    /// Destination of the generated OpenSSH config.
    #[ortho_config(default = "~/.ssh/cp_simulator_config".to_owned())]
    pub ssh_config_path: String,
    /// Known-hosts file for the provisioned hosts.
    #[ortho_config(default = "~/.ssh/cp_simulator_known_hosts".to_owned())]
    pub known_hosts_path: String,
    /// Key generation executable.
    #[ortho_config(default = DEFAULT_SSH_KEYGEN_BIN.to_owned())]
    pub ssh_keygen_bin: String,
    /// Host key scanning executable.
    #[ortho_config(default = DEFAULT_SSH_KEYSCAN_BIN.to_owned())]
    pub ssh_keyscan_bin: String,
    /// Service answering with the caller's public address.
    #[ortho_config(default = DEFAULT_PUBLIC_IP_URL.to_owned())]
    pub public_ip_url: String,
    /// Host key policy for the attack session: `strict`, `tofu`, or
    /// `accept-any`.
    #[ortho_config(default = "strict".to_owned())]
    pub host_key_policy: String,
    /// Treat a missing Terraform executable as empty output.
    #[ortho_config(default = false)]
    pub tolerate_missing_terraform: bool,
}

/// Filesystem locations with `~` expanded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPaths {
    /// Terraform working directory.
    pub tf_dir: Utf8PathBuf,
    /// Scenario manifest directory.
    pub scenarios_dir: Utf8PathBuf,
    /// Perturb script.
    pub perturb_script: Utf8PathBuf,
    /// Private key.
    pub ssh_key_path: Utf8PathBuf,
    /// Generated OpenSSH config.
    pub ssh_config_path: Utf8PathBuf,
    /// Known-hosts file.
    pub known_hosts_path: Utf8PathBuf,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 10] = [
    FieldMetadata::new("Terraform directory", "SIMULATOR_TF_DIR", "tf_dir"),
    FieldMetadata::new("Terraform executable", "SIMULATOR_TF_BIN", "tf_bin"),
    FieldMetadata::new("scenarios directory", "SIMULATOR_SCENARIOS_DIR", "scenarios_dir"),
    FieldMetadata::new("perturb script", "SIMULATOR_PERTURB_SCRIPT", "perturb_script"),
    FieldMetadata::new("SSH key path", "SIMULATOR_SSH_KEY_PATH", "ssh_key_path"),
    FieldMetadata::new("SSH config path", "SIMULATOR_SSH_CONFIG_PATH", "ssh_config_path"),
    FieldMetadata::new("known hosts path", "SIMULATOR_KNOWN_HOSTS_PATH", "known_hosts_path"),
    FieldMetadata::new("ssh-keygen executable", "SIMULATOR_SSH_KEYGEN_BIN", "ssh_keygen_bin"),
    FieldMetadata::new("ssh-keyscan executable", "SIMULATOR_SSH_KEYSCAN_BIN", "ssh_keyscan_bin"),
    FieldMetadata::new("public IP lookup URL", "SIMULATOR_PUBLIC_IP_URL", "public_ip_url"),
];

impl SimulatorConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to simulator.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("simulator")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank,
    /// or [`ConfigError::HostKeyPolicy`] when the policy is not recognised.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            &self.tf_dir,
            &self.tf_bin,
            &self.scenarios_dir,
            &self.perturb_script,
            &self.ssh_key_path,
            &self.ssh_config_path,
            &self.known_hosts_path,
            &self.ssh_keygen_bin,
            &self.ssh_keyscan_bin,
            &self.public_ip_url,
        ];
        for (value, metadata) in values.into_iter().zip(&REQUIRED_FIELDS) {
            Self::require_field(value, metadata)?;
        }
        self.host_key_policy()?;
        Ok(())
    }

    /// Parses the configured host key policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HostKeyPolicy`] for unknown names.
    pub fn host_key_policy(&self) -> Result<HostKeyPolicy, ConfigError> {
        Ok(self.host_key_policy.parse::<HostKeyPolicy>()?)
    }

    /// Expands `~` in every path field against `home`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HomeDir`] when a path starts with `~` and the
    /// home directory cannot be determined.
    pub fn resolve_paths(&self, home: &HomeDir) -> Result<ResolvedPaths, ConfigError> {
        Ok(ResolvedPaths {
            tf_dir: home.expand_tilde(&self.tf_dir)?,
            scenarios_dir: home.expand_tilde(&self.scenarios_dir)?,
            perturb_script: home.expand_tilde(&self.perturb_script)?,
            ssh_key_path: home.expand_tilde(&self.ssh_key_path)?,
            ssh_config_path: home.expand_tilde(&self.ssh_config_path)?,
            known_hosts_path: home.expand_tilde(&self.known_hosts_path)?,
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Indicates an unrecognised host key policy.
    #[error("invalid host_key_policy: {0}")]
    HostKeyPolicy(#[from] ParseHostKeyPolicyError),
    /// Indicates `~` could not be expanded.
    #[error("cannot expand configured path: {0}")]
    HomeDir(#[from] HomeDirError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
