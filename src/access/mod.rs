//! Operator access to live infrastructure: SSH configuration, the attack
//! session, and scenario launch.
//!
//! Every operation reads the infrastructure state first and refuses to
//! proceed when the snapshot is not usable.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::fs::{FsError, overwrite_file};
use crate::lifecycle::{LifecycleController, LifecycleError};
use crate::process::{CommandRunner, CommandSpec, OutputMode, ProcessError};
use crate::public_ip::PublicIpDetector;
use crate::scenario::ScenarioCatalogue;
use crate::ssh::{
    AuthError, AuthResolver, HostKeyPolicy, InteractiveShell, KeyError, KnownHostsError,
    KnownHostsManager, SessionConfig, SessionError, encode_private_key, render_ssh_config,
};
use crate::terraform::InfrastructureSnapshot;

/// Errors raised while accessing the infrastructure.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Raised when reading the infrastructure state fails.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// Raised when the infrastructure is absent or incomplete.
    #[error("no infrastructure, please run `simulator infra create`")]
    NoInfrastructure,
    /// Raised when the requested scenario is not in the manifest.
    #[error("scenario {id} not found")]
    UnknownScenario {
        /// Requested identifier.
        id: String,
    },
    /// Raised when the private key cannot be read for forwarding.
    #[error("failed to read private key for forwarding: {0}")]
    Key(#[from] KeyError),
    /// Raised when no SSH credential can be resolved.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Raised when the bastion's host keys cannot be recorded.
    #[error("failed to update known hosts for bastion {host}: {source}")]
    KnownHosts {
        /// Bastion address.
        host: String,
        /// Underlying failure.
        #[source]
        source: KnownHostsError,
    },
    /// Raised when the interactive session fails.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Raised when the SSH config file cannot be written.
    #[error("failed to write SSH config: {0}")]
    SshConfigWrite(#[source] FsError),
    /// Raised when the perturb script cannot be started.
    #[error("failed to run perturb script {script}: {source}")]
    PerturbSpawn {
        /// Script path.
        script: Utf8PathBuf,
        /// Underlying process error.
        #[source]
        source: ProcessError,
    },
    /// Raised when the perturb script exits unsuccessfully.
    #[error("perturb script {script} exited with status {status_text}")]
    PerturbFailed {
        /// Script path.
        script: Utf8PathBuf,
        /// Human readable exit status.
        status_text: String,
    },
}

/// Local paths and policy used when reaching the hosts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessSettings {
    /// Private key used as the identity and forwarded to the session.
    pub ssh_key_path: Utf8PathBuf,
    /// Destination of the generated OpenSSH config.
    pub ssh_config_path: Utf8PathBuf,
    /// Script that stages a scenario on the cluster.
    pub perturb_script: Utf8PathBuf,
    /// Host key policy for the interactive session.
    pub host_key_policy: HostKeyPolicy,
}

/// Sequences the usability gate with the access operations.
#[derive(Debug)]
pub struct AccessOrchestrator<R: CommandRunner, I, S> {
    lifecycle: LifecycleController<R, I>,
    known_hosts: KnownHostsManager<R>,
    auth: AuthResolver,
    shell: S,
    runner: R,
    settings: AccessSettings,
}

impl<R, I, S> AccessOrchestrator<R, I, S>
where
    R: CommandRunner,
    I: PublicIpDetector,
    S: InteractiveShell,
{
    /// Creates an orchestrator from its collaborators. `runner` executes the
    /// perturb script.
    #[must_use]
    pub const fn new(
        lifecycle: LifecycleController<R, I>,
        known_hosts: KnownHostsManager<R>,
        auth: AuthResolver,
        shell: S,
        runner: R,
        settings: AccessSettings,
    ) -> Self {
        Self {
            lifecycle,
            known_hosts,
            auth,
            shell,
            runner,
            settings,
        }
    }

    /// Renders the OpenSSH config for the current infrastructure.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NoInfrastructure`] when the snapshot is not
    /// usable, or the lifecycle failure that prevented reading it.
    pub fn ssh_config(&self) -> Result<String, AccessError> {
        let snapshot = self.usable_snapshot()?;
        Ok(self.render(&snapshot))
    }

    /// Opens an interactive shell on the bastion and returns its exit
    /// status.
    ///
    /// Recording the bastion's host keys is best effort here; the session's
    /// host key policy has the final say.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the infrastructure is unusable, no
    /// credential resolves, or the session fails.
    pub fn attack(&self) -> Result<i32, AccessError> {
        let snapshot = self.usable_snapshot()?;
        let bastion = snapshot.bastion_public_ip;

        if let Err(err) = self.known_hosts.ensure_host(&bastion) {
            warn!(host = %bastion, error = %err, "could not update known hosts");
        }

        let auth = self.auth.resolve()?;
        let forwarded = encode_private_key(&self.settings.ssh_key_path)?;
        let config = SessionConfig::new(bastion, auth, self.known_hosts.path())
            .with_host_key_policy(self.settings.host_key_policy)
            .with_forwarded_key(forwarded);
        info!(host = %config.host, policy = %config.host_key_policy, "connecting to bastion");
        Ok(self.shell.run(&config)?)
    }

    /// Stages scenario `id` on the cluster.
    ///
    /// Writes the SSH config and records the bastion's host keys before
    /// running the perturb script with the host addresses and the scenario
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] naming the first step that failed.
    pub fn launch(&self, catalogue: &impl ScenarioCatalogue, id: &str) -> Result<(), AccessError> {
        let Some(scenario) = catalogue.find(id) else {
            return Err(AccessError::UnknownScenario { id: id.to_owned() });
        };
        let snapshot = self.usable_snapshot()?;

        let config = self.render(&snapshot);
        overwrite_file(&self.settings.ssh_config_path, &config)
            .map_err(AccessError::SshConfigWrite)?;
        info!(path = %self.settings.ssh_config_path, "wrote SSH config");

        let bastion = &snapshot.bastion_public_ip;
        self.known_hosts
            .ensure_host(bastion)
            .map_err(|source| AccessError::KnownHosts {
                host: bastion.clone(),
                source,
            })?;

        info!(scenario = %scenario.id, path = %scenario.path, "launching scenario");
        self.perturb(&snapshot, &scenario.path)
    }

    fn usable_snapshot(&self) -> Result<InfrastructureSnapshot, AccessError> {
        let snapshot = self.lifecycle.status()?;
        if snapshot.is_usable() {
            Ok(snapshot)
        } else {
            Err(AccessError::NoInfrastructure)
        }
    }

    fn render(&self, snapshot: &InfrastructureSnapshot) -> String {
        render_ssh_config(
            snapshot,
            &self.settings.ssh_key_path,
            self.known_hosts.path(),
        )
    }

    fn perturb(
        &self,
        snapshot: &InfrastructureSnapshot,
        scenario_path: &str,
    ) -> Result<(), AccessError> {
        let script = &self.settings.perturb_script;
        let spec = perturb_command(script, snapshot, scenario_path);
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| AccessError::PerturbSpawn {
                script: script.clone(),
                source,
            })?;
        if output.is_success() {
            Ok(())
        } else {
            Err(AccessError::PerturbFailed {
                script: script.clone(),
                status_text: output.status_text(),
            })
        }
    }
}

/// Builds `<script> --bastion <ip> --master <ips> --nodes <ips> <path>`,
/// joining multiple addresses with commas.
#[must_use]
pub fn perturb_command(
    script: &Utf8Path,
    snapshot: &InfrastructureSnapshot,
    scenario_path: &str,
) -> CommandSpec {
    CommandSpec::new(script.as_str())
        .args([
            "--bastion",
            snapshot.bastion_public_ip.as_str(),
            "--master",
            snapshot.master_nodes_private_ips.join(",").as_str(),
            "--nodes",
            snapshot.cluster_nodes_private_ips.join(",").as_str(),
            scenario_path,
        ])
        .mode(OutputMode::Streaming)
}

#[cfg(test)]
mod tests;
