//! Infrastructure lifecycle: create, inspect, and destroy the bastion and
//! cluster.
//!
//! Every public operation first re-runs [`LifecycleController::init_if_needed`],
//! which is idempotent: the keypair and variable file are only created when
//! absent, and `terraform init` is safe to repeat. Nothing is rolled back on
//! failure; the operator re-invokes the command.

use tracing::info;

use crate::process::CommandRunner;
use crate::public_ip::{PublicIpDetector, access_cidr};
use crate::ssh::KeyStore;
use crate::terraform::{
    InfrastructureSnapshot, Terraform, TerraformCommand, TfVars, ensure_vars_file, parse_output,
};

mod error;

pub use error::LifecycleError;

/// Sequences key generation, variable-file creation, and Terraform runs.
#[derive(Debug)]
pub struct LifecycleController<R: CommandRunner, I> {
    terraform: Terraform<R>,
    keys: KeyStore<R>,
    detector: I,
    attack_container_tag: Option<String>,
    state_bucket_name: Option<String>,
}

impl<R, I> LifecycleController<R, I>
where
    R: CommandRunner,
    I: PublicIpDetector,
{
    /// Creates a controller from its collaborators.
    #[must_use]
    pub const fn new(terraform: Terraform<R>, keys: KeyStore<R>, detector: I) -> Self {
        Self {
            terraform,
            keys,
            detector,
            attack_container_tag: None,
            state_bucket_name: None,
        }
    }

    /// Pins the attack container tag written to the variable file.
    #[must_use]
    pub fn with_attack_container_tag(mut self, tag: Option<String>) -> Self {
        self.attack_container_tag = tag;
        self
    }

    /// Sets the remote state bucket written to the variable file.
    #[must_use]
    pub fn with_state_bucket_name(mut self, bucket: Option<String>) -> Self {
        self.state_bucket_name = bucket;
        self
    }

    /// Ensures the keypair, variable file, and Terraform working directory.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] naming the first stage that failed.
    pub fn init_if_needed(&self) -> Result<(), LifecycleError> {
        if self.keys.ensure_key()? {
            info!(path = %self.keys.private_key_path(), "generated SSH keypair");
        }
        let public_key = self.keys.public_key()?;

        let ip = self.detector.detect()?;
        let cidr = access_cidr(ip);
        info!(%cidr, "restricting bastion access");

        let vars = TfVars::new(public_key, cidr)
            .with_attack_container_tag(self.attack_container_tag.clone())
            .with_state_bucket_name(self.state_bucket_name.clone());
        ensure_vars_file(self.terraform.working_dir(), &vars).map_err(LifecycleError::VarsFile)?;

        info!(dir = %self.terraform.working_dir(), "initialising terraform");
        self.terraform.run(TerraformCommand::Init)?;
        Ok(())
    }

    /// Provisions the infrastructure: init, plan, then apply.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] from the first failing stage.
    pub fn create(&self) -> Result<(), LifecycleError> {
        self.init_if_needed()?;
        info!("planning infrastructure");
        self.terraform.run(TerraformCommand::Plan)?;
        info!("applying infrastructure plan");
        self.terraform.run(TerraformCommand::Apply)?;
        Ok(())
    }

    /// Reads the current infrastructure state.
    ///
    /// The returned snapshot may be unusable; callers gate on
    /// [`InfrastructureSnapshot::is_usable`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when initialisation, `terraform output`, or
    /// parsing fails.
    pub fn status(&self) -> Result<InfrastructureSnapshot, LifecycleError> {
        self.init_if_needed()?;
        let json = self.terraform.run(TerraformCommand::Output)?;
        tracing::debug!(output = %json, "terraform output");
        Ok(parse_output(&json)?)
    }

    /// Tears the infrastructure down.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] from the first failing stage.
    pub fn destroy(&self) -> Result<(), LifecycleError> {
        self.init_if_needed()?;
        info!("destroying infrastructure");
        self.terraform.run(TerraformCommand::Destroy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
