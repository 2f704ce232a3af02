//! Error types for the infrastructure lifecycle.

use thiserror::Error;

use crate::fs::FsError;
use crate::public_ip::PublicIpError;
use crate::ssh::KeyError;
use crate::terraform::{OutputParseError, TerraformCommand, TerraformError};

/// Errors raised by [`super::LifecycleController`], one variant per stage.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Raised when the SSH keypair cannot be generated or read.
    #[error("failed to prepare SSH keypair: {0}")]
    Key(#[from] KeyError),
    /// Raised when the caller's public address cannot be detected.
    #[error("failed to detect public IP address: {0}")]
    PublicIp(#[from] PublicIpError),
    /// Raised when the variable file cannot be written.
    #[error("failed to write terraform variables: {0}")]
    VarsFile(#[source] FsError),
    /// Raised when a Terraform subcommand fails.
    #[error(transparent)]
    Terraform(#[from] TerraformError),
    /// Raised when `terraform output` cannot be parsed.
    #[error(transparent)]
    Parse(#[from] OutputParseError),
}

impl LifecycleError {
    /// Terraform subcommand that failed, if the failure came from one.
    #[must_use]
    pub const fn terraform_command(&self) -> Option<TerraformCommand> {
        match self {
            Self::Terraform(err) => Some(err.command()),
            _ => None,
        }
    }
}
