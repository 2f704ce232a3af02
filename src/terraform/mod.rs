//! Terraform subprocess driver.
//!
//! Each lifecycle step maps to one [`TerraformCommand`] whose exact flag set
//! is fixed here. The driver runs `terraform` in the infrastructure directory
//! with `TF_IS_IN_AUTOMATION` set and turns non-zero exits into
//! [`TerraformError`]s naming the failing subcommand.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::process::{CommandRunner, CommandSpec, ExitOutcome, OutputMode, ProcessError};

mod output;
mod vars;

pub use output::{InfrastructureSnapshot, OutputParseError, parse_output};
pub use vars::{TfVars, VARS_FILE, ensure_vars_file};

/// Default Terraform executable.
pub const DEFAULT_TERRAFORM_BIN: &str = "terraform";

/// Plan artefact written by `plan` and consumed by `apply`.
pub const PLAN_FILE: &str = "tfplan";

/// Environment marker telling Terraform it runs non-interactively.
pub const AUTOMATION_ENV: (&str, &str) = ("TF_IS_IN_AUTOMATION", "1");

/// Terraform subcommands used by the lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerraformCommand {
    /// `terraform init`
    Init,
    /// `terraform plan`
    Plan,
    /// `terraform apply`
    Apply,
    /// `terraform destroy`
    Destroy,
    /// `terraform output`
    Output,
}

impl TerraformCommand {
    /// Subcommand name as passed on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Output => "output",
        }
    }

    /// Full argument list, subcommand first.
    #[must_use]
    pub fn args(self) -> Vec<String> {
        let mut args = vec![self.as_str().to_owned()];
        match self {
            Self::Output => args.push(String::from("-json")),
            Self::Init => args.push(String::from("-input=false")),
            Self::Plan => {
                args.push(String::from("-input=false"));
                args.push(format!("--var-file={VARS_FILE}"));
                args.push(format!("-out={PLAN_FILE}"));
            }
            Self::Apply => {
                args.push(String::from("-input=false"));
                args.push(String::from("-auto-approve"));
                args.push(PLAN_FILE.to_owned());
            }
            Self::Destroy => {
                args.push(String::from("-input=false"));
                args.push(String::from("-auto-approve"));
            }
        }
        args
    }

    /// `output` is parsed rather than shown, so it runs silently.
    #[must_use]
    pub const fn output_mode(self) -> OutputMode {
        match self {
            Self::Output => OutputMode::Silent,
            Self::Init | Self::Plan | Self::Apply | Self::Destroy => OutputMode::Streaming,
        }
    }
}

impl fmt::Display for TerraformCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised while running Terraform.
#[derive(Debug, Error)]
pub enum TerraformError {
    /// Raised when the process cannot be started.
    #[error("terraform {command} could not run: {source}")]
    Process {
        /// Subcommand being run.
        command: TerraformCommand,
        /// Underlying process error.
        #[source]
        source: ProcessError,
    },
    /// Raised when the shell reports the command as missing.
    #[error("terraform {command} exited with status 127 (command not found)")]
    ToolNotFound {
        /// Subcommand being run.
        command: TerraformCommand,
    },
    /// Raised when Terraform exits unsuccessfully.
    #[error("terraform {command} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Subcommand being run.
        command: TerraformCommand,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

impl TerraformError {
    /// Subcommand that produced the error.
    #[must_use]
    pub const fn command(&self) -> TerraformCommand {
        match self {
            Self::Process { command, .. }
            | Self::ToolNotFound { command }
            | Self::CommandFailure { command, .. } => *command,
        }
    }
}

/// Runs Terraform subcommands inside an infrastructure directory.
#[derive(Clone, Debug)]
pub struct Terraform<R: CommandRunner> {
    bin: String,
    working_dir: Utf8PathBuf,
    tolerate_missing_tool: bool,
    runner: R,
}

impl<R: CommandRunner> Terraform<R> {
    /// Creates a driver for `working_dir` using the default binary.
    #[must_use]
    pub fn new(working_dir: impl Into<Utf8PathBuf>, runner: R) -> Self {
        Self {
            bin: DEFAULT_TERRAFORM_BIN.to_owned(),
            working_dir: working_dir.into(),
            tolerate_missing_tool: false,
            runner,
        }
    }

    /// Overrides the Terraform executable.
    #[must_use]
    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    /// Treats exit status 127 as success with empty output instead of an
    /// error.
    #[must_use]
    pub const fn tolerate_missing_tool(mut self, tolerate: bool) -> Self {
        self.tolerate_missing_tool = tolerate;
        self
    }

    /// Infrastructure directory the driver runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// Builds the invocation for `command`.
    #[must_use]
    pub fn spec(&self, command: TerraformCommand) -> CommandSpec {
        let (key, value) = AUTOMATION_ENV;
        CommandSpec::new(&self.bin)
            .args(command.args())
            .working_dir(self.working_dir.clone())
            .env(key, value)
            .mode(command.output_mode())
    }

    /// Runs `command` and returns its captured stdout.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the process cannot run or exits with a
    /// failure status.
    pub fn run(&self, command: TerraformCommand) -> Result<String, TerraformError> {
        let spec = self.spec(command);
        debug!(command = %spec.command_line(), dir = %self.working_dir, "running terraform");
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| TerraformError::Process { command, source })?;

        match output.outcome() {
            ExitOutcome::Success => Ok(output.stdout),
            ExitOutcome::ToolNotFound if self.tolerate_missing_tool => {
                warn!(%command, "terraform reported status 127; continuing with empty output");
                Ok(String::new())
            }
            ExitOutcome::ToolNotFound => Err(TerraformError::ToolNotFound { command }),
            ExitOutcome::Failed(status) => Err(TerraformError::CommandFailure {
                command,
                status,
                status_text: output.status_text(),
                stderr: output.stderr,
            }),
        }
    }
}

#[cfg(test)]
mod tests;
