//! Command-line interface definitions for the `simulator` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `simulator` binary.
#[derive(Debug, Parser)]
#[command(
    name = "simulator",
    about = "Provision a Kubernetes attack range and launch security scenarios on it",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create, inspect, and destroy the infrastructure.
    #[command(subcommand)]
    Infra(InfraCommand),
    /// Reach the provisioned hosts over SSH.
    #[command(subcommand)]
    Ssh(SshCommand),
    /// Stage scenarios on the cluster.
    #[command(subcommand)]
    Scenario(ScenarioCommand),
}

/// Subcommands of `simulator infra`.
#[derive(Debug, Subcommand)]
pub(crate) enum InfraCommand {
    /// Run terraform to create the infrastructure for scenarios.
    Create,
    /// Print the addresses of the provisioned hosts.
    Status,
    /// Tear down the infrastructure created for scenarios.
    Destroy,
}

/// Subcommands of `simulator ssh`.
#[derive(Debug, Subcommand)]
pub(crate) enum SshCommand {
    /// Print an OpenSSH config for the bastion, masters, and nodes.
    Config,
    /// Open an interactive shell on the bastion's attack container.
    Attack(AttackCommand),
}

/// Arguments for `simulator ssh attack`.
#[derive(Debug, Parser)]
pub(crate) struct AttackCommand {
    /// Override how the bastion's host key is checked for this session.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub(crate) host_key_policy: Option<HostKeyPolicyArg>,
}

/// Host key policies accepted on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum HostKeyPolicyArg {
    /// Require a matching entry in the known-hosts file.
    Strict,
    /// Record unknown keys, reject changed ones.
    Tofu,
    /// Accept any key without checking.
    AcceptAny,
}

/// Subcommands of `simulator scenario`.
#[derive(Debug, Subcommand)]
pub(crate) enum ScenarioCommand {
    /// Launch a scenario on the provisioned cluster.
    Launch(LaunchCommand),
}

/// Arguments for `simulator scenario launch`.
#[derive(Debug, Parser)]
pub(crate) struct LaunchCommand {
    /// Scenario identifier from the manifest.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}
