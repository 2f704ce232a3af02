//! Core library for the simulator attack-range tool.
//!
//! The crate drives Terraform to provision a bastion plus a small Kubernetes
//! cluster (create → status → destroy), gates every follow-up action on the
//! parsed infrastructure state, and gives the operator access to it: an
//! OpenSSH config, an interactive shell on the bastion, and scenario launch.

pub mod access;
pub mod config;
pub mod fs;
pub mod lifecycle;
pub mod process;
pub mod public_ip;
pub mod scenario;
pub mod ssh;
pub mod terraform;
pub mod test_support;

pub use access::{AccessError, AccessOrchestrator, AccessSettings};
pub use config::{ConfigError, ResolvedPaths, SimulatorConfig};
pub use fs::{FsError, HomeDir, HomeDirError};
pub use lifecycle::{LifecycleController, LifecycleError};
pub use process::{
    CommandOutput, CommandRunner, CommandSpec, ExitOutcome, OutputMode, ProcessCommandRunner,
    ProcessError,
};
pub use public_ip::{HttpPublicIpDetector, PublicIpDetector, PublicIpError};
pub use scenario::{Scenario, ScenarioCatalogue, ScenarioError, ScenarioManifest};
pub use terraform::{InfrastructureSnapshot, Terraform, TerraformCommand, TerraformError};
