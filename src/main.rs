//! Binary entry point for the simulator CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use simulator::ssh::{
    AgentStrategy, AuthResolver, HostKeyPolicy, KeyStore, KnownHostsManager, Ssh2Shell,
};
use simulator::{
    AccessError, AccessOrchestrator, AccessSettings, ConfigError, HomeDir, HttpPublicIpDetector,
    LifecycleController, LifecycleError, ProcessCommandRunner, ResolvedPaths, ScenarioError,
    ScenarioManifest, SimulatorConfig, Terraform,
};

mod cli;

use cli::{Cli, HostKeyPolicyArg, InfraCommand, ScenarioCommand, SshCommand};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "SIMULATOR_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

type Lifecycle = LifecycleController<ProcessCommandRunner, HttpPublicIpDetector>;
type Access = AccessOrchestrator<ProcessCommandRunner, HttpPublicIpDetector, Ssh2Shell>;

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config() -> Result<(SimulatorConfig, ResolvedPaths), CliError> {
    let config = SimulatorConfig::load_without_cli_args()?;
    config.validate()?;
    let paths = config.resolve_paths(&HomeDir::from_system())?;
    Ok((config, paths))
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let (config, paths) = load_config()?;
    match cli {
        Cli::Infra(command) => run_infra(&command, &build_lifecycle(&config, &paths)),
        Cli::Ssh(SshCommand::Config) => {
            let rendered = build_access(&config, &paths, None)?.ssh_config()?;
            write!(io::stdout(), "{rendered}").map_err(CliError::Output)?;
            Ok(0)
        }
        Cli::Ssh(SshCommand::Attack(args)) => {
            let policy = args.host_key_policy.map(host_key_policy);
            Ok(build_access(&config, &paths, policy)?.attack()?)
        }
        Cli::Scenario(ScenarioCommand::Launch(args)) => {
            let manifest = ScenarioManifest::load(&paths.scenarios_dir)?;
            build_access(&config, &paths, None)?.launch(&manifest, &args.id)?;
            Ok(0)
        }
    }
}

fn run_infra(command: &InfraCommand, lifecycle: &Lifecycle) -> Result<i32, CliError> {
    match command {
        InfraCommand::Create => lifecycle.create()?,
        InfraCommand::Status => {
            let snapshot = lifecycle.status()?;
            writeln!(io::stdout(), "{snapshot}").map_err(CliError::Output)?;
        }
        InfraCommand::Destroy => lifecycle.destroy()?,
    }
    Ok(0)
}

const fn host_key_policy(arg: HostKeyPolicyArg) -> HostKeyPolicy {
    match arg {
        HostKeyPolicyArg::Strict => HostKeyPolicy::Strict,
        HostKeyPolicyArg::Tofu => HostKeyPolicy::TrustOnFirstUse,
        HostKeyPolicyArg::AcceptAny => HostKeyPolicy::AcceptAny,
    }
}

fn build_lifecycle(config: &SimulatorConfig, paths: &ResolvedPaths) -> Lifecycle {
    let terraform = Terraform::new(paths.tf_dir.clone(), ProcessCommandRunner)
        .with_bin(config.tf_bin.clone())
        .tolerate_missing_tool(config.tolerate_missing_terraform);
    let keys = KeyStore::new(paths.ssh_key_path.clone(), ProcessCommandRunner)
        .with_keygen_bin(config.ssh_keygen_bin.clone());
    LifecycleController::new(
        terraform,
        keys,
        HttpPublicIpDetector::new(config.public_ip_url.clone()),
    )
    .with_attack_container_tag(config.attack_container_tag.clone())
    .with_state_bucket_name(config.state_bucket.clone())
}

fn build_access(
    config: &SimulatorConfig,
    paths: &ResolvedPaths,
    policy_override: Option<HostKeyPolicy>,
) -> Result<Access, CliError> {
    let host_key_policy = policy_override.map_or_else(|| config.host_key_policy(), Ok)?;
    let known_hosts = KnownHostsManager::new(paths.known_hosts_path.clone(), ProcessCommandRunner)
        .with_keyscan_bin(config.ssh_keyscan_bin.clone());
    let auth = AuthResolver::standard(AgentStrategy::from_env(), paths.ssh_key_path.clone());
    let settings = AccessSettings {
        ssh_key_path: paths.ssh_key_path.clone(),
        ssh_config_path: paths.ssh_config_path.clone(),
        perturb_script: paths.perturb_script.clone(),
        host_key_policy,
    };
    Ok(AccessOrchestrator::new(
        build_lifecycle(config, paths),
        known_hosts,
        auth,
        Ssh2Shell,
        ProcessCommandRunner,
        settings,
    ))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
