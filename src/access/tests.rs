//! Unit tests for the access orchestrator.

use std::net::{IpAddr, Ipv4Addr};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::fs::{file_exists, read_file, utf8_path};
use crate::scenario::{Scenario, ScenarioManifest};
use crate::ssh::{AgentStrategy, AuthMethod, KeyStore, public_key_path};
use crate::terraform::Terraform;
use crate::test_support::{
    FixedIpDetector, OPENSSH_PRIVATE_KEY, RecordingShell, ScriptedRunner, terraform_output_json,
};

const BASTION: &str = "34.244.109.234";
const KEYSCAN: &str = "|1|c2FsdA==|aGFzaA== ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIbastion\n";

type TestOrchestrator<'a> =
    AccessOrchestrator<&'a ScriptedRunner, FixedIpDetector, &'a RecordingShell>;

struct Workspace {
    _tmp: TempDir,
    root: Utf8PathBuf,
    runner: ScriptedRunner,
    shell: RecordingShell,
}

impl Workspace {
    fn settings(&self) -> AccessSettings {
        AccessSettings {
            ssh_key_path: self.root.join("ssh/cp_simulator_rsa"),
            ssh_config_path: self.root.join("ssh/cp_simulator_config"),
            perturb_script: self.root.join("simulation-scripts/perturb.sh"),
            host_key_policy: HostKeyPolicy::TrustOnFirstUse,
        }
    }

    fn known_hosts_path(&self) -> Utf8PathBuf {
        self.root.join("ssh/cp_simulator_known_hosts")
    }

    fn orchestrator(&self) -> TestOrchestrator<'_> {
        let settings = self.settings();
        let lifecycle = LifecycleController::new(
            Terraform::new(self.root.join("terraform"), &self.runner),
            KeyStore::new(settings.ssh_key_path.clone(), &self.runner),
            FixedIpDetector::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))),
        );
        AccessOrchestrator::new(
            lifecycle,
            KnownHostsManager::new(self.known_hosts_path(), &self.runner),
            AuthResolver::standard(AgentStrategy::new(None), settings.ssh_key_path.clone()),
            &self.shell,
            &self.runner,
            settings,
        )
    }

    fn push_status(&self, masters: &[&str], nodes: &[&str]) {
        self.runner.push_success();
        self.runner
            .push_stdout(terraform_output_json(BASTION, masters, nodes));
    }

    fn push_usable_status(&self) {
        self.push_status(&["172.31.2.167"], &["172.31.2.19", "172.31.2.20"]);
    }
}

#[fixture]
fn workspace() -> Workspace {
    let tmp = TempDir::new().expect("tempdir");
    let root = utf8_path(tmp.path()).expect("utf8");
    let key = root.join("ssh/cp_simulator_rsa");
    overwrite_file(&key, OPENSSH_PRIVATE_KEY).expect("private key");
    overwrite_file(&public_key_path(&key), "ssh-rsa AAAAB3Nza\n").expect("public key");
    Workspace {
        _tmp: tmp,
        root,
        runner: ScriptedRunner::new(),
        shell: RecordingShell::new(0),
    }
}

fn manifest() -> ScenarioManifest {
    [Scenario {
        id: String::from("container-ambush"),
        name: String::from("Container Ambush"),
        path: String::from("/opt/scenarios/container-ambush"),
    }]
    .into_iter()
    .collect()
}

#[rstest]
#[case::empty_bastion("", &["172.31.2.167"], &["172.31.2.19", "172.31.2.20"])]
#[case::no_masters(BASTION, &[], &["172.31.2.19", "172.31.2.20"])]
#[case::single_node(BASTION, &["172.31.2.167"], &["172.31.2.19"])]
fn unusable_infrastructure_is_refused(
    workspace: Workspace,
    #[case] bastion: &str,
    #[case] masters: &[&str],
    #[case] nodes: &[&str],
) {
    workspace.runner.push_success();
    workspace
        .runner
        .push_stdout(terraform_output_json(bastion, masters, nodes));

    let err = workspace.orchestrator().ssh_config().expect_err("unusable");

    assert!(matches!(err, AccessError::NoInfrastructure), "{err:?}");
    assert_eq!(
        err.to_string(),
        "no infrastructure, please run `simulator infra create`"
    );
}

#[rstest]
fn ssh_config_renders_without_writing(workspace: Workspace) {
    workspace.push_usable_status();

    let config = workspace.orchestrator().ssh_config().expect("config");

    assert!(config.starts_with(&format!("Host bastion\n  HostName {BASTION}\n")));
    assert!(config.contains("Host node-1\n  HostName 172.31.2.20\n"));
    assert!(!file_exists(&workspace.settings().ssh_config_path).expect("exists"));
}

#[rstest]
fn attack_opens_session_with_forwarded_key(workspace: Workspace) {
    workspace.push_usable_status();
    workspace.runner.push_stdout(KEYSCAN);

    let status = workspace.orchestrator().attack().expect("attack");

    assert_eq!(status, 0);
    let sessions = workspace.shell.sessions();
    let [session] = sessions.as_slice() else {
        panic!("expected one session, got {sessions:?}");
    };
    assert_eq!(session.host, BASTION);
    assert_eq!(session.port, 22);
    assert_eq!(session.user, "ubuntu");
    assert_eq!(session.host_key_policy, HostKeyPolicy::TrustOnFirstUse);
    assert_eq!(session.known_hosts_file, workspace.known_hosts_path());
    assert_eq!(
        session.auth,
        AuthMethod::KeyFile {
            path: workspace.settings().ssh_key_path
        }
    );
    assert_eq!(
        session.forwarded_key.as_deref(),
        Some(STANDARD.encode(OPENSSH_PRIVATE_KEY).as_str())
    );
    assert_eq!(
        workspace.runner.command_strings().last().map(String::as_str),
        Some(format!("ssh-keyscan -H {BASTION}").as_str())
    );
}

#[rstest]
fn attack_tolerates_known_hosts_failure(workspace: Workspace) {
    workspace.push_usable_status();
    workspace.runner.push_failure(1);

    workspace.orchestrator().attack().expect("attack proceeds");

    assert_eq!(workspace.shell.sessions().len(), 1);
}

#[rstest]
fn attack_without_credentials_fails_before_dialling(workspace: Workspace) {
    overwrite_file(&workspace.settings().ssh_key_path, "not a key").expect("overwrite key");
    workspace.push_usable_status();
    workspace.runner.push_stdout(KEYSCAN);

    let err = workspace.orchestrator().attack().expect_err("no credential");

    assert!(matches!(err, AccessError::Auth(_)), "{err:?}");
    assert!(workspace.shell.sessions().is_empty());
}

#[rstest]
fn launch_unknown_scenario_checks_nothing_else(workspace: Workspace) {
    let err = workspace
        .orchestrator()
        .launch(&manifest(), "missing")
        .expect_err("unknown scenario");

    assert_eq!(err.to_string(), "scenario missing not found");
    assert!(workspace.runner.invocations().is_empty());
}

#[rstest]
fn launch_writes_config_then_runs_perturb(workspace: Workspace) {
    workspace.push_usable_status();
    workspace.runner.push_stdout(KEYSCAN);
    workspace.runner.push_success();

    workspace
        .orchestrator()
        .launch(&manifest(), "container-ambush")
        .expect("launch");

    let settings = workspace.settings();
    let written = read_file(&settings.ssh_config_path).expect("ssh config");
    assert!(written.starts_with("Host bastion\n"));
    let known_hosts = read_file(&workspace.known_hosts_path()).expect("known hosts");
    assert_eq!(known_hosts, KEYSCAN);

    let invocations = workspace.runner.invocations();
    let perturb = invocations.last().expect("perturb invocation");
    assert_eq!(perturb.mode, OutputMode::Streaming);
    assert_eq!(
        perturb.command_string(),
        format!(
            "{} --bastion {BASTION} --master 172.31.2.167 --nodes 172.31.2.19,172.31.2.20 /opt/scenarios/container-ambush",
            settings.perturb_script
        )
    );
}

#[rstest]
fn launch_surfaces_known_hosts_failure(workspace: Workspace) {
    workspace.push_usable_status();
    workspace.runner.push_failure(1);

    let err = workspace
        .orchestrator()
        .launch(&manifest(), "container-ambush")
        .expect_err("keyscan fails");

    assert!(
        matches!(&err, AccessError::KnownHosts { host, .. } if host == BASTION),
        "{err:?}"
    );
    assert_eq!(workspace.runner.remaining(), 0);
    assert_eq!(workspace.runner.invocations().len(), 3);
}

#[rstest]
fn launch_reports_perturb_exit_status(workspace: Workspace) {
    workspace.push_usable_status();
    workspace.runner.push_stdout(KEYSCAN);
    workspace.runner.push_exit_code(2);

    let err = workspace
        .orchestrator()
        .launch(&manifest(), "container-ambush")
        .expect_err("perturb fails");

    assert!(matches!(err, AccessError::PerturbFailed { .. }), "{err:?}");
}
