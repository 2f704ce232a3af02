//! Unit tests for configuration validation and path resolution.

use camino::Utf8PathBuf;
use rstest::*;
use simulator::ssh::HostKeyPolicy;
use simulator::{ConfigError, HomeDir, SimulatorConfig};

#[fixture]
fn valid_config() -> SimulatorConfig {
    SimulatorConfig {
        tf_dir: String::from("./terraform/deployments/AWS"),
        tf_bin: String::from("terraform"),
        scenarios_dir: String::from("./simulation-scripts/scenario"),
        perturb_script: String::from("./simulation-scripts/perturb.sh"),
        state_bucket: None,
        attack_container_tag: None,
        ssh_key_path: String::from("~/.ssh/cp_simulator_rsa"),
        ssh_config_path: String::from("~/.ssh/cp_simulator_config"),
        known_hosts_path: String::from("~/.ssh/cp_simulator_known_hosts"),
        ssh_keygen_bin: String::from("ssh-keygen"),
        ssh_keyscan_bin: String::from("ssh-keyscan"),
        public_ip_url: String::from("https://checkip.amazonaws.com"),
        host_key_policy: String::from("strict"),
        tolerate_missing_terraform: false,
    }
}

#[rstest]
fn valid_config_passes(valid_config: SimulatorConfig) {
    assert_eq!(valid_config.validate(), Ok(()));
}

#[rstest]
#[case::tf_dir(|cfg: &mut SimulatorConfig| cfg.tf_dir.clear(), "SIMULATOR_TF_DIR", "tf_dir")]
#[case::tf_bin(|cfg: &mut SimulatorConfig| cfg.tf_bin = String::from("  "), "SIMULATOR_TF_BIN", "tf_bin")]
#[case::scenarios(
    |cfg: &mut SimulatorConfig| cfg.scenarios_dir.clear(),
    "SIMULATOR_SCENARIOS_DIR",
    "scenarios_dir"
)]
#[case::perturb(
    |cfg: &mut SimulatorConfig| cfg.perturb_script.clear(),
    "SIMULATOR_PERTURB_SCRIPT",
    "perturb_script"
)]
#[case::key(
    |cfg: &mut SimulatorConfig| cfg.ssh_key_path.clear(),
    "SIMULATOR_SSH_KEY_PATH",
    "ssh_key_path"
)]
#[case::known_hosts(
    |cfg: &mut SimulatorConfig| cfg.known_hosts_path.clear(),
    "SIMULATOR_KNOWN_HOSTS_PATH",
    "known_hosts_path"
)]
#[case::ip_url(
    |cfg: &mut SimulatorConfig| cfg.public_ip_url.clear(),
    "SIMULATOR_PUBLIC_IP_URL",
    "public_ip_url"
)]
fn blank_fields_produce_actionable_errors(
    mut valid_config: SimulatorConfig,
    #[case] mutate: fn(&mut SimulatorConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);

    let error = valid_config.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains("simulator.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
#[case("strict", HostKeyPolicy::Strict)]
#[case("tofu", HostKeyPolicy::TrustOnFirstUse)]
#[case("Accept-Any", HostKeyPolicy::AcceptAny)]
fn host_key_policy_names_parse(
    mut valid_config: SimulatorConfig,
    #[case] name: &str,
    #[case] expected: HostKeyPolicy,
) {
    valid_config.host_key_policy = String::from(name);
    assert_eq!(valid_config.host_key_policy(), Ok(expected));
}

#[rstest]
fn unknown_host_key_policy_fails_validation(mut valid_config: SimulatorConfig) {
    valid_config.host_key_policy = String::from("lenient");

    let error = valid_config.validate().expect_err("unknown policy");

    assert!(matches!(error, ConfigError::HostKeyPolicy(_)), "{error:?}");
    assert!(error.to_string().contains("lenient"), "{error}");
}

#[rstest]
fn paths_expand_against_the_home_directory(valid_config: SimulatorConfig) {
    let home = HomeDir::fixed("/home/operator");

    let paths = valid_config.resolve_paths(&home).expect("resolve");

    assert_eq!(
        paths.ssh_key_path,
        Utf8PathBuf::from("/home/operator/.ssh/cp_simulator_rsa")
    );
    assert_eq!(
        paths.known_hosts_path,
        Utf8PathBuf::from("/home/operator/.ssh/cp_simulator_known_hosts")
    );
    assert_eq!(
        paths.tf_dir,
        Utf8PathBuf::from("./terraform/deployments/AWS")
    );
}

#[rstest]
fn tilde_paths_need_a_home_directory(valid_config: SimulatorConfig) {
    let home = HomeDir::with_lookup(|| None);

    let error = valid_config.resolve_paths(&home).expect_err("no home");

    assert!(matches!(error, ConfigError::HomeDir(_)), "{error:?}");
}
