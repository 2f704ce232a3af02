//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use rstest::rstest;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("simulator");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[rstest]
#[case(&["--help"], "infra")]
#[case(&["infra", "--help"], "destroy")]
#[case(&["ssh", "attack", "--help"], "--host-key-policy")]
#[case(&["scenario", "launch", "--help"], "<ID>")]
fn help_lists_commands(#[case] args: &[&str], #[case] expected: &str) {
    let mut cmd = cargo_bin_cmd!("simulator");
    cmd.args(args)
        .assert()
        .success()
        .stdout(contains(expected));
}

#[test]
fn unknown_host_key_policy_is_rejected_before_any_work() {
    let mut cmd = cargo_bin_cmd!("simulator");
    cmd.args(["ssh", "attack", "--host-key-policy", "lenient"])
        .assert()
        .failure()
        .stderr(contains("invalid value"));
}

#[test]
fn invalid_configured_policy_is_reported() {
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("simulator");
    cmd.current_dir(tmp.path())
        .env("SIMULATOR_HOST_KEY_POLICY", "lenient")
        .args(["infra", "status"])
        .assert()
        .code(1)
        .stderr(contains("invalid host_key_policy"));
}
