//! Tests for the Terraform driver.

use super::*;
use crate::test_support::ScriptedRunner;
use rstest::{fixture, rstest};

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

#[rstest]
#[case(TerraformCommand::Output, "output -json")]
#[case(TerraformCommand::Init, "init -input=false")]
#[case(
    TerraformCommand::Plan,
    "plan -input=false --var-file=settings/bastion.tfVars -out=tfplan"
)]
#[case(TerraformCommand::Apply, "apply -input=false -auto-approve tfplan")]
#[case(TerraformCommand::Destroy, "destroy -input=false -auto-approve")]
fn argument_lists_are_fixed(#[case] command: TerraformCommand, #[case] expected: &str) {
    assert_eq!(command.args().join(" "), expected);
}

#[rstest]
fn run_passes_directory_environment_and_mode(runner: ScriptedRunner) {
    runner.push_stdout("{}");
    let terraform = Terraform::new("/infra/aws", &runner).with_bin("/opt/terraform");

    let stdout = terraform.run(TerraformCommand::Output).expect("output");

    assert_eq!(stdout, "{}");
    let calls = runner.invocations();
    let call = calls.first().expect("one invocation");
    assert_eq!(call.command_string(), "/opt/terraform output -json");
    assert_eq!(call.working_dir.as_deref(), Some(Utf8Path::new("/infra/aws")));
    assert_eq!(
        call.env,
        vec![(String::from("TF_IS_IN_AUTOMATION"), String::from("1"))]
    );
    assert_eq!(call.mode, OutputMode::Silent);
}

#[rstest]
fn streaming_commands_stream(runner: ScriptedRunner) {
    runner.push_success();
    let terraform = Terraform::new("/infra", &runner);
    terraform.run(TerraformCommand::Apply).expect("apply");
    let calls = runner.invocations();
    assert_eq!(
        calls.first().map(|call| call.mode),
        Some(OutputMode::Streaming)
    );
}

#[rstest]
fn failure_names_subcommand_and_keeps_stderr(runner: ScriptedRunner) {
    runner.push_output(Some(1), "", "Error: bucket missing");
    let terraform = Terraform::new("/infra", &runner);

    let err = terraform
        .run(TerraformCommand::Plan)
        .expect_err("plan should fail");

    assert_eq!(err.command(), TerraformCommand::Plan);
    let TerraformError::CommandFailure { status, stderr, .. } = &err else {
        panic!("expected CommandFailure, got {err:?}");
    };
    assert_eq!(*status, Some(1));
    assert_eq!(stderr, "Error: bucket missing");
    assert!(err.to_string().contains("terraform plan exited with status 1"));
}

#[rstest]
fn status_127_is_an_error_by_default(runner: ScriptedRunner) {
    runner.push_exit_code(127);
    let terraform = Terraform::new("/infra", &runner);

    let err = terraform
        .run(TerraformCommand::Init)
        .expect_err("missing tool should fail");

    assert!(matches!(
        err,
        TerraformError::ToolNotFound {
            command: TerraformCommand::Init
        }
    ));
}

#[rstest]
fn status_127_can_be_tolerated(runner: ScriptedRunner) {
    runner.push_output(Some(127), "ignored", "terraform: not found");
    let terraform = Terraform::new("/infra", &runner).tolerate_missing_tool(true);

    let stdout = terraform.run(TerraformCommand::Output).expect("tolerated");

    assert_eq!(stdout, "");
}

#[rstest]
fn signal_termination_is_a_failure(runner: ScriptedRunner) {
    runner.push_output(None, "", "");
    let terraform = Terraform::new("/infra", &runner).tolerate_missing_tool(true);

    let err = terraform
        .run(TerraformCommand::Destroy)
        .expect_err("signal should fail");

    assert!(err.to_string().contains("status unknown"));
}

#[rstest]
fn spawn_errors_are_wrapped(runner: ScriptedRunner) {
    let terraform = Terraform::new("/infra", &runner);
    let err = terraform
        .run(TerraformCommand::Init)
        .expect_err("no scripted response");
    assert!(matches!(err, TerraformError::Process { .. }));
}
