//! Child process execution for the external tools the simulator drives.
//!
//! Terraform, `ssh-keygen`, `ssh-keyscan`, and the scenario perturb script all
//! run through the [`CommandRunner`] abstraction so orchestration code can be
//! exercised with scripted fakes. The real runner either streams the child's
//! output live while buffering it, or runs it silently and only captures it.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use thiserror::Error;

use crate::fs::resolve_absolute;

/// Exit status conventionally reported by a shell when a command is missing.
pub const COMMAND_NOT_FOUND_EXIT_CODE: i32 = 127;

/// How a child's output is surfaced while it runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputMode {
    /// Copy stdout and stderr to this process's streams while buffering them.
    #[default]
    Streaming,
    /// Capture stdout and stderr without echoing anything.
    Silent,
}

/// Description of a single child process invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandSpec {
    /// Program to execute, resolved through `PATH`.
    pub program: String,
    /// Arguments passed verbatim to the program.
    pub args: Vec<OsString>,
    /// Working directory; resolved to an absolute path before spawning.
    pub working_dir: Option<Utf8PathBuf>,
    /// Variables appended to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Output handling for the invocation.
    pub mode: OutputMode,
}

impl CommandSpec {
    /// Starts a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Selects the output mode.
    #[must_use]
    pub const fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Renders the invocation as a shell-escaped command line for messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(escape(self.program.as_str().into()).into_owned());
        for arg in &self.args {
            let text = arg.to_string_lossy();
            parts.push(escape(text).into_owned());
        }
        parts.join(" ")
    }
}

/// Classification of a finished child process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitOutcome {
    /// The process exited with status zero.
    Success,
    /// The process exited with the shell's "command not found" status.
    ToolNotFound,
    /// The process failed; `None` when it was terminated by a signal.
    Failed(Option<i32>),
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Classifies the exit status.
    #[must_use]
    pub const fn outcome(&self) -> ExitOutcome {
        match self.code {
            Some(0) => ExitOutcome::Success,
            Some(COMMAND_NOT_FOUND_EXIT_CODE) => ExitOutcome::ToolNotFound,
            other => ExitOutcome::Failed(other),
        }
    }

    /// Describes the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors raised before a child process produces an exit status.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Raised when the working directory cannot be resolved.
    #[error("failed to resolve working directory for {program}: {source}")]
    WorkingDir {
        /// Program that was about to run.
        program: String,
        /// Underlying filesystem error.
        #[source]
        source: crate::fs::FsError,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Raised when copying the child's output or waiting on it fails.
    #[error("failed while running {program}: {source}")]
    Io {
        /// Command being run.
        program: String,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs the described command to completion.
    ///
    /// A non-zero exit status is not an error at this level; callers inspect
    /// [`CommandOutput::outcome`].
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the command cannot be started or its
    /// output cannot be collected.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        (**self).run(spec)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        command.envs(spec.env.iter().map(|(key, value)| (key, value)));
        if let Some(dir) = &spec.working_dir {
            let absolute = resolve_absolute(dir).map_err(|source| ProcessError::WorkingDir {
                program: spec.program.clone(),
                source,
            })?;
            command.current_dir(absolute);
        }

        match spec.mode {
            OutputMode::Silent => run_silent(&mut command, &spec.program),
            OutputMode::Streaming => run_streaming(&mut command, &spec.program),
        }
    }
}

fn run_silent(command: &mut Command, program: &str) -> Result<CommandOutput, ProcessError> {
    let output = command.output().map_err(|source| ProcessError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn run_streaming(command: &mut Command, program: &str) -> Result<CommandOutput, ProcessError> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_owned(),
            source,
        })?;

    let io_error = |source| ProcessError::Io {
        program: program.to_owned(),
        source,
    };
    let child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(io::Error::other("stdout pipe missing")))?;
    let child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error(io::Error::other("stderr pipe missing")))?;

    let (stdout, stderr) = thread::scope(|scope| {
        let stderr_pump = scope.spawn(move || tee(child_stderr, io::stderr()));
        let stdout_result = tee(child_stdout, io::stdout());
        let stderr_result = stderr_pump
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stderr forwarding thread panicked")));
        (stdout_result, stderr_result)
    });

    let status = child.wait().map_err(io_error)?;
    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout.map_err(io_error)?,
        stderr: stderr.map_err(io_error)?,
    })
}

/// Copies `source` to `sink` chunk by chunk, returning everything read.
fn tee(mut source: impl Read, mut sink: impl Write) -> io::Result<String> {
    let mut captured = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        captured.extend_from_slice(chunk);
        sink.write_all(chunk)?;
        sink.flush()?;
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
