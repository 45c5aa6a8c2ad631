//! Process execution for platform probes.
//!
//! Probes never spawn processes directly; they go through a [`CommandRunner`]
//! so that tests can script outputs and so that the container adapter can
//! rewrite every invocation through a [`CommandHook`].

use std::process::Command;

use crate::error::PlatformInfoError;

/// Raw result of a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// `None` when the runner produced no stdout at all, which is not the same as empty output
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CommandOutput {
    #[must_use]
    pub fn new(exit_code: i32, stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    #[must_use]
    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    #[must_use]
    pub fn stderr_text(&self) -> &str {
        self.stderr.as_deref().unwrap_or_default()
    }

    /// Stdout of a successful run, or the error an essential fact should surface.
    ///
    /// # Errors
    /// `CommandFailed` on a non-zero exit, `NullResponse` when stdout is absent.
    pub fn require_stdout(&self, command: &str) -> Result<&str, PlatformInfoError> {
        if !self.success() {
            return Err(PlatformInfoError::CommandFailed {
                command: command.to_owned(),
                exit_code: self.exit_code,
                stderr: self.stderr_text().trim().to_owned(),
            });
        }
        self.stdout().ok_or_else(|| PlatformInfoError::NullResponse {
            command: command.to_owned(),
        })
    }
}

/// Flattened `program arg1 arg2` form used in logs and errors
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs an external program and captures its output
pub trait CommandRunner {
    /// # Errors
    /// Fails only when the program cannot be launched. A non-zero exit is reported
    /// through [`CommandOutput::exit_code`].
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PlatformInfoError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PlatformInfoError> {
        (**self).execute(program, args)
    }
}

/// [`CommandRunner`] backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PlatformInfoError> {
        let output = Command::new(program).args(args).output().map_err(|e| {
            PlatformInfoError::Launch {
                command: command_line(program, args),
                source: e,
            }
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::trace!(
            command = %command_line(program, args),
            exit_code,
            "Command finished"
        );

        Ok(CommandOutput {
            exit_code,
            stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        })
    }
}

/// Rewrites an invocation before it reaches the underlying runner
pub trait CommandHook {
    /// Returns the full argv (program first) to execute instead of `program args`
    fn rewrite(&self, program: &str, args: &[&str]) -> Vec<String>;
}

/// Runner that applies a [`CommandHook`] to every invocation
#[derive(Debug, Clone)]
pub struct HookedRunner<R, H> {
    inner: R,
    hook: H,
}

impl<R, H> HookedRunner<R, H> {
    #[must_use]
    pub const fn new(inner: R, hook: H) -> Self {
        Self { inner, hook }
    }

    #[must_use]
    pub const fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: CommandRunner, H: CommandHook> CommandRunner for HookedRunner<R, H> {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, PlatformInfoError> {
        let argv = self.hook.rewrite(program, args);
        let Some((rewritten, rest)) = argv.split_first() else {
            return Err(PlatformInfoError::Configuration(format!(
                "command hook produced an empty invocation for `{}`",
                command_line(program, args)
            )));
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
        self.inner.execute(rewritten, &rest)
    }
}
