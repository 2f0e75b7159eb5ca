//! Subprocess execution utilities.
//!
//! Every external tool invocation in berth goes through [`ProcessBuilder`].
//! The working directory is always an explicit parameter; the process-wide
//! current directory is never mutated.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Result};
use thiserror::Error;

/// Failure from an external command.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Failed {
        command: String,
        code: Option<i32>,
        /// Combined stdout/stderr, present only for quiet invocations.
        output: Option<String>,
        message: String,
    },
}

impl ProcessError {
    /// Exit code of the failed command, if it exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessError::Failed { code, .. } => *code,
            ProcessError::Spawn { .. } => None,
        }
    }

    /// Output captured from a quiet invocation.
    pub fn output(&self) -> Option<&str> {
        match self {
            ProcessError::Failed { output, .. } => output.as_deref(),
            ProcessError::Spawn { .. } => None,
        }
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    failure_message: Option<String>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            failure_message: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Message reported instead of the generic one when the command fails.
    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Run the command to completion, streaming its output to the console.
    pub fn run(&self) -> Result<(), ProcessError> {
        let mut cmd = self.build_command();

        let status = cmd.status().map_err(|source| ProcessError::Spawn {
            command: self.display_command(),
            source,
        })?;

        if !status.success() {
            return Err(self.failed(status.code(), None));
        }

        Ok(())
    }

    /// Run the command with its output buffered.
    ///
    /// Prints `{status_message}...` up front and `OK` on success. On failure
    /// the full captured output is flushed to the console exactly once,
    /// followed by `FAILED`, so diagnostic context is never silently lost.
    pub fn run_quiet(&self, status_message: &str) -> Result<(), ProcessError> {
        print!("{}...", status_message);
        let _ = std::io::stdout().flush();

        let mut cmd = self.build_command();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().map_err(|source| ProcessError::Spawn {
            command: self.display_command(),
            source,
        })?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));

            println!();
            print!("{}", captured);
            println!("FAILED");

            return Err(self.failed(output.status.code(), Some(captured)));
        }

        println!("OK");
        Ok(())
    }

    /// Run the command and capture its standard output.
    pub fn capture(&self) -> Result<String, ProcessError> {
        let mut cmd = self.build_command();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().map_err(|source| ProcessError::Spawn {
            command: self.display_command(),
            source,
        })?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(self.failed(output.status.code(), Some(captured)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn failed(&self, code: Option<i32>, output: Option<String>) -> ProcessError {
        let message = self.failure_message.clone().unwrap_or_else(|| {
            format!(
                "`{}` failed with exit code {:?}",
                self.display_command(),
                code
            )
        });

        ProcessError::Failed {
            command: self.display_command(),
            code,
            output,
            message,
        }
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Find the first executable from a list of candidate names.
pub fn first_existing_executable<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Option<PathBuf> {
    names.into_iter().find_map(find_executable)
}

/// Find an executable or fail with a remediation hint.
pub fn require_executable(name: &str, help: &str) -> Result<PathBuf> {
    find_executable(name)
        .ok_or_else(|| anyhow!("unable to find executable `{}`. {}", name, help))
}

/// Find CMake.
pub fn find_cmake() -> Option<PathBuf> {
    find_executable("cmake")
}
