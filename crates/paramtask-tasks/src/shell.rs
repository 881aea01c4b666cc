//! Shell command task bodies

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Instant;

use paramtask_core::ParamBag;
use regex::Regex;
use tracing::{debug, warn};

use crate::task::{Task, TaskError, TaskResult};

/// `{name}` placeholders in a command template
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_$][A-Za-z0-9_.$-]*)\}").expect("Invalid regex"));

/// Prefix of the environment variables a command receives its parameters in
pub const ENV_PREFIX: &str = "PARAMTASK_";

/// Result of running a shell command
#[derive(Debug, Clone)]
pub struct ShellOutput {
    /// Command line as executed
    pub command: String,
    /// Whether the command succeeded
    pub success: bool,
    /// Exit code
    pub exit_code: Option<i32>,
    /// Captured stdout, empty unless capturing
    pub stdout: String,
    /// Captured stderr, empty unless capturing
    pub stderr: String,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// A shell command template run with task parameters
#[derive(Debug, Clone)]
pub struct ShellCommand {
    name: String,
    template: String,
    cwd: Option<PathBuf>,
    capture: bool,
}

impl ShellCommand {
    /// Create a command; output goes to the terminal
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            cwd: None,
            capture: false,
        }
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Capture output instead of inheriting the terminal
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute `{param}` placeholders; unknown ones are left as written
    pub fn render(&self, params: &ParamBag) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                match params.get(key) {
                    Some(value) => value.to_string(),
                    None => {
                        warn!(task = %self.name, placeholder = key, "no parameter for placeholder");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Environment variables carrying the parameters
    pub fn env(params: &ParamBag) -> BTreeMap<String, String> {
        params
            .iter()
            .map(|(key, value)| (env_name(key), value.to_string()))
            .collect()
    }

    /// Run the command with the given parameters
    pub fn execute(&self, params: &ParamBag) -> Result<ShellOutput, TaskError> {
        let start = Instant::now();
        let command = self.render(params);
        debug!(task = %self.name, command = %command, "running shell command");

        let shell = if cfg!(windows) { "cmd" } else { "sh" };
        let shell_arg = if cfg!(windows) { "/C" } else { "-c" };

        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg).arg(&command);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(Self::env(params));

        let (success, exit_code, stdout, stderr) = if self.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            let output = cmd.output().map_err(|e| self.spawn_error(&command, e))?;
            (
                output.status.success(),
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            )
        } else {
            let status = cmd.status().map_err(|e| self.spawn_error(&command, e))?;
            (status.success(), status.code(), String::new(), String::new())
        };

        Ok(ShellOutput {
            command,
            success,
            exit_code,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run and turn a non-zero exit into a task failure
    pub fn run(&self, params: &ParamBag) -> TaskResult {
        let output = self.execute(params)?;
        if output.success {
            Ok(())
        } else {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(TaskError::Failed(format!(
                "`{}` exited with {}",
                output.command, code
            )))
        }
    }

    /// Task body running this command with its parameters
    pub fn into_task(self) -> Task {
        let name = self.name.clone();
        Task::from_fn(name, move |params| self.run(params))
    }

    fn spawn_error(&self, command: &str, error: std::io::Error) -> TaskError {
        TaskError::Failed(format!("{}: failed to run `{command}`: {error}", self.name))
    }
}

/// `dry-run` -> `PARAMTASK_DRY_RUN`
fn env_name(key: &str) -> String {
    let mut name = String::from(ENV_PREFIX);
    name.extend(key.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}
