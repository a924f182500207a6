//! Local store lifecycle through `docker compose`.
//!
//! Argument lists are built by pure functions so they can be tested without
//! Docker; the `run_*` helpers only spawn and report.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

pub const DEFAULT_COMPOSE_FILE: &str = "docker/compose.dev.yaml";
pub const DEFAULT_SERVICE: &str = "r2r";
pub const DEFAULT_EXEC_COMMAND: &str = "/bin/sh";
const COMPOSE_PROFILE: &str = "postgres";
const FAILED_UP_LOG_TAIL: usize = 50;

pub struct ComposeRuntime {
    program: String,
    compose_file: PathBuf,
}

impl ComposeRuntime {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            program: "docker".to_string(),
            compose_file: compose_file.into(),
        }
    }

    /// Use a different executable in place of `docker`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.to_string_lossy().into_owned(),
        ]
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    pub fn up_args(&self, build: bool) -> Vec<String> {
        let mut args = self.args(&["--profile", COMPOSE_PROFILE, "up", "-d"]);
        if build {
            args.push("--build".to_string());
        }
        args
    }

    pub fn down_args(&self) -> Vec<String> {
        self.args(&["--profile", COMPOSE_PROFILE, "down", "--rmi", "local"])
    }

    pub fn ps_args(&self) -> Vec<String> {
        self.args(&["ps"])
    }

    pub fn logs_args(&self) -> Vec<String> {
        self.args(&["logs", "--follow"])
    }

    pub fn tail_logs_args(&self, service: &str) -> Vec<String> {
        self.args(&["logs", &format!("--tail={FAILED_UP_LOG_TAIL}"), service])
    }

    pub fn restart_args(&self) -> Vec<String> {
        self.args(&["restart"])
    }

    /// `service` defaults to `r2r`, `command` to `/bin/sh`.
    pub fn exec_args(&self, service: Option<&str>, command: &[String]) -> Vec<String> {
        let mut args = self.args(&["exec", service.unwrap_or(DEFAULT_SERVICE)]);
        if command.is_empty() {
            args.push(DEFAULT_EXEC_COMMAND.to_string());
        } else {
            args.extend(command.iter().cloned());
        }
        args
    }

    fn spawn(&self, args: &[String]) -> Result<ExitStatus> {
        println!("Running command: {} {}", self.program, args.join(" "));
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                tracing::error!(error = ?e, program = %self.program, "Failed to launch compose process");
                anyhow!("Failed to run '{}': {e}. Is it installed and in PATH?", self.program)
            })
    }

    fn expect_success(&self, status: ExitStatus, what: &str) -> Result<()> {
        if status.success() {
            tracing::info!(status = ?status, "{what} succeeded");
            Ok(())
        } else {
            tracing::error!(status = ?status, "{what} failed");
            Err(anyhow!("{what} failed ({status})"))
        }
    }

    pub fn up(&self, build: bool) -> Result<()> {
        println!("Starting services from {}", self.compose_file.display());
        let status = self.spawn(&self.up_args(build))?;
        if !status.success() {
            println!("Showing recent logs for the '{DEFAULT_SERVICE}' service:");
            let _ = self.spawn(&self.tail_logs_args(DEFAULT_SERVICE));
        }
        self.expect_success(status, "Starting services")
    }

    pub fn down(&self) -> Result<()> {
        let status = self.spawn(&self.down_args())?;
        self.expect_success(status, "Stopping services")
    }

    pub fn logs(&self) -> Result<()> {
        println!("Following logs (Ctrl+C to stop)...");
        let status = self.spawn(&self.logs_args())?;
        self.expect_success(status, "Following logs")
    }

    pub fn restart(&self) -> Result<()> {
        let status = self.spawn(&self.restart_args())?;
        self.expect_success(status, "Restarting services")
    }

    /// Runs the command interactively and returns its exit code.
    pub fn exec(&self, service: Option<&str>, command: &[String]) -> Result<i32> {
        let status = self.spawn(&self.exec_args(service, command))?;
        Ok(status.code().unwrap_or(1))
    }

    /// Prints the service table, or a notice when nothing is running.
    pub fn ps(&self) -> Result<()> {
        let args = self.ps_args();
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| anyhow!("Failed to run '{}': {e}. Is it installed and in PATH?", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status, stderr = %stderr.trim(), "Listing services failed");
            return Err(anyhow!("Listing services failed ({}): {}", output.status, stderr.trim()));
        }
        println!("{}", render_ps(&String::from_utf8_lossy(&output.stdout)));
        Ok(())
    }
}

/// `docker compose ps` prints a header line even when nothing runs.
pub fn render_ps(stdout: &str) -> String {
    let trimmed = stdout.trim();
    if trimmed.lines().count() > 1 {
        trimmed.to_string()
    } else {
        "No services are running.".to_string()
    }
}
