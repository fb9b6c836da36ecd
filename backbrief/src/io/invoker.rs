//! Agent invocation.
//!
//! The [`AgentInvoker`] trait decouples the phase drivers from the agent
//! backend (the `claude` CLI by default). Each call spawns one fresh process;
//! nothing carries over between calls except files. Tests use scripted
//! invokers that write predetermined artifacts without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::config::AgentConfig;
use super::process::{CommandOutput, run_command};
use super::{read_non_empty, write_atomic};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Short name used for the log file (e.g. `plan-2`, `task-0`).
    pub label: String,
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Extra directories the agent may read and write.
    pub add_dirs: Vec<PathBuf>,
    /// Prompt text, delivered on stdin.
    pub prompt: String,
    /// File the agent was told to write.
    pub output_path: PathBuf,
    /// Where stdout/stderr of the run are recorded.
    pub log_path: PathBuf,
}

/// Raw result of running the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResult {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
}

/// Abstraction over agent backends.
pub trait AgentInvoker {
    /// Run the agent once. A non-zero exit is reported in the result, not as
    /// an error; `Err` means the agent could not be run at all.
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResult>;
}

/// Invoker that spawns the configured agent command (`claude -p`).
#[derive(Debug, Clone)]
pub struct ClaudeInvoker {
    config: AgentConfig,
}

impl ClaudeInvoker {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &InvokeRequest) -> Result<Command> {
        let (program, fixed_args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(fixed_args);
        for dir in &request.add_dirs {
            cmd.arg("--add-dir").arg(dir);
        }
        if let Some(model) = &self.config.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(budget) = self.config.max_budget_usd {
            cmd.arg("--max-budget-usd").arg(budget.to_string());
        }
        if self.config.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        cmd.current_dir(&request.workdir);
        Ok(cmd)
    }
}

impl AgentInvoker for ClaudeInvoker {
    #[instrument(skip_all, fields(label = %request.label, prompt_bytes = request.prompt.len()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResult> {
        info!(workdir = %request.workdir.display(), "starting agent");
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let cmd = self.command(request)?;
        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .context("run agent")?;

        write_invocation_log(&request.log_path, request, &output)?;

        if output.timed_out {
            warn!(timeout_secs = ?self.config.timeout_secs, "agent timed out");
        }
        Ok(InvokeResult {
            exit_code: output.status.code(),
            success: output.status.success() && !output.timed_out,
            stdout: output.stdout_text(),
        })
    }
}

/// Where an invocation's result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// The agent wrote its designated file.
    File(String),
    /// The file was missing or empty; captured stdout was used instead and
    /// written to the designated path.
    Stdout(String),
    /// Neither the file nor stdout had content.
    Missing,
}

/// Outcome of [`invoke_for_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub exit_code: Option<i32>,
    pub artifact: Artifact,
}

impl Invocation {
    pub fn text(&self) -> Option<&str> {
        match &self.artifact {
            Artifact::File(text) | Artifact::Stdout(text) => Some(text),
            Artifact::Missing => None,
        }
    }
}

/// Run the agent and collect its designated output.
///
/// Any stale output file is removed first so the artifact always comes from
/// this call. A non-zero exit or a failure to run the agent is logged as a
/// warning and the call proceeds with whatever output exists.
#[instrument(skip_all, fields(label = %request.label, output_path = %request.output_path.display()))]
pub fn invoke_for_artifact<I: AgentInvoker + ?Sized>(
    invoker: &I,
    request: &InvokeRequest,
) -> Result<Invocation> {
    if request.output_path.exists() {
        fs::remove_file(&request.output_path).with_context(|| {
            format!("remove stale output {}", request.output_path.display())
        })?;
    }

    let result = match invoker.invoke(request) {
        Ok(result) => result,
        Err(err) => {
            warn!(err = %err, "agent invocation failed");
            InvokeResult {
                exit_code: None,
                success: false,
                stdout: String::new(),
            }
        }
    };
    if !result.success {
        warn!(exit_code = ?result.exit_code, "agent exited unsuccessfully; using available output");
    }

    let artifact = collect_artifact(&request.output_path, &result.stdout)?;
    Ok(Invocation {
        exit_code: result.exit_code,
        artifact,
    })
}

fn collect_artifact(output_path: &Path, stdout: &str) -> Result<Artifact> {
    if let Some(text) = read_non_empty(output_path)? {
        debug!("agent wrote designated output");
        return Ok(Artifact::File(text));
    }
    if !stdout.trim().is_empty() {
        warn!(path = %output_path.display(), "designated output missing; falling back to stdout");
        write_atomic(output_path, stdout)?;
        return Ok(Artifact::Stdout(stdout.to_string()));
    }
    warn!(path = %output_path.display(), "agent produced no output");
    Ok(Artifact::Missing)
}

fn write_invocation_log(path: &Path, request: &InvokeRequest, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut buf = format!(
        "=== {} ===\nexit code: {:?}\nprompt bytes: {}\n",
        request.label,
        output.status.code(),
        request.prompt.len()
    );
    buf.push_str("\n=== stdout ===\n");
    buf.push_str(&output.stdout_text());
    buf.push_str(&output.truncated_notice("stdout", output.stdout_truncated));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_text());
    buf.push_str(&output.truncated_notice("stderr", output.stderr_truncated));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}
