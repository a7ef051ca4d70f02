//! Bash tool - executes shell commands
//!
//! Commands run in their own process group with no stdin, so cancellation
//! and timeouts can kill the whole subprocess tree.

use super::{Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const MAX_OUTPUT_CHARS: usize = 128 * 1024;
const SNIP_CHARS: usize = 4 * 1024; // each end
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SLOW_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ExecutionMode {
    #[default]
    Default,
    Slow,
}

impl ExecutionMode {
    fn timeout(self) -> Duration {
        match self {
            ExecutionMode::Default => DEFAULT_TIMEOUT,
            ExecutionMode::Slow => SLOW_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    mode: ExecutionMode,
}

/// Bash tool for command execution
pub struct BashTool;

impl BashTool {
    async fn execute(
        command: &str,
        working_dir: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", command])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // New process group led by the shell, so kill(-pgid) reaches descendants
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::Failed(format!("Failed to spawn process: {e}")))?;
        let pid = child.id();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                Self::kill_process_group(pid);
                Err(ToolError::Interrupted)
            }

            () = tokio::time::sleep(timeout) => {
                Self::kill_process_group(pid);
                Ok(ToolOutput::error(format!("[command timed out after {timeout:?}]")))
            }

            result = child.wait_with_output() => {
                let output = result
                    .map_err(|e| ToolError::Failed(format!("Command execution failed: {e}")))?;
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let formatted = Self::truncate_output(&combined);

                if output.status.success() {
                    Ok(ToolOutput::success(formatted))
                } else {
                    let exit_code = output.status.code().unwrap_or(-1);
                    Ok(ToolOutput::error(format!(
                        "[command failed: exit code {exit_code}]\n{formatted}"
                    )))
                }
            }
        }
    }

    /// Kill a process group immediately with SIGKILL.
    #[cfg(unix)]
    fn kill_process_group(pid: Option<u32>) {
        let Some(pid) = pid else { return };
        let pgid = Pid::from_raw(pid.cast_signed());
        tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    fn kill_process_group(_pid: Option<u32>) {}

    /// Keep both ends of oversized output, counted in characters.
    fn truncate_output(output: &str) -> String {
        let total = output.chars().count();
        if total <= MAX_OUTPUT_CHARS {
            return output.to_string();
        }

        let start: String = output.chars().take(SNIP_CHARS).collect();
        let end: String = output.chars().skip(total - SNIP_CHARS).collect();

        format!(
            "[output truncated in middle: got {total} chars, max is {MAX_OUTPUT_CHARS} chars]\n{start}\n\n[snip]\n\n{end}"
        )
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> String {
        r#"Executes shell commands via bash -c, returning combined stdout/stderr.
Bash state changes (working dir, variables, aliases) don't persist between calls.

Use mode="slow" for potentially slow commands: builds, downloads,
installs, tests, or any other substantive operation.

For complex scripts, write them to a file first and then execute the file."#
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute via bash -c"
                },
                "mode": {
                    "type": "string",
                    "enum": ["default", "slow"],
                    "description": "Execution mode: default (30s timeout), slow (15min timeout)"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: BashInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid input: {e}"))),
        };

        if input.command.trim().is_empty() {
            return Ok(ToolOutput::error("Command cannot be empty"));
        }

        Self::execute(&input.command, &ctx.working_dir, input.mode.timeout(), &ctx.cancel).await
    }
}
