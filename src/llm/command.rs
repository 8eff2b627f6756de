//! Generation through an LLM command-line tool.
//!
//! The prompt is written to the child's stdin and stdout is taken as the
//! response. Defaults to `claude --print`.

use super::{GenerateRequest, TextGenerator};
use crate::errors::CapabilityError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

/// Text sent on stdin: standing instructions, then the prompt.
pub fn render_stdin(request: &GenerateRequest) -> String {
    if request.instructions.trim().is_empty() {
        request.prompt.clone()
    } else {
        format!(
            "## INSTRUCTIONS\n{}\n\n## REQUEST\n{}",
            request.instructions.trim(),
            request.prompt
        )
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<String, CapabilityError> {
        let capability = format!("generate[{}]", request.agent);
        if request.options != Default::default() {
            tracing::debug!(
                agent = %request.agent,
                program = %self.program,
                "sampling options are not forwarded to command backends"
            );
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            CapabilityError::failed(&capability, format!("failed to spawn {}: {}", self.program, e))
        })?;

        let input = render_stdin(&request);
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapabilityError::failed(&capability, "failed to open stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CapabilityError::failed(&capability, "failed to open stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CapabilityError::failed(&capability, "failed to open stderr"))?;

        // Feed stdin while draining stdout/stderr so large prompts can't deadlock on pipe buffers.
        let write_stdin = async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        };
        let mut output = String::new();
        let mut errors = String::new();
        let (written, read_out, read_err) = tokio::join!(
            write_stdin,
            stdout.read_to_string(&mut output),
            stderr.read_to_string(&mut errors),
        );
        read_out.map_err(|e| CapabilityError::failed(&capability, format!("failed to read output: {e}")))?;
        if let Err(e) = read_err {
            tracing::debug!(agent = %request.agent, error = %e, "failed to read stderr");
        }

        let status = child
            .wait()
            .await
            .map_err(|e| CapabilityError::failed(&capability, format!("failed to wait for process: {e}")))?;

        if !status.success() {
            return Err(CapabilityError::failed(
                &capability,
                format!(
                    "{} exited with code {}: {}",
                    self.program,
                    status.code().unwrap_or(-1),
                    errors.trim()
                ),
            ));
        }
        // A child that exits without reading stdin is reported by its exit status above.
        written.map_err(|e| CapabilityError::failed(&capability, format!("failed to write prompt: {e}")))?;

        Ok(output.trim_end().to_string())
    }
}
