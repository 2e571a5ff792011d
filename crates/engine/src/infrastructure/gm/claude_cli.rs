//! Claude CLI subprocess provider.
//!
//! Two call shapes, matching what the CLI supports:
//! - First call: `--output-format json`, buffered. The final envelope
//!   carries the result text plus a `session_id` we keep for continuation.
//! - Resumed call: `--resume <id> --output-format text`, streamed. Only
//!   the latest user message is sent; the CLI session holds the history.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::infrastructure::ports::{flatten_history, GmError, GmPort, GmTurn, MessageSink};
use crate::infrastructure::session::{ConversationTurn, Role};

use super::stream::{parse_text, LineStreamer};

pub struct ClaudeCliProvider {
    model: String,
    oauth_token: Option<String>,
}

impl ClaudeCliProvider {
    pub fn new(model: &str, oauth_token: Option<String>) -> Self {
        Self {
            model: model.to_string(),
            oauth_token,
        }
    }
}

#[async_trait]
impl GmPort for ClaudeCliProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        on_message: &MessageSink,
        resume_id: Option<&str>,
    ) -> GmTurn {
        match self.run(system_prompt, history, on_message, resume_id).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::error!(error = %e, "Claude CLI invocation failed");
                let mut turn = GmTurn::default();
                turn.push_error(e.to_string(), on_message);
                turn
            }
        }
    }
}

impl ClaudeCliProvider {
    async fn run(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        on_message: &MessageSink,
        resume_id: Option<&str>,
    ) -> Result<GmTurn, GmError> {
        // Resume: only the latest user message, the CLI session has the rest.
        // New session: the full flattened conversation.
        let prompt = match resume_id {
            Some(_) => history
                .last()
                .filter(|turn| turn.role == Role::User)
                .map(|turn| turn.content.clone())
                .unwrap_or_default(),
            None => {
                // Embed the system prompt in the body AND pass it via
                // --system-prompt for maximum enforcement.
                format!(
                    "[SYSTEM INSTRUCTIONS — YOU MUST FOLLOW THESE EXACTLY]\n{}\n[END SYSTEM INSTRUCTIONS]\n\n{}",
                    system_prompt,
                    flatten_history(history)
                )
            }
        };

        tracing::info!(
            resume = resume_id.is_some(),
            prompt_len = prompt.len(),
            "Invoking Claude CLI"
        );

        let mut cmd = Command::new("claude");
        cmd.arg("-p").arg("--model").arg(&self.model);
        match resume_id {
            Some(id) => {
                cmd.args(["--resume", id, "--output-format", "text"]);
            }
            None => {
                cmd.args(["--output-format", "json", "--system-prompt", system_prompt]);
            }
        }
        if let Some(token) = &self.oauth_token {
            cmd.env("CLAUDE_CODE_OAUTH_TOKEN", token);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            // Dropping stdin closes the pipe so the CLI starts generating.
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        tracing::warn!(stderr = %line, "Claude CLI stderr");
                    }
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GmError::InvalidResponse("no stdout pipe".to_string()))?;

        let mut turn = if resume_id.is_some() {
            self.stream_stdout(stdout, on_message).await
        } else {
            self.buffer_stdout(stdout, on_message).await?
        };

        let status = child.wait().await?;
        if !status.success() {
            tracing::warn!(status = %status, "Claude CLI exited non-zero");
        }

        if turn.provider_session_id.is_none() {
            turn.provider_session_id = resume_id.map(str::to_string);
        }
        Ok(turn)
    }

    /// Streaming text mode: emit messages as complete lines arrive.
    async fn stream_stdout(
        &self,
        stdout: tokio::process::ChildStdout,
        on_message: &MessageSink,
    ) -> GmTurn {
        let mut streamer = LineStreamer::new();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => streamer.push_chunk(&line, on_message),
                Err(e) => {
                    tracing::warn!(error = %e, "Claude CLI stdout read failed");
                    break;
                }
            }
        }
        streamer.finish(on_message)
    }

    /// JSON envelope mode: buffer everything, then extract the session id
    /// and result text. Malformed envelopes degrade to a plain-text parse.
    async fn buffer_stdout(
        &self,
        mut stdout: tokio::process::ChildStdout,
        on_message: &MessageSink,
    ) -> Result<GmTurn, GmError> {
        let mut buffer = String::new();
        stdout.read_to_string(&mut buffer).await?;

        match serde_json::from_str::<serde_json::Value>(&buffer) {
            Ok(envelope) => {
                let session_id = envelope
                    .get("session_id")
                    .or_else(|| envelope.get("sessionId"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let result = envelope
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let (messages, hp_changes) = parse_text(&result, on_message);
                tracing::info!(session_id = ?session_id, "Claude CLI session established");
                Ok(GmTurn {
                    messages,
                    hp_changes,
                    raw_text: result,
                    provider_session_id: session_id,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Claude CLI envelope parse failed, falling back to text");
                let (messages, hp_changes) = parse_text(&buffer, on_message);
                Ok(GmTurn {
                    messages,
                    hp_changes,
                    raw_text: buffer,
                    provider_session_id: None,
                })
            }
        }
    }
}
