//! Transports that turn a rendered prompt into raw LM reply text.
//!
//! The command backend delegates to a user-configured program that reads the
//! prompt on stdin and writes its reply to stdout (e.g. `llm`, `ollama run`,
//! a wrapper script). The HTTP backend speaks the OpenAI-compatible chat
//! completions protocol served by LM Studio, Ollama, vLLM and hosted APIs.
use crate::error::{CopilotError, CopilotResult};
use serde::Deserialize;
use serde_json::json;
use std::io::Write;
use std::process::{Command, Stdio};

const SYSTEM_PROMPT: &str = "Return a single JSON object only. No prose or code fences.";

/// Something that can answer a prompt with text.
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> String;

    fn complete(&self, prompt: &str) -> CopilotResult<String>;
}

/// Local LM command fed through stdin.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
}

impl CommandBackend {
    /// Parse a shell-style command line and check that the program exists.
    pub fn new(command: &str) -> CopilotResult<Self> {
        let argv = shell_words::split(command)
            .map_err(|err| CopilotError::unavailable(format!("parse LM command {command:?}: {err}")))?;
        let Some(program) = argv.first() else {
            return Err(CopilotError::unavailable("LM command is empty"));
        };
        which::which(program)
            .map_err(|err| CopilotError::unavailable(format!("LM program {program:?}: {err}")))?;
        Ok(Self { argv })
    }
}

impl CompletionBackend for CommandBackend {
    fn label(&self) -> String {
        format!("command:{}", self.argv[0])
    }

    fn complete(&self, prompt: &str) -> CopilotResult<String> {
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                CopilotError::unavailable(format!("spawn LM command {}: {err}", self.argv[0]))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| CopilotError::unavailable(format!("write prompt to LM stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| CopilotError::unavailable(format!("wait for LM command: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CopilotError::unavailable(format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| CopilotError::unavailable(format!("decode LM stdout as UTF-8: {err}")))
    }
}

/// OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpBackend {
    pub fn new(api_base: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }
}

impl CompletionBackend for HttpBackend {
    fn label(&self) -> String {
        format!("http:{}", self.model)
    }

    fn complete(&self, prompt: &str) -> CopilotResult<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });
        let mut request = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let mut response = request
            .send_json(&body)
            .map_err(|err| CopilotError::unavailable(format!("POST {}: {err}", self.endpoint)))?;
        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| CopilotError::unavailable(format!("read chat completion: {err}")))?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CopilotError::unavailable("chat completion returned no content"))
    }
}
