//! Copilot configuration helpers.
//!
//! Loads and validates `copilot.json`, then merges it with CLI flags and the
//! environment into the [`Settings`] a run needs. The completion backend is
//! resolved in priority order:
//! 1. `--lm` CLI flag (or `--no-lm` to force the unconfigured fallbacks)
//! 2. `completion` in the config file
//! 3. `COPILOT_LM_COMMAND` environment variable
//! 4. `LLM_API_BASE` / `LLM_MODEL_NAME` / `LLM_API_KEY` environment variables
use crate::completion::{CommandBackend, CompletionService, HttpBackend, PromptedCompletion};
use crate::error::CopilotResult;
use crate::retrieval::DEFAULT_TOP_K;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "copilot.json";

pub const LM_COMMAND_ENV: &str = "COPILOT_LM_COMMAND";
pub const API_BASE_ENV: &str = "LLM_API_BASE";
pub const MODEL_NAME_ENV: &str = "LLM_MODEL_NAME";
pub const API_KEY_ENV: &str = "LLM_API_KEY";

const DEFAULT_MODEL_NAME: &str = "local-model";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopilotConfig {
    pub schema_version: u32,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionConfig>,
}

/// How to reach the model behind the Completion Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompletionConfig {
    /// Shell-style command that reads a prompt on stdin.
    Command { command: String },
    /// OpenAI-compatible chat completions server.
    Http {
        api_base: String,
        model: String,
        /// Environment variable holding the API key, if the server needs one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key_env: Option<String>,
    },
}

impl CompletionConfig {
    /// Instantiate the prompt-driven Completion Service for this backend.
    pub fn connect(&self) -> CopilotResult<Box<dyn CompletionService>> {
        let service: Box<dyn CompletionService> = match self {
            Self::Command { command } => {
                Box::new(PromptedCompletion::new(CommandBackend::new(command)?))
            }
            Self::Http {
                api_base,
                model,
                api_key_env,
            } => {
                let api_key = api_key_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok());
                Box::new(PromptedCompletion::new(HttpBackend::new(
                    api_base, model, api_key,
                )))
            }
        };
        Ok(service)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Command { command } => format!("command `{command}`"),
            Self::Http {
                api_base, model, ..
            } => format!("{model} at {api_base}"),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("northwind.sqlite")
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Config used when no file is found.
pub fn default_config() -> CopilotConfig {
    CopilotConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        docs_dir: default_docs_dir(),
        db_path: default_db_path(),
        top_k: default_top_k(),
        completion: None,
    }
}

/// `<platform config dir>/retail-copilot/copilot.json`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("retail-copilot").join(CONFIG_FILE_NAME))
}

/// Pick the config file to load: an explicit path always wins, then
/// `./copilot.json`, then the per-user file. `None` means defaults.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|path| path.is_file())
}

/// Load and validate a config file. Relative paths inside it resolve
/// against the file's own directory.
pub fn load_config(path: &Path) -> Result<CopilotConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config: CopilotConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.docs_dir = base.join(&config.docs_dir);
    config.db_path = base.join(&config.db_path);
    Ok(config)
}

/// Validate schema version and user-provided values.
pub fn validate_config(config: &CopilotConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported copilot config schema_version {}",
            config.schema_version
        ));
    }
    if config.top_k == 0 {
        return Err(anyhow!("top_k must be at least 1"));
    }
    match &config.completion {
        Some(CompletionConfig::Command { command }) if command.trim().is_empty() => {
            Err(anyhow!("completion.command must be non-empty"))
        }
        Some(CompletionConfig::Http {
            api_base, model, ..
        }) if api_base.trim().is_empty() || model.trim().is_empty() => Err(anyhow!(
            "completion.api_base and completion.model must be non-empty"
        )),
        _ => Ok(()),
    }
}

/// CLI flags that override the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub docs: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub lm: Option<String>,
    pub no_lm: bool,
    pub top_k: Option<usize>,
}

/// Fully resolved inputs for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: Option<PathBuf>,
    pub docs_dir: PathBuf,
    pub db_path: PathBuf,
    pub top_k: usize,
    pub completion: Option<CompletionConfig>,
}

/// Merge flags, the located config file and the process environment.
pub fn resolve_settings(overrides: &Overrides) -> Result<Settings> {
    resolve_settings_with_env(overrides, |name| std::env::var(name).ok())
}

/// [`resolve_settings`] with an injectable environment lookup.
pub fn resolve_settings_with_env(
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let config_path = locate_config(overrides.config.as_deref());
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => default_config(),
    };

    let top_k = overrides.top_k.unwrap_or(config.top_k);
    if top_k == 0 {
        return Err(anyhow!("--top-k must be at least 1"));
    }

    let completion = if overrides.no_lm {
        None
    } else if let Some(command) = overrides.lm.as_deref() {
        if command.trim().is_empty() {
            return Err(anyhow!("--lm must be non-empty"));
        }
        Some(CompletionConfig::Command {
            command: command.to_string(),
        })
    } else {
        config.completion.or_else(|| completion_from_env(&env))
    };

    Ok(Settings {
        config_path,
        docs_dir: overrides.docs.clone().unwrap_or(config.docs_dir),
        db_path: overrides.db.clone().unwrap_or(config.db_path),
        top_k,
        completion,
    })
}

fn completion_from_env(env: &impl Fn(&str) -> Option<String>) -> Option<CompletionConfig> {
    let non_empty = |name: &str| env(name).filter(|value| !value.trim().is_empty());
    if let Some(command) = non_empty(LM_COMMAND_ENV) {
        return Some(CompletionConfig::Command { command });
    }
    let api_base = non_empty(API_BASE_ENV)?;
    Some(CompletionConfig::Http {
        api_base,
        model: non_empty(MODEL_NAME_ENV).unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
        api_key_env: Some(API_KEY_ENV.to_string()),
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
