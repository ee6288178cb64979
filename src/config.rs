//! Settings for codeshift
//!
//! Stored as JSON in `<config_dir>/codeshift/config.json`. Secrets never go
//! in this file: they come from the environment or the system keychain.

use crate::commit::DEFAULT_BATCH_THRESHOLD;
use crate::github::{get_remote_info, GitHubHost, RepoSlug};
use crate::keyring;
use crate::llm::client::{
    DEFAULT_LOCAL_BASE_URL, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_TEMPERATURE,
    DEFAULT_REMOTE_BASE_URL, DEFAULT_REMOTE_MODEL,
};
use crate::llm::{
    BackendError, BackendKind, ChatSettings, CompletionBackend, FallbackBackend, LocalBackend,
    RemoteBackend,
};
use crate::util::{write_atomic, DEFAULT_CONTEXT_LIMIT};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub remote_model: String,
    pub remote_base_url: String,
    pub local_base_url: String,
    pub local_model: String,
    /// Sampling temperature for the local backend
    pub temperature: f32,
    /// `owner/name`; the git remote of the working directory when unset
    pub repo: Option<String>,
    pub branch: String,
    /// Characters of one file sent to the model
    pub context_limit: usize,
    /// Accepted files above which `auto` picks a single commit
    pub batch_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Remote,
            remote_model: DEFAULT_REMOTE_MODEL.to_string(),
            remote_base_url: DEFAULT_REMOTE_BASE_URL.to_string(),
            local_base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            temperature: DEFAULT_LOCAL_TEMPERATURE,
            repo: None,
            branch: "main".to_string(),
            context_limit: DEFAULT_CONTEXT_LIMIT,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codeshift"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load `path`, falling back to defaults. A file that fails to parse is
    /// moved aside to `config.json.corrupt`.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                warn!(
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Write `dir/config.json`, creating `dir` private to the user.
    pub fn save_in(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir).context("Failed to create config directory")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                warn!(error = %e, "failed to set config directory permissions");
            }
        }

        let path = dir.join("config.json");
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write the defaults to `dir/config.json` unless a file is already there.
    /// Returns the path when something was written.
    pub fn write_defaults_if_missing(dir: &Path) -> anyhow::Result<Option<PathBuf>> {
        if dir.join("config.json").exists() {
            return Ok(None);
        }
        Self::default().save_in(dir).map(Some)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, &content).context("Failed to write config")?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/codeshift/config.json".to_string())
    }

    fn remote_settings(&self) -> Result<ChatSettings, BackendError> {
        Ok(ChatSettings {
            base_url: parse_base_url(&self.remote_base_url)?,
            model: self.remote_model.clone(),
            temperature: None,
        })
    }

    fn local_settings(&self) -> Result<ChatSettings, BackendError> {
        Ok(ChatSettings {
            base_url: parse_base_url(&self.local_base_url)?,
            model: self.local_model.clone(),
            temperature: Some(self.temperature),
        })
    }

    /// Build the configured backend, or `kind` when given.
    ///
    /// The remote backend needs an API key; without one the offline
    /// fallback is returned and a warning logged.
    pub fn build_backend(
        &self,
        kind: Option<BackendKind>,
    ) -> Result<Box<dyn CompletionBackend>, BackendError> {
        let kind = kind.unwrap_or(self.backend);
        let api_key = match kind {
            BackendKind::Remote => get_api_key(),
            _ => None,
        };
        self.build_backend_with_key(kind, api_key)
    }

    fn build_backend_with_key(
        &self,
        kind: BackendKind,
        api_key: Option<String>,
    ) -> Result<Box<dyn CompletionBackend>, BackendError> {
        match kind {
            BackendKind::Remote => match api_key {
                Some(key) => Ok(Box::new(RemoteBackend::new(self.remote_settings()?, key)?)),
                None => {
                    warn!(
                        "no API key found ({} or keychain); using the offline fallback backend",
                        API_KEY_ENV
                    );
                    Ok(Box::new(FallbackBackend))
                }
            },
            BackendKind::Local => Ok(Box::new(LocalBackend::new(self.local_settings()?)?)),
            BackendKind::Fallback => Ok(Box::new(FallbackBackend)),
        }
    }

    /// Target repository: the configured slug, else the GitHub remote of the
    /// checkout containing `cwd`.
    pub fn resolve_repo(&self, cwd: &Path) -> anyhow::Result<RepoSlug> {
        match self.repo.as_deref() {
            Some(repo) => RepoSlug::parse(repo)
                .with_context(|| format!("Invalid repo '{}', expected owner/name", repo)),
            None => get_remote_info(cwd).context(
                "No repo configured and no GitHub remote found; set \"repo\" in the config",
            ),
        }
    }

    /// GitHub client for [`Config::resolve_repo`], authenticated with
    /// [`get_github_token`].
    pub fn open_host(&self, cwd: &Path) -> anyhow::Result<GitHubHost> {
        let repo = self.resolve_repo(cwd)?;
        let token = get_github_token().with_context(|| {
            format!(
                "No GitHub token found. Set {} or run `codeshift setup`",
                GITHUB_TOKEN_ENV
            )
        })?;
        Ok(GitHubHost::new(repo, token)?)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, BackendError> {
    // `join` drops the last segment unless the base ends with a slash
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| BackendError::Config(format!("invalid URL {raw}: {e}")))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Model API key from `OPENAI_API_KEY`, then the keychain
pub fn get_api_key() -> Option<String> {
    if let Some(key) = non_empty_env(API_KEY_ENV) {
        return Some(key);
    }
    match keyring::get_api_key() {
        Ok(key) => key,
        Err(err) => {
            keyring::warn_keychain_error_once("API key", &err);
            None
        }
    }
}

/// GitHub token from `GITHUB_TOKEN`, then the keychain
pub fn get_github_token() -> Option<String> {
    if let Some(token) = non_empty_env(GITHUB_TOKEN_ENV) {
        return Some(token);
    }
    match keyring::get_github_token() {
        Ok(token) => token,
        Err(err) => {
            keyring::warn_keychain_error_once("GitHub token", &err);
            None
        }
    }
}

fn prompt_line(label: &str) -> anyhow::Result<String> {
    use std::io::{self, Write};

    print!("  {label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask for both credentials on stdin and store the non-empty ones in the
/// keychain.
pub fn setup_credentials_interactive() -> anyhow::Result<()> {
    println!();
    println!("  codeshift needs two secrets, both kept in your system keychain:");
    println!("    - an OpenAI API key for the remote backend (https://platform.openai.com/api-keys)");
    println!("    - a GitHub token with contents:write on the target repository");
    println!("  Leave a field empty to keep the stored value.");
    println!();

    let key = prompt_line("OpenAI API key")?;
    if !key.is_empty() {
        if !key.starts_with("sk-") {
            println!("  Warning: key doesn't look like an OpenAI key (should start with sk-), saving anyway");
        }
        keyring::set_api_key(&key).map_err(|e| {
            anyhow::anyhow!(
                "Failed to store API key in system keychain: {}. Set {} instead.",
                e,
                API_KEY_ENV
            )
        })?;
        println!("  + API key saved");
    }

    let token = prompt_line("GitHub token")?;
    if !token.is_empty() {
        keyring::set_github_token(&token).map_err(|e| {
            anyhow::anyhow!(
                "Failed to store GitHub token in system keychain: {}. Set {} instead.",
                e,
                GITHUB_TOKEN_ENV
            )
        })?;
        println!("  + GitHub token saved");
    }

    println!();
    if let Some(dir) = Config::config_dir() {
        if let Some(path) = Config::write_defaults_if_missing(&dir)? {
            println!("  + Default settings written to {}", path.display());
        }
    }
    println!("  Other settings live in {}", Config::config_location());
    Ok(())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
