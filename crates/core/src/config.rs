use std::{fmt, fs::File, io::BufReader, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_EXECUTOR_URL: &str = "https://emkc.org/api/v2/piston/execute";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TRIGGER: &str = "/execute";
/// GitHub rejects comment bodies over 65536 characters; leave room for the header.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 60_000;
/// Execution service responses larger than this are rejected unread.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub executor: ExecutorConfig,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// How long shutdown waits for accepted deliveries to finish.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration { Duration::from_secs(self.shutdown_grace_secs) }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Shared secret used to sign webhook deliveries. Always required.
    pub webhook_secret: String,
    pub app: Option<GitHubAppConfig>,
    /// Personal access token used when a delivery carries no installation.
    pub token: Option<String>,
    /// Login of the account the agent comments as, e.g. `runbot[bot]`.
    pub bot_login: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            app: None,
            token: None,
            bot_login: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("webhook_secret", &"[redacted]")
            .field("app", &self.app)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("bot_login", &self.bot_login)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitHubAppConfig {
    pub id: u64,
    pub private_key: String,
}

impl fmt::Debug for GitHubAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAppConfig")
            .field("id", &self.id)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub max_response_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EXECUTOR_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Literal substring that marks a comment as a command.
    pub trigger: String,
    pub max_output_chars: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { trigger: DEFAULT_TRIGGER.to_string(), max_output_chars: DEFAULT_MAX_OUTPUT_CHARS }
    }
}

impl Config {
    /// Load the configuration from `RUNBOT_CONFIG` (or `config.yml`) and the process
    /// environment, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("RUNBOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path), |key| std::env::var(key).ok())
    }

    /// Load from an optional YAML file, overlay values from `lookup`, and validate.
    /// A missing file is not an error; every setting has a default or an
    /// environment override.
    pub fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let display = path.display().to_string();
            let file = File::open(path)
                .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
            serde_yaml::from_reader(BufReader::new(file))
                .map_err(|source| ConfigError::Parse { path: display, source })?
        } else {
            Config::default()
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                reason: format!("expected a port number, got {port:?}"),
            })?;
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.github.webhook_secret = secret;
        }
        if let Some(id) = lookup("APP_ID") {
            let id = id.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "APP_ID",
                reason: "expected a numeric app ID".to_string(),
            })?;
            self.github.app.get_or_insert_with(Default::default).id = id;
        }
        if let Some(key) = lookup("PRIVATE_KEY") {
            // Keys passed through a single-line variable usually carry escaped newlines
            self.github.app.get_or_insert_with(Default::default).private_key =
                key.replace("\\n", "\n");
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(login) = lookup("BOT_LOGIN") {
            self.github.bot_login = Some(login);
        }
        if let Some(url) = lookup("EXECUTOR_URL") {
            self.executor.url = url;
        }
        if let Some(trigger) = lookup("TRIGGER") {
            self.command.trigger = trigger;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.webhook_secret.is_empty() {
            return Err(ConfigError::Missing("WEBHOOK_SECRET"));
        }
        match &self.github.app {
            Some(app) => {
                if app.id == 0 {
                    return Err(ConfigError::Missing("APP_ID"));
                }
                if app.private_key.trim().is_empty() {
                    return Err(ConfigError::Missing("PRIVATE_KEY"));
                }
            }
            None if self.github.token.is_none() => {
                return Err(ConfigError::Missing("APP_ID"));
            }
            None => {}
        }
        if self.command.trigger.is_empty() {
            return Err(ConfigError::Invalid {
                key: "command.trigger",
                reason: "must not be empty".to_string(),
            });
        }
        if self.executor.timeout_secs == 0 || self.github.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.executor.max_response_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "executor.max_response_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Url::parse(&self.executor.url).map_err(|e| ConfigError::Invalid {
            key: "executor.url",
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
