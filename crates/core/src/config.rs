use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sla::DEFAULT_DUE_SOON_HOURS;

const MIN_API_TOKEN_LEN: usize = 16;
const MAX_SLA_TARGET_HOURS: u32 = 8_760;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub sla: SlaConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Bearer token required on mutating API routes. `None` leaves them open.
    pub api_token: Option<SecretString>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaConfig {
    pub due_soon_hours: u32,
    pub urgent_hours: u32,
    pub high_hours: u32,
    pub medium_hours: u32,
    pub low_hours: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub api_token: Option<String>,
    pub due_soon_hours: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://waqf.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                api_token: None,
            },
            sla: SlaConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            due_soon_hours: DEFAULT_DUE_SOON_HOURS,
            urgent_hours: 24,
            high_hours: 48,
            medium_hours: 72,
            low_hours: 120,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl ServerConfig {
    /// `host:port` the HTTP listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn requires_token(&self) -> bool {
        self.api_token.is_some()
    }

    pub fn token_matches(&self, presented: &str) -> bool {
        match &self.api_token {
            Some(expected) => constant_time_eq(expected.expose_secret().as_bytes(), presented.as_bytes()),
            None => true,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("waqf.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(api_token_value) = server.api_token {
                self.server.api_token = Some(secret_value(api_token_value));
            }
        }

        if let Some(sla) = patch.sla {
            if let Some(due_soon_hours) = sla.due_soon_hours {
                self.sla.due_soon_hours = due_soon_hours;
            }
            if let Some(urgent_hours) = sla.urgent_hours {
                self.sla.urgent_hours = urgent_hours;
            }
            if let Some(high_hours) = sla.high_hours {
                self.sla.high_hours = high_hours;
            }
            if let Some(medium_hours) = sla.medium_hours {
                self.sla.medium_hours = medium_hours;
            }
            if let Some(low_hours) = sla.low_hours {
                self.sla.low_hours = low_hours;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WAQF_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WAQF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("WAQF_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WAQF_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WAQF_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WAQF_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WAQF_SERVER_PORT") {
            self.server.port = parse_u16("WAQF_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WAQF_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WAQF_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("WAQF_SERVER_API_TOKEN") {
            self.server.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("WAQF_SLA_DUE_SOON_HOURS") {
            self.sla.due_soon_hours = parse_u32("WAQF_SLA_DUE_SOON_HOURS", &value)?;
        }
        if let Some(value) = read_env("WAQF_SLA_URGENT_HOURS") {
            self.sla.urgent_hours = parse_u32("WAQF_SLA_URGENT_HOURS", &value)?;
        }
        if let Some(value) = read_env("WAQF_SLA_HIGH_HOURS") {
            self.sla.high_hours = parse_u32("WAQF_SLA_HIGH_HOURS", &value)?;
        }
        if let Some(value) = read_env("WAQF_SLA_MEDIUM_HOURS") {
            self.sla.medium_hours = parse_u32("WAQF_SLA_MEDIUM_HOURS", &value)?;
        }
        if let Some(value) = read_env("WAQF_SLA_LOW_HOURS") {
            self.sla.low_hours = parse_u32("WAQF_SLA_LOW_HOURS", &value)?;
        }

        let log_level = read_env("WAQF_LOGGING_LEVEL").or_else(|| read_env("WAQF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("WAQF_LOGGING_FORMAT").or_else(|| read_env("WAQF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(api_token) = overrides.api_token {
            self.server.api_token = Some(secret_value(api_token));
        }
        if let Some(due_soon_hours) = overrides.due_soon_hours {
            self.sla.due_soon_hours = due_soon_hours;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_sla(&self.sla)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("waqf.toml"), PathBuf::from("config/waqf.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(token) = &server.api_token {
        if token.expose_secret().trim().chars().count() < MIN_API_TOKEN_LEN {
            return Err(ConfigError::Validation(format!(
                "server.api_token must be at least {MIN_API_TOKEN_LEN} characters; generate one with `openssl rand -hex 24`"
            )));
        }
    }

    Ok(())
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    if sla.due_soon_hours == 0 || sla.due_soon_hours > 168 {
        return Err(ConfigError::Validation(
            "sla.due_soon_hours must be in range 1..=168".to_string(),
        ));
    }

    let targets = [
        ("sla.urgent_hours", sla.urgent_hours),
        ("sla.high_hours", sla.high_hours),
        ("sla.medium_hours", sla.medium_hours),
        ("sla.low_hours", sla.low_hours),
    ];
    if let Some((name, _)) =
        targets.iter().find(|(_, hours)| *hours == 0 || *hours > MAX_SLA_TARGET_HOURS)
    {
        return Err(ConfigError::Validation(format!(
            "{name} must be in range 1..={MAX_SLA_TARGET_HOURS}"
        )));
    }

    let ordered = targets.windows(2).all(|pair| pair[0].1 <= pair[1].1);
    if !ordered {
        return Err(ConfigError::Validation(
            "sla target hours must not decrease from urgent to low priority".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (l, r)| acc | (l ^ r)) == 0
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    sla: Option<SlaPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    api_token: Option<String>,
}

impl std::fmt::Debug for ServerPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPatch")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("graceful_shutdown_secs", &self.graceful_shutdown_secs)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    due_soon_hours: Option<u32>,
    urgent_hours: Option<u32>,
    high_hours: Option<u32>,
    medium_hours: Option<u32>,
    low_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.sla.due_soon_hours == 6, "default due-soon threshold should be six hours")?;
        ensure(config.server.api_token.is_none(), "api token should be unset by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WAQF_API_TOKEN", "token-from-env-0123456789");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waqf.toml");
            fs::write(
                &path,
                r#"
[server]
port = 9090
api_token = "${TEST_WAQF_API_TOKEN}"

[sla]
due_soon_hours = 12
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .server
                    .api_token
                    .as_ref()
                    .is_some_and(|token| token.expose_secret() == "token-from-env-0123456789"),
                "api token should be interpolated from the environment",
            )?;
            ensure(config.server.port == 9090, "port should come from the file")?;
            ensure(config.sla.due_soon_hours == 12, "due-soon threshold should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_WAQF_API_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_WAQF_UNSET_VAR"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("waqf.toml");
        fs::write(&path, "[database]\nurl = \"${TEST_WAQF_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let outcome = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(outcome, Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_WAQF_UNSET_VAR"),
            "missing interpolation variable should be named in the error",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_LOG_LEVEL", "warn");
        env::set_var("WAQF_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["WAQF_LOG_LEVEL", "WAQF_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("WAQF_SLA_DUE_SOON_HOURS", "8");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waqf.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sla]
due_soon_hours = 4
urgent_hours = 12

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.sla.due_soon_hours == 8, "env due-soon threshold should win over file")?;
            ensure(config.sla.urgent_hours == 12, "file urgent target should win over defaults")?;
            Ok(())
        })();

        clear_vars(&["WAQF_DATABASE_URL", "WAQF_SLA_DUE_SOON_HOURS"]);
        result
    }

    #[test]
    fn invalid_env_number_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_SERVER_PORT", "eighty");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["WAQF_SERVER_PORT"]);

        ensure(
            matches!(outcome, Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "WAQF_SERVER_PORT"),
            "invalid port should be reported against its env var",
        )
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_SERVER_API_TOKEN", "short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("server.api_token")
            );
            ensure(has_message, "validation failure should mention server.api_token")
        })();

        clear_vars(&["WAQF_SERVER_API_TOKEN"]);
        result
    }

    #[test]
    fn sla_targets_must_not_decrease() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_SLA_URGENT_HOURS", "96");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["WAQF_SLA_URGENT_HOURS"]);

        ensure(
            matches!(outcome, Err(ConfigError::Validation(ref message)) if message.contains("sla target hours")),
            "urgent target above high target should be rejected",
        )
    }

    #[test]
    fn sla_target_beyond_a_year_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("waqf.toml");
        fs::write(&path, "[sla]\nlow_hours = 4000000000\n").map_err(|err| err.to_string())?;

        let outcome = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(outcome, Err(ConfigError::Validation(ref message)) if message.contains("sla.low_hours must be in range 1..=8760")),
            "a low target past one year should be rejected at load time",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAQF_SERVER_API_TOKEN", "very-secret-bearer-token");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("very-secret-bearer-token"),
                "debug output should not contain the api token",
            )?;
            ensure(
                config.server.token_matches("very-secret-bearer-token"),
                "configured token should match itself",
            )?;
            ensure(
                !config.server.token_matches("very-secret-bearer-tokem"),
                "a different token should not match",
            )?;
            Ok(())
        })();

        clear_vars(&["WAQF_SERVER_API_TOKEN"]);
        result
    }
}
