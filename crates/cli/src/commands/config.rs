use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use waqf_core::config::{AppConfig, LoadOptions};

struct ConfigSource {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigSource {
    fn detect() -> Self {
        let path = ["waqf.toml", "config/waqf.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists());
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    fn attribute(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let source = ConfigSource::detect();

    let api_token = if config.server.requires_token() { "<redacted>" } else { "<unset>" };
    let line = |key: &str, value: &str, env_keys: &[&str]| {
        render_line(key, value, source.attribute(key, env_keys))
    };

    [
        "effective config (source precedence: env > file > default):".to_string(),
        line("database.url", &config.database.url, &["WAQF_DATABASE_URL"]),
        line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            &["WAQF_DATABASE_MAX_CONNECTIONS"],
        ),
        line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            &["WAQF_DATABASE_TIMEOUT_SECS"],
        ),
        line("server.bind_address", &config.server.bind_address, &["WAQF_SERVER_BIND_ADDRESS"]),
        line("server.port", &config.server.port.to_string(), &["WAQF_SERVER_PORT"]),
        line(
            "server.graceful_shutdown_secs",
            &config.server.graceful_shutdown_secs.to_string(),
            &["WAQF_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        line("server.api_token", api_token, &["WAQF_SERVER_API_TOKEN"]),
        line(
            "sla.due_soon_hours",
            &config.sla.due_soon_hours.to_string(),
            &["WAQF_SLA_DUE_SOON_HOURS"],
        ),
        line("sla.urgent_hours", &config.sla.urgent_hours.to_string(), &["WAQF_SLA_URGENT_HOURS"]),
        line("sla.high_hours", &config.sla.high_hours.to_string(), &["WAQF_SLA_HIGH_HOURS"]),
        line("sla.medium_hours", &config.sla.medium_hours.to_string(), &["WAQF_SLA_MEDIUM_HOURS"]),
        line("sla.low_hours", &config.sla.low_hours.to_string(), &["WAQF_SLA_LOW_HOURS"]),
        line("logging.level", &config.logging.level, &["WAQF_LOGGING_LEVEL", "WAQF_LOG_LEVEL"]),
        line(
            "logging.format",
            config.logging.format.as_str(),
            &["WAQF_LOGGING_FORMAT", "WAQF_LOG_FORMAT"],
        ),
    ]
    .join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
