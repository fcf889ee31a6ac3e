use serde::{Deserialize, Serialize};
use std::{env, fmt};

/// Where the store runs. `Test` keeps zones in memory so throwaway runs
/// never touch the data dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Local,
    Test,
    Prod,
}

impl Environment {
    pub fn from_env(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "test" => Self::Test,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Test => "test",
            Self::Prod => "prod",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub environment: Environment,
    pub log_level: String,
    pub metrics_addr: Option<String>,
    pub data_dir: String,
}

impl ServiceConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self {
            service_name: env_var("ZONE_SERVICE_NAME", default_service_name.to_string()),
            environment: Environment::from_env(&env_var("ZONE_ENV", "local".to_string())),
            log_level: env_var("ZONE_LOG_LEVEL", "info".to_string()),
            metrics_addr: env::var("ZONE_METRICS_ADDR").ok(),
            data_dir: env_var("ZONE_DATA_DIR", ".".to_string()),
        }
    }

    pub fn default_database_url(&self) -> String {
        if self.environment == Environment::Test {
            return "sqlite::memory:".to_string();
        }
        let dir = self.data_dir.trim_end_matches('/');
        format!("sqlite://{}/zones.db", if dir.is_empty() { "." } else { dir })
    }
}

pub fn env_var(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

pub fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

pub fn env_var_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| parse_bool(&value, default))
        .unwrap_or(default)
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
