//! Client configuration resolved from the environment.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
/// Environment variable naming the backend URL.
pub const BASE_URL_ENV: &str = "TASKS_API_URL";
/// Environment variable naming the token directory.
pub const DATA_DIR_ENV: &str = "TASKS_DATA_DIR";

const APP_DIR: &str = "tasks-client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Directory holding the persisted token.
    pub data_dir: PathBuf,
}

impl ClientConfig {
    /// Fill unset or blank values with the local backend and the platform
    /// data directory.
    pub fn resolve(base_url: Option<String>, data_dir: Option<PathBuf>) -> Self {
        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        Self { base_url, data_dir }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win() {
        let config = ClientConfig::resolve(
            Some("http://api.test".to_string()),
            Some(PathBuf::from("/tmp/tasks")),
        );
        assert_eq!(config.base_url, "http://api.test");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tasks"));
    }

    #[test]
    fn blank_url_falls_back_to_default() {
        let config = ClientConfig::resolve(Some("  ".to_string()), None);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.data_dir.ends_with(APP_DIR));
    }
}
