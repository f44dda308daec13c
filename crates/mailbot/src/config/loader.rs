use std::path::{Path, PathBuf};

use crate::config::schema::{MailbotConfig, ScanLimit};
use crate::error::ConfigError;

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MailbotConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content, format)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
) -> Result<MailbotConfig, ConfigError> {
    let config: MailbotConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml if content.trim().is_empty() => MailbotConfig::default(),
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

/// Loads `path` if given, otherwise the first of `~/.mailbot/config.{yaml,yml,json}`
/// that exists, otherwise the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<MailbotConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    match default_config_candidates().into_iter().find(|p| p.is_file()) {
        Some(found) => load_config(found),
        None => {
            log::debug!("No config file found, using defaults");
            Ok(MailbotConfig::default())
        }
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    let dir = home.join(".mailbot");
    ["config.yaml", "config.yml", "config.json"]
        .iter()
        .map(|name| dir.join(name))
        .collect()
}

pub fn validate_config(config: &MailbotConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| {
        Err(ConfigError::Validation {
            message: message.to_string(),
        })
    };

    if config.folders.is_empty() {
        return invalid("At least one folder must be configured");
    }
    if let Some(blank) = config.folders.iter().find(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: format!("Folder name '{}' is blank", blank),
        });
    }
    if config.limit == ScanLimit::Bounded(0) {
        return invalid("limit must be greater than zero or \"all\"");
    }
    if config.fetch_batch_size == 0 {
        return invalid("fetchBatchSize must be greater than zero");
    }
    if config.fetch_timeout_secs == 0 {
        return invalid("fetchTimeoutSecs must be greater than zero");
    }
    if config.request_timeout_secs == 0 {
        return invalid("requestTimeoutSecs must be greater than zero");
    }
    if config.page_timeout_secs == 0 {
        return invalid("pageTimeoutSecs must be greater than zero");
    }
    if config.user_agent.trim().is_empty() {
        return invalid("userAgent must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StoreKind;

    #[test]
    fn test_load_yaml_config() {
        let yaml = r#"
folders:
  - INBOX
  - Newsletters
includeSpam: false
limit: all
store:
  kind: json
  path: /tmp/mailbot/processed.json
"#;
        let config = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.folders, vec!["INBOX", "Newsletters"]);
        assert!(!config.include_spam);
        assert_eq!(config.limit, ScanLimit::All);
        assert_eq!(config.store.kind, StoreKind::Json);
        assert_eq!(config.fetch_batch_size, 50);
    }

    #[test]
    fn test_load_json_config() {
        let json = r#"{ "limit": 10, "requestTimeoutSecs": 3, "pageAutomation": false }"#;
        let config = load_config_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.limit, ScanLimit::Bounded(10));
        assert_eq!(config.request_timeout_secs, 3);
        assert!(!config.page_automation);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = load_config_from_str("  \n", ConfigFormat::Yaml).unwrap();
        assert_eq!(config, MailbotConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"{ "folders": [] }"#,
            r#"{ "folders": ["  "] }"#,
            r#"{ "limit": 0 }"#,
            r#"{ "fetchBatchSize": 0 }"#,
            r#"{ "fetchTimeoutSecs": 0 }"#,
            r#"{ "requestTimeoutSecs": 0 }"#,
            r#"{ "pageTimeoutSecs": 0 }"#,
            r#"{ "userAgent": "" }"#,
        ];
        for case in cases {
            let err = load_config_from_str(case, ConfigFormat::Json).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { .. }),
                "expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/config.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("config.toml")).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailbot.yaml");
        std::fs::write(&path, "limit: 5\n").unwrap();

        let config = load_or_default(Some(&path)).unwrap();
        assert_eq!(config.limit, ScanLimit::Bounded(5));

        let missing = load_config(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadFile { .. }));
    }
}
