use std::path::PathBuf;
use thiserror::Error;

pub use crate::email::EmailError;
pub use crate::store::StoreError;
pub use crate::unsubscribe::ExecutionError;

#[derive(Error, Debug)]
pub enum MailbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Email(#[from] EmailError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unsubscribe error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, MailbotError>;
