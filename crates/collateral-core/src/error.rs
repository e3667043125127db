use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Identity list error: {0}")]
    IdentityList(#[from] csv::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] toml::de::Error),

    /// Row not found, stale handle, click intercepted.
    #[error("UI error: {0}")]
    TransientUi(String),

    #[error("Timed out after {}s waiting for {label} download", waited.as_secs())]
    DownloadTimeout { label: String, waited: Duration },

    #[error("Invalid {}: {reason}", path.display())]
    FormatValidation { path: PathBuf, reason: String },

    #[error("Fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that must abort the whole run instead of a single product.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Interrupted)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DownloadTimeout { .. })
    }
}
