use crate::driver::Credentials;
use crate::error::{Error, Result};
use crate::scratch::PollSettings;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub max_attempts: u8,
    pub download_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub interaction_delay_ms: u64,
    pub retry_pause_ms: u64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            download_timeout_secs: 300,
            poll_interval_ms: 1000,
            interaction_delay_ms: 400,
            retry_pause_ms: 500,
        }
    }
}

impl AcquisitionSettings {
    pub fn poll(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(self.download_timeout_secs),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn interaction_delay(&self) -> Duration {
        Duration::from_millis(self.interaction_delay_ms)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms.max(self.interaction_delay_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_root: PathBuf,
    pub site_base_url: String,
    pub series_urls: Vec<String>,
    pub series_file: Option<PathBuf>,
    pub product_file: Option<PathBuf>,
    /// 0 means no limit.
    pub max_products: usize,
    pub overwrite: bool,
    pub keep_downloads: bool,
    pub dump_headers: bool,
    pub mirror_root: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub acquisition: AcquisitionSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            site_base_url: String::new(),
            series_urls: Vec::new(),
            series_file: None,
            product_file: None,
            max_products: 0,
            overwrite: false,
            keep_downloads: false,
            dump_headers: false,
            mirror_root: None,
            username: None,
            password: None,
            acquisition: AcquisitionSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let attempts = self.acquisition.max_attempts;
        if !(1..=2).contains(&attempts) {
            return Err(Error::InvalidConfig(format!(
                "max_attempts must be 1 or 2, got {}",
                attempts
            )));
        }
        if self.acquisition.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.acquisition.download_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "download_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Defaults, then `Collateral.toml` (or `file`), then `COLLATERAL_*` variables.
pub fn load_configuration(file: Option<&Path>) -> Result<AppConfig> {
    let file_source = match file {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Collateral").required(false),
    };
    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix("COLLATERAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("series_urls"),
        )
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}
