use std::env;
use std::path::PathBuf;

use url::Url;

use crate::error::ConfigError;

/// Public dictionary host.
pub const DEFAULT_REMOTE_URL: &str = "https://mimo31.github.io/Android-Dictionary-Tester/";

/// Default local data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "./drill-data";

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL; always ends with `/`.
    pub remote_url: Url,
    pub data_dir: PathBuf,
    /// Write freshly downloaded dictionaries to the device after an update.
    pub persist_after_update: bool,
}

impl SyncConfig {
    /// Read `DRILL_REMOTE_URL`, `DRILL_DATA_DIR` and `DRILL_PERSIST_AFTER_UPDATE`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let remote_url = match lookup("DRILL_REMOTE_URL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_base_url(&raw)?,
            None => parse_base_url(DEFAULT_REMOTE_URL)?,
        };
        let data_dir = lookup("DRILL_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let persist_after_update = match lookup("DRILL_PERSIST_AFTER_UPDATE") {
            Some(raw) => parse_flag("DRILL_PERSIST_AFTER_UPDATE", &raw)?,
            None => true,
        };
        let config = Self {
            remote_url,
            data_dir,
            persist_after_update,
        };
        Ok(config)
    }
}

/// Parse a base URL, appending the trailing `/` that `Url::join` needs to
/// treat the last segment as a directory.
///
/// # Errors
///
/// Returns `ConfigError` if the URL is malformed or cannot be a base.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
        raw: raw.to_owned(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABase(raw.to_owned()));
    }
    Ok(url)
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            var,
            raw: raw.to_owned(),
        }),
    }
}
