//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as an
//! `Arc<CoreConfig>`. Services never read process-wide environment variables while handling a
//! request.

use crate::constants::{DEFAULT_AUDIO_MAX_BYTES, DEFAULT_ICE_SERVER, DEFAULT_PRACTICE_DATA_DIR};
use crate::{PracticeError, PracticeResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    rtc_ice_servers: Vec<String>,
    audio_max_bytes: u64,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::InvalidInput`] if `data_dir` is empty, if no ICE server is given,
    /// or if `audio_max_bytes` is zero.
    pub fn new(
        data_dir: PathBuf,
        rtc_ice_servers: Vec<String>,
        audio_max_bytes: u64,
    ) -> PracticeResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(PracticeError::InvalidInput(
                "data_dir cannot be empty".into(),
            ));
        }

        if rtc_ice_servers.is_empty() {
            return Err(PracticeError::InvalidInput(
                "at least one ICE server is required".into(),
            ));
        }

        if audio_max_bytes == 0 {
            return Err(PracticeError::InvalidInput(
                "audio_max_bytes must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            rtc_ice_servers,
            audio_max_bytes,
        })
    }

    /// Configuration with default ICE servers and upload limit.
    pub fn with_defaults(data_dir: PathBuf) -> PracticeResult<Self> {
        Self::new(
            data_dir,
            vec![DEFAULT_ICE_SERVER.to_owned()],
            DEFAULT_AUDIO_MAX_BYTES,
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding every record of one table.
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.data_dir.join(table)
    }

    pub fn rtc_ice_servers(&self) -> &[String] {
        &self.rtc_ice_servers
    }

    pub fn audio_max_bytes(&self) -> u64 {
        self.audio_max_bytes
    }
}

/// Parse a comma-separated list of ICE server URLs.
///
/// Blank entries are dropped. A missing or blank value yields the default public STUN server.
pub fn ice_servers_from_env_value(value: Option<String>) -> Vec<String> {
    let servers: Vec<String> = value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    if servers.is_empty() {
        vec![DEFAULT_ICE_SERVER.to_owned()]
    } else {
        servers
    }
}

/// Parse the maximum accepted audio upload size in bytes.
///
/// If `value` is `None` or blank, returns the 100 MiB default.
pub fn audio_max_bytes_from_env_value(value: Option<String>) -> PracticeResult<u64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_AUDIO_MAX_BYTES),
        Some(v) => v.parse::<u64>().map_err(|e| {
            PracticeError::InvalidInput(format!("invalid audio size limit '{}': {}", v, e))
        }),
    }
}

/// Build the startup configuration from raw environment values.
///
/// A missing or blank `data_dir` falls back to `practice_data`. The directory is created when it
/// does not exist yet.
pub fn core_config_from_env_values(
    data_dir: Option<String>,
    ice_servers: Option<String>,
    audio_max_bytes: Option<String>,
) -> PracticeResult<CoreConfig> {
    let data_dir = PathBuf::from(
        data_dir
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PRACTICE_DATA_DIR.to_string()),
    );
    std::fs::create_dir_all(&data_dir).map_err(PracticeError::DirCreation)?;

    CoreConfig::new(
        data_dir,
        ice_servers_from_env_value(ice_servers),
        audio_max_bytes_from_env_value(audio_max_bytes)?,
    )
}
