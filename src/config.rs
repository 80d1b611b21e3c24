//! Monitor configuration
//!
//! Built up in layers, later layers winning:
//! 1. the selected board profile
//! 2. an optional TOML file (`--config`, or `teensymon.toml` in the working directory)
//! 3. `TEENSYMON_*` environment variables
//! 4. command-line flags (applied by `main`)

use crate::devices::BoardProfile;
use crate::render::Palette;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "teensymon.toml";

pub const ENV_ELF: &str = "TEENSYMON_ELF";
pub const ENV_ADDR2LINE: &str = "TEENSYMON_ADDR2LINE";
pub const ENV_DEVICE_ID: &str = "TEENSYMON_DEVICE_ID";
pub const ENV_BAUD: &str = "TEENSYMON_BAUD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// What to do with a line that is not single-byte text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Stop the monitor
    #[default]
    Strict,
    /// Log a warning and drop the line
    Skip,
}

/// Everything the stream monitor needs, resolved once at start-up
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Firmware ELF used for symbolication
    pub elf: PathBuf,
    /// addr2line executable
    pub addr2line: PathBuf,
    /// Substring of the port's hardware descriptor that selects the device
    pub device_id: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read; also the cancellation latency
    pub read_timeout: Duration,
    /// Pause between reconnect attempts (zero retries immediately)
    pub backoff: Duration,
    /// Kill addr2line after this long (None waits indefinitely)
    pub resolver_timeout: Option<Duration>,
    pub decode_policy: DecodePolicy,
    pub palette: Palette,
    pub timestamps: bool,
}

impl MonitorConfig {
    /// Defaults for a board profile
    pub fn from_profile(profile: &BoardProfile) -> Self {
        Self {
            elf: PathBuf::from(&profile.elf),
            addr2line: PathBuf::from(&profile.addr2line),
            device_id: profile.device_id.clone(),
            baud_rate: profile.baud_rate,
            read_timeout: Duration::from_millis(100),
            backoff: Duration::from_millis(250),
            resolver_timeout: None,
            decode_policy: DecodePolicy::Strict,
            palette: Palette::default(),
            timestamps: false,
        }
    }

    /// Profile defaults, then the config file, then the process environment
    pub fn load(profile: &BoardProfile, path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_profile(profile);

        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };
        if let Some(path) = path {
            log::debug!("loading configuration from {}", path.display());
            config.apply_file(FileConfig::read(&path)?);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(elf) = file.elf {
            self.elf = elf;
        }
        if let Some(addr2line) = file.addr2line {
            self.addr2line = addr2line;
        }
        if let Some(device_id) = file.device_id {
            self.device_id = device_id;
        }
        if let Some(baud_rate) = file.baud_rate {
            self.baud_rate = baud_rate;
        }
        if let Some(ms) = file.read_timeout_ms {
            self.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.backoff_ms {
            self.backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.resolver_timeout_ms {
            self.resolver_timeout = Some(Duration::from_millis(ms)).filter(|t| !t.is_zero());
        }
        if let Some(policy) = file.decode_policy {
            self.decode_policy = policy;
        }
        if let Some(palette) = file.palette {
            self.palette = palette;
        }
        if let Some(timestamps) = file.timestamps {
            self.timestamps = timestamps;
        }
    }

    /// Apply `TEENSYMON_*` overrides read through `var`
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(elf) = var(ENV_ELF) {
            self.elf = PathBuf::from(elf);
        }
        if let Some(addr2line) = var(ENV_ADDR2LINE) {
            self.addr2line = PathBuf::from(addr2line);
        }
        if let Some(device_id) = var(ENV_DEVICE_ID) {
            self.device_id = device_id;
        }
        if let Some(baud) = var(ENV_BAUD) {
            self.baud_rate = baud.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BAUD.to_string(),
                message: format!("'{}' is not a baud rate", baud),
            })?;
        }
        Ok(())
    }

    /// Reject values the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "baud_rate".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "device_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "read_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let invalid = self.palette.invalid_names();
        if !invalid.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "palette".to_string(),
                message: format!("unknown colour(s): {}", invalid.join(", ")),
            });
        }
        Ok(())
    }
}

/// On-disk form of the configuration; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub elf: Option<PathBuf>,
    pub addr2line: Option<PathBuf>,
    pub device_id: Option<String>,
    pub baud_rate: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub backoff_ms: Option<u64>,
    /// 0 disables the timeout
    pub resolver_timeout_ms: Option<u64>,
    pub decode_policy: Option<DecodePolicy>,
    pub palette: Option<Palette>,
    pub timestamps: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::TEENSY41_PROFILE;
    use std::collections::HashMap;

    #[test]
    fn test_profile_defaults() {
        let config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        assert_eq!(config.elf, PathBuf::from(".pio/build/teensy41/firmware.elf"));
        assert_eq!(config.device_id, "16C0:0483");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.decode_policy, DecodePolicy::Strict);
        assert!(config.resolver_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teensymon.toml");
        fs::write(
            &path,
            r#"
elf = "build/fw.elf"
baud_rate = 115200
backoff_ms = 0
resolver_timeout_ms = 2000
decode_policy = "skip"

[palette]
error = "magenta"
"#,
        )
        .unwrap();

        let config = MonitorConfig::load(&TEENSY41_PROFILE, Some(&path)).unwrap();
        assert_eq!(config.elf, PathBuf::from("build/fw.elf"));
        assert_eq!(config.baud_rate, 115200);
        assert!(config.backoff.is_zero());
        assert_eq!(config.resolver_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.decode_policy, DecodePolicy::Skip);
        assert_eq!(config.palette.error, "magenta");
        assert_eq!(config.palette.info, "blue");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "baud = 9600\n").unwrap();
        assert!(matches!(
            FileConfig::read(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = MonitorConfig::load(&TEENSY41_PROFILE, Some(&dir.path().join("none.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_layer() {
        let vars: HashMap<&str, &str> = [
            (ENV_ELF, "/tmp/firmware.elf"),
            (ENV_DEVICE_ID, "16C0:0483"),
            (ENV_BAUD, "57600"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.elf, PathBuf::from("/tmp/firmware.elf"));
        assert_eq!(config.device_id, "16C0:0483");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.addr2line, PathBuf::from("arm-none-eabi-addr2line"));
    }

    #[test]
    fn test_env_bad_baud() {
        let mut config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        let result = config.apply_env(|key| (key == ENV_BAUD).then(|| "fast".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate() {
        let mut config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        config.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        config.palette.warning = "orange".to_string();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::from_profile(&TEENSY41_PROFILE);
        config.device_id = " ".to_string();
        assert!(config.validate().is_err());
    }
}
