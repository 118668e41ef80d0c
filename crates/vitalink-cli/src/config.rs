//! Demo configuration – reads/writes `~/.vitalink/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted demo configuration stored in `~/.vitalink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Heartbeat period in milliseconds (reference: 2000).
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,

    /// Silent heartbeat periods tolerated before a device is flagged absent.
    #[serde(default = "default_grace_periods")]
    pub grace_periods: u32,

    /// Participant id the supervisory monitor publishes as.
    #[serde(default = "default_supervisor_id")]
    pub supervisor_id: String,

    /// Device id of the simulated pulse oximeter.
    #[serde(default = "default_oximeter_id")]
    pub oximeter_id: String,

    /// Device id of the simulated infusion pump.
    #[serde(default = "default_pump_id")]
    pub pump_id: String,

    /// Vitals emit period of the simulated devices, in milliseconds.
    #[serde(default = "default_vitals_period_ms")]
    pub vitals_period_ms: u64,

    /// Clock-offset threshold (milliseconds) beyond which a peer is flagged
    /// stale.  Advisory only.
    #[serde(default = "default_stale_clock_threshold_ms")]
    pub stale_clock_threshold_ms: u64,
}

fn default_heartbeat_period_ms() -> u64 {
    2_000
}
fn default_grace_periods() -> u32 {
    3
}
fn default_supervisor_id() -> String {
    "vitalink-supervisor".to_string()
}
fn default_oximeter_id() -> String {
    "sim-pulse-ox-1".to_string()
}
fn default_pump_id() -> String {
    "sim-pump-1".to_string()
}
fn default_vitals_period_ms() -> u64 {
    1_000
}
fn default_stale_clock_threshold_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: default_heartbeat_period_ms(),
            grace_periods: default_grace_periods(),
            supervisor_id: default_supervisor_id(),
            oximeter_id: default_oximeter_id(),
            pump_id: default_pump_id(),
            vitals_period_ms: default_vitals_period_ms(),
            stale_clock_threshold_ms: default_stale_clock_threshold_ms(),
        }
    }
}

/// Return the path to `~/.vitalink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vitalink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Save the config to disk, creating `~/.vitalink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_protocol_values() {
        let cfg = Config::default();
        assert_eq!(cfg.heartbeat_period_ms, 2_000);
        assert_eq!(cfg.grace_periods, 3);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.grace_periods = 5;
        cfg.oximeter_id = "ward-3-pox".to_string();
        save_to(&cfg, &path).unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(load_from(&path).unwrap().is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "grace_periods = 4\n").unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.grace_periods, 4);
        assert_eq!(loaded.heartbeat_period_ms, 2_000);
    }

    #[test]
    fn config_path_is_under_home() {
        let path = config_path_for_home("/home/clinician");
        assert_eq!(
            path,
            PathBuf::from("/home/clinician/.vitalink/config.toml")
        );
    }
}
