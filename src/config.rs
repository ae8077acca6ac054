/*
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! Process-lifetime configuration for the checkpoint core, read once at startup and cached.

use {
    serde::Deserialize,
    std::{fmt, path::Path, time::Duration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
/// Controls whether, and how aggressively, the [`crate::sync::FileSynchronizer`] runs
pub enum SyncMode {
    /// prioritize a small version file: process every sync candidate on every pass
    Size,
    /// prioritize throughput: skip a candidate for one pass after it was just checkpointed
    Speed,
    /// never construct the synchronizer
    Off,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::Speed
    }
}

fn default_period_ms() -> u64 {
    30 * 60 * 1000
}
fn default_true() -> bool {
    true
}
fn default_timestamp_table_size() -> usize {
    7
}
fn default_dirty_flusher_period_ms() -> u64 {
    1000
}
fn default_flush_coefficient() -> u8 {
    70
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
/// The `§6 EXTERNAL INTERFACES` configuration parameter table
pub struct Config {
    /// checkpoint interval, in milliseconds
    #[serde(rename = "Period")]
    pub period_ms: u64,
    /// allow log truncation at checkpoint time
    #[serde(rename = "TruncateLogicalLog")]
    pub truncate_logical_log: bool,
    /// whether, and how, the file synchronizer runs
    #[serde(rename = "EnableFileSynchronizer")]
    pub enable_file_synchronizer: SyncMode,
    /// initial bucket count of the per-database timestamp maps
    #[serde(rename = "TimeStampTableSize")]
    pub timestamp_table_size: usize,
    /// eagerly open all logs at the first checkpoint
    #[serde(rename = "LoadSynchronizeCandidate")]
    pub load_synchronize_candidate: bool,
    /// dirty-page flusher tick interval, in milliseconds
    #[serde(rename = "DirtyPageFlusherPeriod")]
    pub dirty_page_flusher_period_ms: u64,
    /// percentage (0-100) of a pool's limit that must be dirty before it is flushed
    #[serde(rename = "FlushPageCoefficient")]
    pub flush_page_coefficient: u8,
    /// statistics reporter tick interval, in milliseconds; 0 disables it
    #[serde(rename = "StatisticsReporterPeriod")]
    pub statistics_reporter_period_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            truncate_logical_log: default_true(),
            enable_file_synchronizer: SyncMode::default(),
            timestamp_table_size: default_timestamp_table_size(),
            load_synchronize_candidate: default_true(),
            dirty_page_flusher_period_ms: default_dirty_flusher_period_ms(),
            flush_page_coefficient: default_flush_coefficient(),
            statistics_reporter_period_ms: 0,
        }
    }
}

impl Config {
    /// checkpoint tick interval as a [`Duration`]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
    /// dirty-page flusher tick interval as a [`Duration`]
    pub fn dirty_page_flusher_period(&self) -> Duration {
        Duration::from_millis(self.dirty_page_flusher_period_ms)
    }
    /// read and validate a YAML configuration document
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml_str(&raw)
    }
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
    fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_page_coefficient > 100 {
            return Err(ConfigError::Validation(
                "FlushPageCoefficient must be between 0 and 100".into(),
            ));
        }
        if self.period_ms == 0 {
            return Err(ConfigError::Validation(
                "Period must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error reading config: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config: {e}"),
            Self::Validation(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::new(
            crate::error::ErrorKind::Config(e.to_string()),
            crate::context::Subsystem::Config,
            "failed to load configuration",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.period_ms, 30 * 60 * 1000);
        assert!(cfg.truncate_logical_log);
        assert_eq!(cfg.enable_file_synchronizer, SyncMode::Speed);
        assert_eq!(cfg.timestamp_table_size, 7);
        assert!(cfg.load_synchronize_candidate);
        assert_eq!(cfg.statistics_reporter_period_ms, 0);
    }

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let cfg = Config::from_yaml_str("EnableFileSynchronizer: SIZE\n").unwrap();
        assert_eq!(cfg.enable_file_synchronizer, SyncMode::Size);
        assert_eq!(cfg.period_ms, default_period_ms());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::from_yaml_str("NotARealKey: 1\n").is_err());
    }

    #[test]
    fn rejects_bad_coefficient() {
        assert!(Config::from_yaml_str("FlushPageCoefficient: 255\n").is_err());
    }
}
