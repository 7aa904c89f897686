// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Persisted configuration
//
// The log directory carries a `config.json` written at creation time and
// read back on load. Field names and the tab-indented layout match the
// on-disk format exactly; durations persist as integer nanoseconds.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WalError, WalResult};

/// Name of the configuration file inside the log directory.
pub const CONFIG_FILE: &str = "config.json";

/// Log configuration, persisted as `config.json`.
///
/// Missing fields default to zero on load and unrecognized fields are
/// ignored. `max_segment_count`, `expiration_time` and
/// `expiration_interval` are accepted and persisted but reserved: no
/// retention is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalConfig {
    /// Segment size threshold in bytes that triggers a cycle to a new
    /// segment on the next append. Zero means unbounded.
    #[serde(rename = "MaxSegmentSize", default)]
    pub max_segment_size: u64,

    /// Reserved: maximum number of segments to retain.
    #[serde(rename = "MaxSegmentCount", default)]
    pub max_segment_count: u64,

    /// Reserved: age at which records expire.
    #[serde(rename = "ExpirationTime", default, with = "duration_nanos")]
    pub expiration_time: Duration,

    /// Reserved: how often to check for expired segments.
    #[serde(rename = "ExpirationInterval", default, with = "duration_nanos")]
    pub expiration_interval: Duration,
}

impl WalConfig {
    /// Read the configuration from `dir/config.json`.
    pub fn read_from(dir: &Path) -> WalResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalError::ConfigNotFound(path));
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_reader(BufReader::new(file)).map_err(WalError::ParseConfig)
    }

    /// Write the configuration to `dir/config.json`, pretty-printed with
    /// tab indentation.
    pub fn write_to(&self, dir: &Path) -> WalResult<()> {
        let file = File::create(dir.join(CONFIG_FILE))?;
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(file, formatter);
        self.serialize(&mut serializer)?;
        Ok(())
    }
}

/// Durations persist as integer nanoseconds, matching the on-disk format.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            max_segment_size: 1024 * 1024,
            max_segment_count: 10,
            expiration_time: Duration::from_nanos(1000),
            expiration_interval: Duration::from_nanos(2000),
        };

        config.write_to(dir.path()).unwrap();
        let loaded = WalConfig::read_from(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_on_disk_field_names_and_tabs() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            max_segment_size: 4096,
            ..Default::default()
        };
        config.write_to(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(raw.contains("\t\"MaxSegmentSize\": 4096"));
        assert!(raw.contains("\"MaxSegmentCount\""));
        assert!(raw.contains("\"ExpirationTime\""));
        assert!(raw.contains("\"ExpirationInterval\""));
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "{\n\t\"MaxSegmentSize\": 512\n}",
        )
        .unwrap();

        let loaded = WalConfig::read_from(dir.path()).unwrap();
        assert_eq!(loaded.max_segment_size, 512);
        assert_eq!(loaded.max_segment_count, 0);
        assert_eq!(loaded.expiration_time, Duration::ZERO);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "{\"MaxSegmentSize\": 1, \"FutureKnob\": true}",
        )
        .unwrap();

        let loaded = WalConfig::read_from(dir.path()).unwrap();
        assert_eq!(loaded.max_segment_size, 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        match WalConfig::read_from(dir.path()) {
            Err(WalError::ConfigNotFound(path)) => {
                assert!(path.ends_with(CONFIG_FILE));
            }
            other => panic!("expected ConfigNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json at all").unwrap();

        match WalConfig::read_from(dir.path()) {
            Err(WalError::ParseConfig(_)) => {}
            other => panic!("expected ParseConfig, got: {other:?}"),
        }
    }
}
