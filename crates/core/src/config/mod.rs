use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for a device session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub timeouts: TimeoutConfig,
}

impl AppConfig {
    /// Loads a configuration file. Fields missing from the file keep their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded configuration");
        Ok(config)
    }
}

/// Framing parameters of the device protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Destination capacity used when decoding title replies.
    pub title_capacity: usize,
    /// Largest number of payload bytes read from the source per bulk write.
    pub chunk_size: usize,
    /// Payload distance between two splice headers during upload.
    pub splice_interval: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            title_capacity: 255,
            chunk_size: 0x1000,
            splice_interval: 0x3F10,
        }
    }
}

/// Per-call transport timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub poll_ms: u64,
    pub bulk_ms: u64,
    pub status_ms: u64,
    pub control_write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_ms: 5000,
            bulk_ms: 5000,
            status_ms: 500,
            control_write_ms: 800,
        }
    }
}

impl TimeoutConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn bulk(&self) -> Duration {
        Duration::from_millis(self.bulk_ms)
    }

    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }

    pub fn control_write(&self) -> Duration {
        Duration::from_millis(self.control_write_ms)
    }
}
