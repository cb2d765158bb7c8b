use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 40;

const MIN_HEARTBEAT_MS: u64 = 1_000;
const FLUSH_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 10..=200;

/// Final, merged process configuration.
///
/// Merge order: defaults, then the config file in the data dir, then CLI
/// flags. The admin config endpoint patches the file and the live snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Idle interval before a comment keepalive frame is written.
    pub heartbeat_ms: u64,
    /// Coalescing window for streamed text deltas.
    pub flush_interval_ms: u64,
    pub data_dir: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            data_dir: "data".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Heartbeat interval with the 1s floor applied.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(MIN_HEARTBEAT_MS))
    }

    /// Flush interval; out-of-range values fall back to the default.
    pub fn flush_interval(&self) -> Duration {
        let ms = if FLUSH_INTERVAL_RANGE_MS.contains(&self.flush_interval_ms) {
            self.flush_interval_ms
        } else {
            DEFAULT_FLUSH_INTERVAL_MS
        };
        Duration::from_millis(ms)
    }

    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(host) = patch.host {
            self.host = host;
        }
        if let Some(port) = patch.port {
            self.port = port;
        }
        if let Some(heartbeat_ms) = patch.heartbeat_ms {
            self.heartbeat_ms = heartbeat_ms;
        }
        if let Some(flush_interval_ms) = patch.flush_interval_ms {
            self.flush_interval_ms = flush_interval_ms;
        }
        if let Some(data_dir) = patch.data_dir {
            self.data_dir = data_dir;
        }
    }
}

/// Partial layer used for the config file and for admin patches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl ConfigPatch {
    pub fn overlay(&mut self, other: ConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.heartbeat_ms.is_some() {
            self.heartbeat_ms = other.heartbeat_ms;
        }
        if other.flush_interval_ms.is_some() {
            self.flush_interval_ms = other.flush_interval_ms;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.port, 8787);
        assert_eq!(cfg.heartbeat(), Duration::from_millis(15_000));
        assert_eq!(cfg.flush_interval(), Duration::from_millis(40));
    }

    #[test]
    fn heartbeat_floor() {
        let cfg = ProxyConfig {
            heartbeat_ms: 200,
            ..ProxyConfig::default()
        };
        assert_eq!(cfg.heartbeat(), Duration::from_millis(1_000));
    }

    #[test]
    fn flush_interval_out_of_range_falls_back() {
        let mut cfg = ProxyConfig {
            flush_interval_ms: 5,
            ..ProxyConfig::default()
        };
        assert_eq!(cfg.flush_interval(), Duration::from_millis(40));
        cfg.flush_interval_ms = 5_000;
        assert_eq!(cfg.flush_interval(), Duration::from_millis(40));
        cfg.flush_interval_ms = 120;
        assert_eq!(cfg.flush_interval(), Duration::from_millis(120));
    }

    #[test]
    fn overlay_prefers_later_layer() {
        let mut base = ConfigPatch {
            port: Some(9000),
            ..ConfigPatch::default()
        };
        base.overlay(ConfigPatch {
            port: Some(9001),
            heartbeat_ms: Some(2_000),
            ..ConfigPatch::default()
        });
        assert_eq!(base.port, Some(9001));
        assert_eq!(base.heartbeat_ms, Some(2_000));

        let mut cfg = ProxyConfig::default();
        cfg.apply(base);
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.heartbeat_ms, 2_000);
    }
}
