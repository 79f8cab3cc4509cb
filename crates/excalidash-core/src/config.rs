//! Client-side sync cadences.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for one editing session.
///
/// Every field has a default, so a host config file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Relay server WebSocket endpoint.
    pub server_url: String,
    /// Minimum spacing between element broadcasts (leading + trailing throttle).
    pub element_broadcast_ms: u64,
    /// Minimum spacing between outgoing cursor samples; excess samples are dropped.
    pub cursor_interval_ms: u64,
    /// Cadence at which buffered remote cursors are pushed to the overlay.
    pub cursor_flush_ms: u64,
    /// Quiet time before the structural save.
    pub save_delay_ms: u64,
    /// Quiet time before the preview render.
    pub preview_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:3030/ws".to_string(),
            element_broadcast_ms: 100,
            cursor_interval_ms: 50,
            cursor_flush_ms: 16,
            save_delay_ms: 1000,
            preview_delay_ms: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn element_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.element_broadcast_ms)
    }

    pub fn cursor_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_interval_ms)
    }

    pub fn cursor_flush_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_flush_ms)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    pub fn preview_delay(&self) -> Duration {
        Duration::from_millis(self.preview_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"save_delay_ms": 250}"#).unwrap();
        assert_eq!(config.save_delay(), Duration::from_millis(250));
        assert_eq!(config.element_broadcast_interval(), Duration::from_millis(100));
        assert_eq!(config.cursor_interval(), Duration::from_millis(50));
    }
}
