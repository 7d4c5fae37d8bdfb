//! Flat connection state record
//!
//! Snapshot of the monitor and pause controller taken when persisting, and
//! exported/imported as a flat object with camelCase keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection and pause bookkeeping for one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub opponent_connected: bool,
    pub battle_paused: bool,
    pub guest_reconnecting: bool,
    /// Wall clock (ms since epoch) of the current pause start
    #[serde(default)]
    pub pause_start_time: Option<i64>,
    /// Accumulated pause time in milliseconds
    #[serde(default)]
    pub total_pause_time: u64,
    /// Smoothed latency estimate in milliseconds
    #[serde(default)]
    pub connection_latency: u64,
    #[serde(default)]
    pub tab_was_hidden: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            opponent_connected: true,
            battle_paused: false,
            guest_reconnecting: false,
            pause_start_time: None,
            total_pause_time: 0,
            connection_latency: 0,
            tab_was_hidden: false,
        }
    }
}

impl ConnectionState {
    /// Export as a flat JSON object.
    pub fn export(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Import from a flat JSON object. Missing optional keys take defaults.
    pub fn import(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_uses_camel_case() {
        let state = ConnectionState {
            battle_paused: true,
            pause_start_time: Some(1_700_000_000_000),
            total_pause_time: 2500,
            connection_latency: 240,
            ..ConnectionState::default()
        };
        let value = state.export().unwrap();

        assert_eq!(value["opponentConnected"], true);
        assert_eq!(value["battlePaused"], true);
        assert_eq!(value["guestReconnecting"], false);
        assert_eq!(value["pauseStartTime"], 1_700_000_000_000i64);
        assert_eq!(value["totalPauseTime"], 2500);
        assert_eq!(value["connectionLatency"], 240);
        assert_eq!(value["tabWasHidden"], false);
    }

    #[test]
    fn test_import_defaults_optional_keys() {
        let state = ConnectionState::import(&json!({
            "opponentConnected": false,
            "battlePaused": true,
            "guestReconnecting": true
        }))
        .unwrap();

        assert!(!state.opponent_connected);
        assert!(state.battle_paused);
        assert_eq!(state.pause_start_time, None);
        assert_eq!(state.total_pause_time, 0);
    }

    #[test]
    fn test_import_rejects_wrong_types() {
        assert!(ConnectionState::import(&json!({"opponentConnected": "yes"})).is_err());
    }
}
