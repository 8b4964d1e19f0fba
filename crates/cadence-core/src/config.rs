// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bus configuration.

use crate::error::{BusError, Result};
use crate::event::ENTER_FRAME;
use serde::{Deserialize, Serialize};

/// Configuration for a [`Bus`](crate::Bus).
///
/// Every field has a default, so a JSON document only needs to name the
/// settings it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name of the reserved event dispatched on every frame tick.
    pub frame_event: String,
    /// Frame rate, in ticks per second, that hosts should start the loop with.
    pub frame_rate: u32,
    /// Name given to the frame loop's background thread.
    pub loop_thread_name: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frame_event: ENTER_FRAME.to_string(),
            frame_rate: 60,
            loop_thread_name: "cadence-frame-loop".to_string(),
        }
    }
}

impl BusConfig {
    /// Parses and validates a configuration from a JSON document.
    ///
    /// ## Arguments
    /// * `json` - The JSON text. Missing fields fall back to their defaults.
    ///
    /// ## Returns
    /// The parsed configuration, or [`BusError::InvalidConfig`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BusError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a bus.
    pub fn validate(&self) -> Result<()> {
        if self.frame_event.trim().is_empty() {
            return Err(BusError::InvalidConfig(
                "frame_event must not be empty".to_string(),
            ));
        }
        if self.frame_rate == 0 {
            return Err(BusError::InvalidConfig(
                "frame_rate must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BusConfig::default();
        assert_eq!(config.frame_event, "EnterFrame");
        assert_eq!(config.frame_rate, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BusConfig::from_json_str(r#"{ "frame_rate": 30 }"#).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.frame_event, "EnterFrame");
        assert_eq!(config.loop_thread_name, "cadence-frame-loop");
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = BusConfig::from_json_str("{ frame_rate: ").unwrap_err();
        assert!(matches!(err, BusError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_rate_and_blank_event_are_rejected() {
        assert!(matches!(
            BusConfig::from_json_str(r#"{ "frame_rate": 0 }"#),
            Err(BusError::InvalidConfig(_))
        ));
        assert!(matches!(
            BusConfig::from_json_str(r#"{ "frame_event": "  " }"#),
            Err(BusError::InvalidConfig(_))
        ));
    }
}
