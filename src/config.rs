use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings. Every field has a default, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name this application registers with the MIDI subsystem
    pub client_name: String,
    /// How often the device lists are re-read
    pub refresh_interval_ms: u64,
    /// Incoming messages that may queue up between UI frames
    pub relay_capacity: usize,
    /// Lines kept in the MIDI monitor
    pub log_capacity: usize,
    /// Where control captions are saved and loaded
    pub labels_path: PathBuf,
    /// Channel (0-15) for the on-screen keyboard
    pub keyboard_channel: u8,
    pub keyboard_velocity: u8,
}

impl AppConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Load from JSON file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to JSON file
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_name: "midi-pedal".to_string(),
            refresh_interval_ms: 500,
            relay_capacity: crate::relay::DEFAULT_CAPACITY,
            log_capacity: 500,
            labels_path: PathBuf::from("labels.json"),
            keyboard_channel: 0,
            keyboard_velocity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "refresh_interval_ms": 250, "keyboard_channel": 9 }"#)
                .unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_millis(250));
        assert_eq!(config.keyboard_channel, 9);
        assert_eq!(config.client_name, "midi-pedal");
        assert_eq!(config.relay_capacity, 1024);
    }
}
