// Settings Module - The settings document exchanged with the bridge controller
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PanelError;
use crate::types::{ColorKey, Hsl};

// activeTargetDataLine value meaning "no audio input selected"
pub const NO_TARGET_DATA_LINE: &str = "none";

pub const BEAT_COOLDOWN_MAX: u32 = 1000;
pub const SENSITIVITY_MIN: f64 = 0.5;
pub const SENSITIVITY_MAX: f64 = 1.5;
pub const DEFAULT_BRIDGE_PORT: u32 = 5987;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomColor {
    pub hsl: Hsl,
    pub hex: String,
}

impl CustomColor {
    pub fn from_hsl(hsl: Hsl) -> Self {
        CustomColor { hex: hsl.to_hex(), hsl }
    }

    pub fn key(&self) -> ColorKey {
        self.hsl.key()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    pub debug_mode: bool,
    pub custom_colors: Vec<CustomColor>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings { debug_mode: false, custom_colors: Vec::new() }
    }
}

/// Whole settings document, exchanged as one JSON blob.
///
/// Keys this client does not know about are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsDocument {
    pub open_browser_on_start: bool,
    pub bridge_ip_address: String,
    pub bridge_port: u32,
    pub active_target_data_line: String,
    pub possible_bridge_ip_addresses: Vec<String>,
    pub possible_target_data_lines: Vec<String>,
    pub beat_cooldown: u32,
    pub sensitivity: f64,
    pub client_settings: ClientSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        SettingsDocument {
            open_browser_on_start: true,
            bridge_ip_address: String::new(),
            bridge_port: DEFAULT_BRIDGE_PORT,
            active_target_data_line: NO_TARGET_DATA_LINE.to_string(),
            possible_bridge_ip_addresses: Vec::new(),
            possible_target_data_lines: Vec::new(),
            beat_cooldown: 100,
            sensitivity: 1.0,
            client_settings: ClientSettings::default(),
            extra: Map::new(),
        }
    }
}

impl SettingsDocument {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, PanelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn has_bridge(&self) -> bool {
        !self.bridge_ip_address.trim().is_empty()
    }

    pub fn has_audio_input(&self) -> bool {
        self.active_target_data_line != NO_TARGET_DATA_LINE
    }

    // Checks done before a document may leave the client
    pub fn validate_local(&self) -> Result<(), PanelError> {
        if !self.has_bridge() {
            return Err(PanelError::MissingBridge);
        }
        Ok(())
    }

    /// Resets the audio input to "none" unless it is one the server offered
    pub fn normalize_target_data_line(&mut self) {
        if self.has_audio_input()
            && !self.possible_target_data_lines.contains(&self.active_target_data_line)
        {
            self.active_target_data_line = NO_TARGET_DATA_LINE.to_string();
        }
    }

    pub fn clamp_ranges(&mut self) {
        self.beat_cooldown = self.beat_cooldown.min(BEAT_COOLDOWN_MAX);
        self.sensitivity = clamp_sensitivity(self.sensitivity);
    }

    pub fn custom_colors(&self) -> &[CustomColor] {
        &self.client_settings.custom_colors
    }

    pub fn find_custom_color(&self, key: &ColorKey) -> Option<usize> {
        self.client_settings.custom_colors.iter().position(|c| &c.key() == key)
    }
}

pub fn clamp_beat_cooldown(value: i64) -> u32 {
    value.clamp(0, BEAT_COOLDOWN_MAX as i64) as u32
}

pub fn clamp_sensitivity(value: f64) -> f64 {
    if value.is_nan() {
        return SENSITIVITY_MIN;
    }
    value.clamp(SENSITIVITY_MIN, SENSITIVITY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "openBrowserOnStart": false,
        "bridgeIpAddress": "192.168.1.20",
        "bridgePort": 5987,
        "activeTargetDataLine": "Line In",
        "possibleBridgeIpAddresses": ["192.168.1.20", "192.168.1.21"],
        "possibleTargetDataLines": ["Line In", "Microphone"],
        "beatCooldown": 250,
        "sensitivity": 1.2,
        "clientSettings": {
            "debugMode": true,
            "customColors": [
                {"hsl": {"h": 10, "s": 50, "l": 50}, "hex": "#bf5540"}
            ]
        },
        "hasBridge": true
    }"##;

    #[test]
    fn test_parse_document() {
        let doc = SettingsDocument::from_json(SAMPLE).unwrap();
        assert!(!doc.open_browser_on_start);
        assert_eq!(doc.bridge_ip_address, "192.168.1.20");
        assert_eq!(doc.possible_target_data_lines.len(), 2);
        assert_eq!(doc.beat_cooldown, 250);
        assert!(doc.client_settings.debug_mode);
        assert_eq!(doc.custom_colors()[0].key().to_string(), "10/50/50");
        assert!(doc.has_audio_input());
    }

    #[test]
    fn test_unknown_keys_survive() {
        let doc = SettingsDocument::from_json(SAMPLE).unwrap();
        assert_eq!(doc.extra.get("hasBridge"), Some(&Value::Bool(true)));

        let json = doc.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["hasBridge"], Value::Bool(true));
        assert_eq!(value["bridgeIpAddress"], "192.168.1.20");
        assert_eq!(value["clientSettings"]["customColors"][0]["hex"], "#bf5540");
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let doc = SettingsDocument::from_json(r#"{"bridgeIpAddress":"1.2.3.4"}"#).unwrap();
        assert_eq!(doc.bridge_ip_address, "1.2.3.4");
        assert_eq!(doc.bridge_port, DEFAULT_BRIDGE_PORT);
        assert_eq!(doc.active_target_data_line, NO_TARGET_DATA_LINE);
        assert!(doc.custom_colors().is_empty());
    }

    #[test]
    fn test_validate_local() {
        let mut doc = SettingsDocument::default();
        assert!(matches!(doc.validate_local(), Err(PanelError::MissingBridge)));
        doc.bridge_ip_address = "   ".to_string();
        assert!(matches!(doc.validate_local(), Err(PanelError::MissingBridge)));
        doc.bridge_ip_address = "10.0.0.2".to_string();
        assert!(doc.validate_local().is_ok());
    }

    #[test]
    fn test_normalize_target_data_line() {
        let mut doc = SettingsDocument::from_json(SAMPLE).unwrap();
        doc.normalize_target_data_line();
        assert_eq!(doc.active_target_data_line, "Line In");

        doc.active_target_data_line = "Unplugged".to_string();
        doc.normalize_target_data_line();
        assert_eq!(doc.active_target_data_line, NO_TARGET_DATA_LINE);
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_beat_cooldown(-5), 0);
        assert_eq!(clamp_beat_cooldown(1500), 1000);
        assert_eq!(clamp_beat_cooldown(420), 420);
        assert_eq!(clamp_sensitivity(0.1), 0.5);
        assert_eq!(clamp_sensitivity(2.0), 1.5);
        assert_eq!(clamp_sensitivity(0.75), 0.75);
        assert_eq!(clamp_sensitivity(f64::NAN), 0.5);
    }
}
