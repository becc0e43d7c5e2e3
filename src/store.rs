// Store Module - Server-side settings document, validation and persistence
use anyhow::{Context, Result};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::protocol::ApplyResponse;
use crate::settings::{clamp_beat_cooldown, clamp_sensitivity, SettingsDocument, NO_TARGET_DATA_LINE};

pub const UPDATE_FAILED: &str = "Failed to update settings";
pub const BAD_PORT: &str = "bad port number";

pub struct SettingsStore {
    path: Option<PathBuf>,
    document: SettingsDocument,
}

impl SettingsStore {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        SettingsStore { path: None, document: SettingsDocument::default() }
    }

    /// Loads the settings file, creating it with defaults when missing
    pub fn open(path: &Path) -> Result<Self> {
        let document = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            info!(path = %path.display(), "creating settings file with defaults");
            SettingsDocument::default()
        };

        let store = SettingsStore { path: Some(path.to_path_buf()), document };
        store.save()?;
        Ok(store)
    }

    pub fn document(&self) -> &SettingsDocument {
        &self.document
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create settings directory")?;
            }
        }
        let json = serde_json::to_string_pretty(&self.document)?;
        fs::write(path, json).with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    fn save_logged(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "settings not persisted");
        }
    }

    pub fn set_possible_bridges(&mut self, mut bridges: Vec<String>) {
        bridges.dedup();
        self.document.possible_bridge_ip_addresses = bridges;
        self.save_logged();
    }

    pub fn set_audio_inputs(&mut self, inputs: Vec<String>) {
        self.document.possible_target_data_lines = inputs;
        self.document.normalize_target_data_line();
        self.save_logged();
    }

    /// Merges a client document into the stored one.
    ///
    /// Fields that fail validation keep their previous value and are reported
    /// together; the reply then carries the corrected document.
    pub fn update(&mut self, body: &str) -> ApplyResponse {
        let incoming: SettingsDocument = match serde_json::from_str(body) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "unparseable settings document");
                return ApplyResponse::rejected(UPDATE_FAILED, None);
            }
        };

        let mut errors = Vec::new();
        let doc = &mut self.document;

        let bridge = incoming.bridge_ip_address.trim();
        if bridge.is_empty() || bridge.parse::<IpAddr>().is_ok() {
            doc.bridge_ip_address = bridge.to_string();
        } else {
            errors.push(format!("Invalid bridge address '{}'", bridge));
        }

        if (1..=u16::MAX as u32).contains(&incoming.bridge_port) {
            doc.bridge_port = incoming.bridge_port;
        } else {
            errors.push(BAD_PORT.to_string());
        }

        if incoming.active_target_data_line == NO_TARGET_DATA_LINE
            || doc.possible_target_data_lines.contains(&incoming.active_target_data_line)
        {
            doc.active_target_data_line = incoming.active_target_data_line;
        } else {
            errors.push(format!("Unknown audio input '{}'", incoming.active_target_data_line));
            doc.active_target_data_line = NO_TARGET_DATA_LINE.to_string();
        }

        doc.open_browser_on_start = incoming.open_browser_on_start;
        doc.beat_cooldown = clamp_beat_cooldown(incoming.beat_cooldown as i64);
        doc.sensitivity = clamp_sensitivity(incoming.sensitivity);
        doc.client_settings = incoming.client_settings;
        doc.extra = incoming.extra;

        self.save_logged();

        if errors.is_empty() {
            info!(bridge = %self.document.bridge_ip_address, "settings updated");
            ApplyResponse::accepted(Some(self.document.clone()))
        } else {
            let message = errors.join("; ");
            warn!(%message, "settings partially rejected");
            ApplyResponse::rejected(message, Some(self.document.clone()))
        }
    }

    /// Restores defaults, keeping what the server discovered on its own
    pub fn reset(&mut self) -> &SettingsDocument {
        let mut defaults = SettingsDocument::default();
        defaults.possible_bridge_ip_addresses = std::mem::take(&mut self.document.possible_bridge_ip_addresses);
        defaults.possible_target_data_lines = std::mem::take(&mut self.document.possible_target_data_lines);
        self.document = defaults;
        self.save_logged();
        info!("settings reset to defaults");
        &self.document
    }
}
