// Sync Module - Keeps the settings document, the form and the server in step
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PanelError;
use crate::form::{ColorButtons, SettingsForm};
use crate::notify::{Notice, Notifier};
use crate::protocol::ApplyResponse;
use crate::settings::{CustomColor, SettingsDocument};
use crate::transport::{Request, Transport, TransportError, CONTENT_TYPE_JSON};
use crate::types::{ColorKey, Hsl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Synced,
    // Local edits not yet accepted by the server
    Dirty,
    // Server rejected the last document and sent a corrected one
    ErrorRecovered,
    // Last request never got an answer; retry() replays it
    Failed,
}

// Settings request that can be replayed after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Load,
    Reset,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Saved,
    Recovered { message: String },
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub settings: String,
    pub apply: String,
    pub reset: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            settings: "settings.json".to_string(),
            apply: "applySettings".to_string(),
            reset: "resetSettings".to_string(),
        }
    }
}

/// Owner of the settings document.
///
/// Every operation takes `&mut self`, so only one settings request can be in
/// flight. `document` is the last state the server confirmed; local edits to
/// the custom-color list live in `pending` until an apply commits them.
pub struct SettingsSync {
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    endpoints: Endpoints,
    document: Option<SettingsDocument>,
    pending: Option<SettingsDocument>,
    form: SettingsForm,
    buttons: ColorButtons,
    state: SyncState,
    failed: Option<Operation>,
}

impl SettingsSync {
    pub fn new(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>, endpoints: Endpoints) -> Self {
        SettingsSync {
            transport,
            notifier,
            endpoints,
            document: None,
            pending: None,
            form: SettingsForm::default(),
            buttons: ColorButtons::default(),
            state: SyncState::Uninitialized,
            failed: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The document as the user currently sees it (pending edits included)
    pub fn document(&self) -> Option<&SettingsDocument> {
        self.pending.as_ref().or(self.document.as_ref())
    }

    #[cfg(test)]
    pub fn confirmed(&self) -> Option<&SettingsDocument> {
        self.document.as_ref()
    }

    pub fn form(&self) -> &SettingsForm {
        &self.form
    }

    pub fn buttons(&self) -> &ColorButtons {
        &self.buttons
    }

    /// Edits form controls; the change reaches the server on the next apply
    pub fn edit(&mut self, f: impl FnOnce(&mut SettingsForm)) {
        f(&mut self.form);
        if self.state != SyncState::Uninitialized {
            self.transition(SyncState::Dirty);
        }
    }

    /// Debug mode is a view switch: it updates the document without an apply
    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.form.debug_mode = enabled;
        if let Some(doc) = self.pending.as_mut() {
            doc.client_settings.debug_mode = enabled;
        }
        if let Some(doc) = self.document.as_mut() {
            doc.client_settings.debug_mode = enabled;
        }
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "settings state");
            self.state = next;
        }
    }

    fn communication_failed(&mut self, operation: Operation, error: TransportError) -> PanelError {
        warn!(error = %error, ?operation, "settings request failed");
        self.notifier.notify(Notice::CommunicationFailed(error.to_string()));
        self.failed = Some(operation);
        if self.state != SyncState::Uninitialized {
            self.transition(SyncState::Failed);
        }
        PanelError::Transport(error)
    }

    /// Replaces the document wholesale and refreshes every bound control
    fn adopt(&mut self, mut doc: SettingsDocument) {
        doc.normalize_target_data_line();
        self.form = SettingsForm::populate(&doc);
        self.buttons.clear();
        self.buttons.show(doc.custom_colors());

        if !doc.has_bridge() {
            self.notifier.notify(Notice::BridgeRequired);
        }

        info!(
            bridge = %doc.bridge_ip_address,
            custom_colors = doc.custom_colors().len(),
            "settings loaded"
        );
        self.document = Some(doc);
        self.pending = None;
        self.transition(SyncState::Synced);
    }

    fn unreadable_reply(&self, error: serde_json::Error) -> PanelError {
        warn!(error = %error, "settings reply could not be parsed");
        self.notifier.notify(Notice::UnreadableReply(error.to_string()));
        PanelError::Document(error)
    }

    async fn fetch(&mut self, operation: Operation) -> Result<SettingsDocument, PanelError> {
        let path = match operation {
            Operation::Reset => self.endpoints.reset.clone(),
            _ => self.endpoints.settings.clone(),
        };
        let result = self.transport.send(Request::get(&path)).await;
        let body = match result {
            Ok(body) => body,
            Err(e) => return Err(self.communication_failed(operation, e)),
        };
        self.failed = None;
        SettingsDocument::from_json(&body).map_err(|e| self.unreadable_reply(e))
    }

    /// Fetches the settings resource and populates the form from it
    pub async fn load(&mut self) -> Result<(), PanelError> {
        let doc = self.fetch(Operation::Load).await?;
        self.adopt(doc);
        Ok(())
    }

    /// Asks the server to restore defaults and reloads from its reply
    pub async fn reset(&mut self) -> Result<(), PanelError> {
        let doc = self.fetch(Operation::Reset).await?;
        self.buttons.clear();
        self.adopt(doc);
        Ok(())
    }

    /// Reads the form into a snapshot, validates it and sends it.
    ///
    /// The snapshot is committed only once the server answered. A local
    /// validation failure never touches the network.
    pub async fn apply(&mut self) -> Result<ApplyOutcome, PanelError> {
        let mut snapshot = match self.document() {
            Some(doc) => doc.clone(),
            None => return Err(PanelError::NotLoaded),
        };
        self.form.read_into(&mut snapshot);
        snapshot.clamp_ranges();

        if let Err(e) = snapshot.validate_local() {
            self.notifier.notify(Notice::SettingsInvalid(e.to_string()));
            self.pending = Some(snapshot);
            self.transition(SyncState::Dirty);
            return Err(e);
        }

        self.send_snapshot(snapshot).await
    }

    /// Replays the request that last failed in transit; an apply resends
    /// the pending snapshot
    pub async fn retry(&mut self) -> Result<(), PanelError> {
        match self.failed {
            Some(Operation::Load) => self.load().await,
            Some(Operation::Reset) => self.reset().await,
            Some(Operation::Apply) | None => self.apply().await.map(|_| ()),
        }
    }

    async fn send_snapshot(&mut self, snapshot: SettingsDocument) -> Result<ApplyOutcome, PanelError> {
        let body = snapshot.to_json()?;
        let request = Request::post(&self.endpoints.apply, CONTENT_TYPE_JSON, body);

        let result = self.transport.send(request).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.pending = Some(snapshot);
                return Err(self.communication_failed(Operation::Apply, e));
            }
        };
        self.failed = None;

        let response = match ApplyResponse::parse(&reply) {
            Ok(response) => response,
            Err(e) => {
                self.pending = Some(snapshot);
                self.transition(SyncState::Dirty);
                return Err(self.unreadable_reply(e));
            }
        };

        match response {
            ApplyResponse { ok: true, document, .. } => {
                // Prefer the server's copy when the reply carries one
                self.adopt(document.unwrap_or(snapshot));
                self.notifier.notify(Notice::SettingsSaved);
                Ok(ApplyOutcome::Saved)
            }
            ApplyResponse { ok: false, message, document: Some(corrected) } => {
                let message = message.unwrap_or_default();
                warn!(%message, "server corrected settings");
                self.transition(SyncState::ErrorRecovered);
                self.adopt(corrected);
                self.notifier.notify(Notice::SettingsRejected(message.clone()));
                Ok(ApplyOutcome::Recovered { message })
            }
            ApplyResponse { ok: false, message, document: None } => {
                let message = message.unwrap_or_default();
                warn!(%message, "server rejected settings");
                self.pending = Some(snapshot);
                self.transition(SyncState::Dirty);
                self.notifier.notify(Notice::SettingsRejected(message.clone()));
                Err(PanelError::ServerRejected(message))
            }
        }
    }

    fn working_copy(&mut self) -> Result<&mut SettingsDocument, PanelError> {
        let document = self.document.as_ref().ok_or(PanelError::NotLoaded)?;
        Ok(self.pending.get_or_insert_with(|| document.clone()))
    }

    /// Saves `hsl` as a custom color and applies the settings.
    ///
    /// The color stays in the list even if the apply fails, so it is sent
    /// with the next successful apply.
    pub async fn add_custom_color(&mut self, hsl: Hsl) -> Result<ApplyOutcome, PanelError> {
        let color = CustomColor::from_hsl(hsl);
        let key = color.key();
        if self.buttons.contains(&key) {
            self.notifier.notify(Notice::DuplicateColor);
            return Err(PanelError::DuplicateColor(key));
        }

        self.working_copy()?.client_settings.custom_colors.push(color.clone());
        self.transition(SyncState::Dirty);
        let result = self.apply().await;

        // Buttons follow the document: an adopted server copy already
        // re-rendered them, an unsent one still holds the new color
        let kept = self.document().and_then(|doc| doc.find_custom_color(&key)).is_some();
        if kept && !self.buttons.contains(&key) {
            self.buttons.push(&color);
        }
        result
    }

    /// Removes the first custom color with `key` and applies the settings
    pub async fn remove_custom_color(&mut self, key: &ColorKey) -> Result<ApplyOutcome, PanelError> {
        let doc = self.working_copy()?;
        let index = match doc.find_custom_color(key) {
            Some(index) => index,
            None => return Err(PanelError::UnknownColor(key.clone())),
        };

        // Rebuild by exclusion so every remaining color keeps its position
        let remaining: Vec<CustomColor> = doc
            .client_settings
            .custom_colors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| c.clone())
            .collect();
        doc.client_settings.custom_colors = remaining;

        let colors = doc.client_settings.custom_colors.clone();
        self.buttons.clear();
        self.buttons.show(&colors);
        self.transition(SyncState::Dirty);

        self.apply().await
    }
}
