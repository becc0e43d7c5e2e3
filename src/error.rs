// Error Module - Failure taxonomy shared by the command channel and the settings sync
use thiserror::Error;

use crate::transport::TransportError;
use crate::types::ColorKey;

#[derive(Debug, Error)]
pub enum PanelError {
    // Local validation, never transmitted
    #[error("Please select a bridge before applying changes.")]
    MissingBridge,

    // Server refused the document and sent no corrected copy back
    #[error("server rejected settings: {0}")]
    ServerRejected(String),

    #[error("communication failed: {0}")]
    Transport(#[from] TransportError),

    #[error("custom color {0} already exists")]
    DuplicateColor(ColorKey),

    #[error("custom color {0} not found")]
    UnknownColor(ColorKey),

    #[error("select an audio input to use music modes")]
    MissingAudioInput,

    #[error("invalid settings document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("settings have not been loaded yet")]
    NotLoaded,
}

impl PanelError {
    /// True for failures detected before anything reached the network
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            PanelError::MissingBridge
                | PanelError::DuplicateColor(_)
                | PanelError::UnknownColor(_)
                | PanelError::MissingAudioInput
                | PanelError::NotLoaded
        )
    }
}
