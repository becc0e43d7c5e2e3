// Notify Module - User-visible notices (the panel's toasts)
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SettingsSaved,
    // Server rejected the document; carries the server's message
    SettingsRejected(String),
    // Local validation failure, nothing was sent
    SettingsInvalid(String),
    BridgeRequired,
    DuplicateColor,
    MissingAudioInput,
    CommandFailed(String),
    CommunicationFailed(String),
    // Reply arrived but could not be read as a settings document
    UnreadableReply(String),
}

impl Notice {
    pub fn severity(&self) -> Severity {
        match self {
            Notice::SettingsSaved => Severity::Info,
            Notice::BridgeRequired | Notice::DuplicateColor | Notice::MissingAudioInput => {
                Severity::Warning
            }
            Notice::SettingsRejected(_)
            | Notice::SettingsInvalid(_)
            | Notice::CommandFailed(_)
            | Notice::CommunicationFailed(_)
            | Notice::UnreadableReply(_) => Severity::Error,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SettingsSaved => write!(f, "Settings saved"),
            Notice::SettingsRejected(msg) => write!(f, "Settings not saved: {}", msg),
            Notice::SettingsInvalid(msg) => write!(f, "{}", msg),
            Notice::BridgeRequired => write!(f, "No bridge configured. Select a bridge in the settings."),
            Notice::DuplicateColor => write!(f, "This color is already saved"),
            Notice::MissingAudioInput => write!(f, "Select an audio input to use music modes"),
            Notice::CommandFailed(msg) => write!(f, "Bridge error: {}", msg),
            Notice::CommunicationFailed(msg) => write!(f, "Communication with the server failed: {}", msg),
            Notice::UnreadableReply(msg) => write!(f, "Server sent unreadable settings: {}", msg),
        }
    }
}

/// Sink for notices. Implementations must tolerate calls from spawned tasks.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Bounded notice history; the TUI shows the latest entry and the one-shot
/// CLI drains it after each action.
pub struct NoticeBoard {
    entries: Mutex<VecDeque<Notice>>,
    capacity: usize,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        NoticeBoard::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        NoticeBoard { entries: Mutex::new(VecDeque::new()), capacity: capacity.max(1) }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<Notice>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn latest(&self) -> Option<Notice> {
        self.entries().back().cloned()
    }

    pub fn drain(&self) -> Vec<Notice> {
        self.entries().drain(..).collect()
    }
}

impl Notifier for NoticeBoard {
    fn notify(&self, notice: Notice) {
        match notice.severity() {
            Severity::Info => info!(%notice, "notice"),
            Severity::Warning | Severity::Error => warn!(%notice, "notice"),
        }

        let mut entries = self.entries();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(notice);
    }
}
