// Command Module - Command vocabulary and the fire-and-forget command channel
use anyhow::{anyhow, bail};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::PanelError;
use crate::notify::{Notice, Notifier};
use crate::protocol::CommandReply;
use crate::settings::SettingsDocument;
use crate::transport::{Request, Transport, CONTENT_TYPE_TEXT};
use crate::types::{encode_hue, Hsl};
use crate::zones::ZoneSelector;

// Music modes need an audio input on the server side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicMode {
    Cyclic,
    CyclicMultipleColors,
    Flashing,
    Pulse,
    Sequential,
    Siren,
}

impl MusicMode {
    pub const ALL: [MusicMode; 6] = [
        MusicMode::Cyclic,
        MusicMode::CyclicMultipleColors,
        MusicMode::Flashing,
        MusicMode::Pulse,
        MusicMode::Sequential,
        MusicMode::Siren,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MusicMode::Cyclic => "Cyclic",
            MusicMode::CyclicMultipleColors => "CyclicMultipleColors",
            MusicMode::Flashing => "Flashing",
            MusicMode::Pulse => "Pulse",
            MusicMode::Sequential => "Sequential",
            MusicMode::Siren => "Siren",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ColorWheel,
    BreathingColorWheel,
    Party,
    PartyMultipleColors,
    FlashRed,
    FlashGreen,
    FlashBlue,
    Music(MusicMode),
}

impl Mode {
    pub const BUILT_IN: [Mode; 7] = [
        Mode::ColorWheel,
        Mode::BreathingColorWheel,
        Mode::Party,
        Mode::PartyMultipleColors,
        Mode::FlashRed,
        Mode::FlashGreen,
        Mode::FlashBlue,
    ];

    pub fn is_music(&self) -> bool {
        matches!(self, Mode::Music(_))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ColorWheel => write!(f, "ColorWheel"),
            Mode::BreathingColorWheel => write!(f, "BreathingColorWheel"),
            Mode::Party => write!(f, "Party"),
            Mode::PartyMultipleColors => write!(f, "PartyMultipleColors"),
            Mode::FlashRed => write!(f, "FlashRed"),
            Mode::FlashGreen => write!(f, "FlashGreen"),
            Mode::FlashBlue => write!(f, "FlashBlue"),
            Mode::Music(music) => write!(f, "M{}", music.name()),
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        if let Some(name) = s.strip_prefix('M') {
            if let Some(music) = MusicMode::ALL.iter().find(|m| m.name() == name) {
                return Ok(Mode::Music(*music));
            }
        }
        Mode::BUILT_IN
            .iter()
            .find(|m| m.to_string() == s)
            .copied()
            .ok_or_else(|| anyhow!("Unknown Mode"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetColor {
    Red,
    Green,
    Blue,
    Orange,
    Yellow,
    Lavender,
    Aqua,
    Lime,
}

impl PresetColor {
    pub const ALL: [PresetColor; 8] = [
        PresetColor::Red,
        PresetColor::Green,
        PresetColor::Blue,
        PresetColor::Orange,
        PresetColor::Yellow,
        PresetColor::Lavender,
        PresetColor::Aqua,
        PresetColor::Lime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PresetColor::Red => "Red",
            PresetColor::Green => "Green",
            PresetColor::Blue => "Blue",
            PresetColor::Orange => "Orange",
            PresetColor::Yellow => "Yellow",
            PresetColor::Lavender => "Lavender",
            PresetColor::Aqua => "Aqua",
            PresetColor::Lime => "Lime",
        }
    }
}

/// A command as sent verbatim in the `command=` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TurnOn,
    TurnOff,
    SetBrightness(u8),
    SetColorTo(u8),
    SetMode(Mode),
    SetPresetColor(PresetColor),
}

impl Command {
    pub fn brightness(value: i64) -> Self {
        Command::SetBrightness(value.clamp(0, 100) as u8)
    }

    // Only the hue reaches the bridge; saturation and lightness are dropped
    pub fn color(hsl: &Hsl) -> Self {
        Command::SetColorTo(encode_hue(hsl.h))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::TurnOn => write!(f, "turnOn"),
            Command::TurnOff => write!(f, "turnOff"),
            Command::SetBrightness(value) => write!(f, "setBrightness:{}", value),
            Command::SetColorTo(value) => write!(f, "setColorTo:{}", value),
            Command::SetMode(mode) => write!(f, "setMode:{}", mode),
            Command::SetPresetColor(color) => write!(f, "setColor{}", color.name()),
        }
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        if let Some(value) = s.strip_prefix("setBrightness:") {
            let value: i64 = value.parse().map_err(|_| anyhow!("Invalid brightness"))?;
            return Ok(Command::brightness(value));
        }
        if let Some(value) = s.strip_prefix("setColorTo:") {
            // The bridge takes a byte; larger values wrap like a byte cast
            let value: i64 = value.parse().map_err(|_| anyhow!("invalid color"))?;
            return Ok(Command::SetColorTo(value.rem_euclid(256) as u8));
        }
        if let Some(mode) = s.strip_prefix("setMode:") {
            return Ok(Command::SetMode(mode.parse()?));
        }

        match s {
            "turnOn" => Ok(Command::TurnOn),
            "turnOff" => Ok(Command::TurnOff),
            other => {
                if let Some(name) = other.strip_prefix("setColor") {
                    if let Some(color) = PresetColor::ALL.iter().find(|c| c.name() == name) {
                        return Ok(Command::SetPresetColor(*color));
                    }
                }
                bail!("Command not found!")
            }
        }
    }
}

/// Sends commands to the bridge controller.
///
/// Cloning is cheap; every clone shares the transport and notifier.
#[derive(Clone)]
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    endpoint: String,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>, endpoint: &str) -> Self {
        CommandChannel { transport, notifier, endpoint: endpoint.to_string() }
    }

    pub fn payload(command: &Command, zones: &ZoneSelector) -> String {
        format!("command={}&{}={}", command, zones.key(), zones.to_wire())
    }

    /// Sends one command and waits for the reply.
    ///
    /// Rejections and transport failures are also reported to the notifier.
    pub async fn send(&self, command: Command, zones: ZoneSelector) -> Result<CommandReply, PanelError> {
        let body = Self::payload(&command, &zones);
        debug!(%body, "sending command");

        let request = Request::post(&self.endpoint, CONTENT_TYPE_TEXT, body);
        match self.transport.send(request).await {
            Ok(text) => {
                let reply = CommandReply::parse(&text);
                if let CommandReply::Rejected(message) = &reply {
                    warn!(%command, %message, "command rejected");
                    self.notifier.notify(Notice::CommandFailed(message.clone()));
                }
                Ok(reply)
            }
            Err(e) => {
                warn!(%command, error = %e, "command could not be delivered");
                self.notifier.notify(Notice::CommunicationFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Fire-and-forget variant of `send`
    pub fn dispatch(&self, command: Command, zones: ZoneSelector) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            // Failures were already logged and surfaced by send()
            let _ = channel.send(command, zones).await;
        })
    }

    /// Dispatches a mode change. Music modes are suppressed while the
    /// settings name no audio input.
    pub fn set_mode(
        &self,
        mode: Mode,
        settings: Option<&SettingsDocument>,
        zones: ZoneSelector,
    ) -> Result<JoinHandle<()>, PanelError> {
        if mode.is_music() && !settings.map(|s| s.has_audio_input()).unwrap_or(false) {
            self.notifier.notify(Notice::MissingAudioInput);
            return Err(PanelError::MissingAudioInput);
        }
        Ok(self.dispatch(Command::SetMode(mode), zones))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeBoard;
    use crate::transport::testing::MockTransport;
    use crate::transport::TransportError;
    use crate::zones::{Zone, ZoneMask};

    fn channel() -> (Arc<MockTransport>, Arc<NoticeBoard>, CommandChannel) {
        let transport = Arc::new(MockTransport::new());
        let board = Arc::new(NoticeBoard::new());
        let channel = CommandChannel::new(transport.clone(), board.clone(), "command");
        (transport, board, channel)
    }

    #[test]
    fn test_command_strings() {
        assert_eq!(Command::brightness(80).to_string(), "setBrightness:80");
        assert_eq!(Command::brightness(150).to_string(), "setBrightness:100");
        assert_eq!(Command::color(&Hsl::new(0.0, 100.0, 50.0)).to_string(), "setColorTo:28");
        assert_eq!(Command::SetMode(Mode::Party).to_string(), "setMode:Party");
        assert_eq!(
            Command::SetMode(Mode::Music(MusicMode::CyclicMultipleColors)).to_string(),
            "setMode:MCyclicMultipleColors"
        );
        assert_eq!(Command::SetPresetColor(PresetColor::Lavender).to_string(), "setColorLavender");
    }

    #[test]
    fn test_parse_every_mode() {
        for mode in Mode::BUILT_IN.iter().copied().chain(MusicMode::ALL.iter().map(|m| Mode::Music(*m))) {
            let command = Command::SetMode(mode);
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
        assert!("setMode:MDisco".parse::<Command>().is_err());
        assert!("setMode:Disco".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_misc_commands() {
        assert_eq!("turnOff".parse::<Command>().unwrap(), Command::TurnOff);
        assert_eq!("setColorTo:256".parse::<Command>().unwrap(), Command::SetColorTo(0));
        assert_eq!("setColorAqua".parse::<Command>().unwrap(), Command::SetPresetColor(PresetColor::Aqua));
        assert!("setBrightness:abc".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[test]
    fn test_payload() {
        let zones = ZoneSelector::Mask(ZoneMask([true, false, true, false]));
        assert_eq!(
            CommandChannel::payload(&Command::TurnOn, &zones),
            "command=turnOn&zones=1,0,1,0"
        );
        assert_eq!(
            CommandChannel::payload(&Command::brightness(40), &ZoneSelector::Single(Zone::Second)),
            "command=setBrightness:40&zone=2"
        );
    }

    #[tokio::test]
    async fn test_send_posts_to_command_endpoint() {
        let (transport, board, channel) = channel();
        transport.reply("Set color to 28");

        let reply = channel
            .send(Command::SetColorTo(28), ZoneSelector::Mask(ZoneMask::all()))
            .await
            .unwrap();

        assert_eq!(reply, CommandReply::Accepted("Set color to 28".to_string()));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "command");
        assert_eq!(requests[0].content_type, "text/plain;");
        assert_eq!(requests[0].body, "command=setColorTo:28&zones=1,1,1,1");
        assert!(board.latest().is_none());
    }

    #[tokio::test]
    async fn test_error_reply_raises_notice() {
        let (transport, board, channel) = channel();
        transport.reply("ERROR: Please create a bridge");

        let reply = channel.send(Command::TurnOn, ZoneSelector::Mask(ZoneMask::all())).await.unwrap();

        assert!(matches!(reply, CommandReply::Rejected(_)));
        assert_eq!(board.latest(), Some(Notice::CommandFailed("Please create a bridge".to_string())));
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let (transport, board, channel) = channel();
        transport.fail(TransportError::Timeout);

        let handle = channel.dispatch(Command::TurnOff, ZoneSelector::Mask(ZoneMask::all()));
        handle.await.unwrap();

        assert!(matches!(board.latest(), Some(Notice::CommunicationFailed(_))));
    }

    #[tokio::test]
    async fn test_music_mode_needs_audio_input() {
        let (transport, board, channel) = channel();
        let settings = SettingsDocument::default();

        let result = channel.set_mode(
            Mode::Music(MusicMode::Pulse),
            Some(&settings),
            ZoneSelector::Mask(ZoneMask::all()),
        );

        assert!(matches!(result, Err(PanelError::MissingAudioInput)));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(board.latest(), Some(Notice::MissingAudioInput));
    }

    #[tokio::test]
    async fn test_music_mode_with_audio_input() {
        let (transport, _board, channel) = channel();
        let mut settings = SettingsDocument::default();
        settings.possible_target_data_lines = vec!["Line In".to_string()];
        settings.active_target_data_line = "Line In".to_string();

        let handle = channel
            .set_mode(Mode::Music(MusicMode::Siren), Some(&settings), ZoneSelector::Mask(ZoneMask::all()))
            .unwrap();
        handle.await.unwrap();

        assert_eq!(transport.requests()[0].body, "command=setMode:MSiren&zones=1,1,1,1");
    }

    #[tokio::test]
    async fn test_built_in_mode_ignores_audio_input() {
        let (transport, _board, channel) = channel();
        let handle = channel
            .set_mode(Mode::FlashBlue, None, ZoneSelector::Mask(ZoneMask::all()))
            .unwrap();
        handle.await.unwrap();
        assert_eq!(transport.request_count(), 1);
    }
}
