// Panel Module - UI-facing facade over the command channel and settings sync
use futures::future::join_all;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{Command, CommandChannel, Mode, PresetColor};
use crate::error::PanelError;
use crate::sync::{ApplyOutcome, SettingsSync};
use crate::types::Hsl;
use crate::zones::ZoneSelection;

pub const DEFAULT_COLOR_THROTTLE: Duration = Duration::from_millis(150);

pub struct Panel {
    commands: CommandChannel,
    settings: SettingsSync,
    zones: ZoneSelection,
    brightness: u8,
    color: Hsl,
    mode: Option<Mode>,
    color_throttle: Duration,
    last_color_sent: Option<Instant>,
    in_flight: Vec<JoinHandle<()>>,
}

impl Panel {
    pub fn new(commands: CommandChannel, settings: SettingsSync, color_throttle: Duration) -> Self {
        Panel {
            commands,
            settings,
            zones: ZoneSelection::new(),
            brightness: 100,
            color: Hsl::default(),
            mode: None,
            color_throttle,
            last_color_sent: None,
            in_flight: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SettingsSync {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsSync {
        &mut self.settings
    }

    pub fn zones(&self) -> &ZoneSelection {
        &self.zones
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn color(&self) -> Hsl {
        self.color
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }

    fn send(&mut self, command: Command) {
        let handle = self.commands.dispatch(command, self.zones.selector());
        self.track(handle);
    }

    /// Waits for every command sent so far
    pub async fn flush(&mut self) {
        for result in join_all(self.in_flight.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "command task failed");
            }
        }
    }

    pub fn toggle_zone(&mut self, zone: usize) -> bool {
        self.zones.toggle(zone)
    }

    pub fn toggle_all_zones(&mut self) -> bool {
        self.zones.toggle_all()
    }

    pub fn turn_on(&mut self) {
        self.send(Command::TurnOn);
    }

    pub fn turn_off(&mut self) {
        self.send(Command::TurnOff);
    }

    pub fn set_brightness(&mut self, value: i64) {
        let command = Command::brightness(value);
        if let Command::SetBrightness(clamped) = command {
            self.brightness = clamped;
        }
        self.send(command);
    }

    pub fn preset(&mut self, color: PresetColor) {
        self.send(Command::SetPresetColor(color));
    }

    /// Moves the picker to `hsl`. Returns whether a command went out.
    pub fn pick_color(&mut self, hsl: Hsl) -> bool {
        self.pick_color_at(hsl, Instant::now())
    }

    fn pick_color_at(&mut self, hsl: Hsl, now: Instant) -> bool {
        self.color = hsl;
        if let Some(last) = self.last_color_sent {
            if now.saturating_duration_since(last) < self.color_throttle {
                debug!(hue = hsl.h, "color pick throttled");
                return false;
            }
        }
        self.last_color_sent = Some(now);
        self.send(Command::color(&hsl));
        true
    }

    pub fn rotate_hue(&mut self, delta: f64) -> bool {
        self.pick_color(self.color.rotate(delta))
    }

    /// Sends the color of custom-color button `index`, bypassing the throttle
    pub fn send_custom_color(&mut self, index: usize) -> Option<Hsl> {
        let hsl = self.settings.buttons().get(index)?.hsl;
        self.color = hsl;
        self.send(Command::color(&hsl));
        Some(hsl)
    }

    pub fn select_mode(&mut self, mode: Mode) -> Result<(), PanelError> {
        let handle = self
            .commands
            .set_mode(mode, self.settings.document(), self.zones.selector())?;
        self.track(handle);
        self.mode = Some(mode);
        Ok(())
    }

    pub async fn load(&mut self) -> Result<(), PanelError> {
        self.settings.load().await
    }

    pub async fn apply(&mut self) -> Result<ApplyOutcome, PanelError> {
        self.settings.apply().await
    }

    pub async fn retry(&mut self) -> Result<(), PanelError> {
        self.settings.retry().await
    }

    pub async fn reset(&mut self) -> Result<(), PanelError> {
        self.settings.reset().await
    }

    pub async fn add_current_color(&mut self) -> Result<ApplyOutcome, PanelError> {
        self.settings.add_custom_color(self.color).await
    }

    pub async fn remove_custom_color(&mut self, index: usize) -> Result<ApplyOutcome, PanelError> {
        let key = match self.settings.buttons().get(index) {
            Some(button) => button.key.clone(),
            None => return Err(PanelError::UnknownColor(self.color.key())),
        };
        self.settings.remove_custom_color(&key).await
    }

    // Slider edits are applied as soon as they change
    pub async fn set_beat_cooldown(&mut self, value: i64) -> Result<ApplyOutcome, PanelError> {
        self.settings.edit(|form| form.set_beat_cooldown(value));
        self.settings.apply().await
    }

    pub async fn set_sensitivity(&mut self, value: f64) -> Result<ApplyOutcome, PanelError> {
        self.settings.edit(|form| form.set_sensitivity(value));
        self.settings.apply().await
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.settings.set_debug_mode(enabled);
    }
}
