// TUI Module - Terminal front end for the panel
use anyhow::Result;
use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{Mode, MusicMode, PresetColor};
use crate::error::PanelError;
use crate::notify::{NoticeBoard, Severity};
use crate::panel::Panel;
use crate::sync::{ApplyOutcome, SyncState};
use crate::types::{Hsl, Rgb};
use crate::zones::ZONE_COUNT;

const HUE_STEP: f64 = 10.0;
const BRIGHTNESS_STEP: i64 = 10;
const COOLDOWN_STEP: i64 = 10;
const SENSITIVITY_STEP: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Controls,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Bridge,
    ForceBridge,
    Port,
    AudioInput,
    BeatCooldown,
    Sensitivity,
    OpenBrowser,
    DebugMode,
}

impl SettingsField {
    const ALL: [SettingsField; 8] = [
        SettingsField::Bridge,
        SettingsField::ForceBridge,
        SettingsField::Port,
        SettingsField::AudioInput,
        SettingsField::BeatCooldown,
        SettingsField::Sensitivity,
        SettingsField::OpenBrowser,
        SettingsField::DebugMode,
    ];

    fn label(&self) -> &'static str {
        match self {
            SettingsField::Bridge => "Bridge",
            SettingsField::ForceBridge => "Force bridge IP",
            SettingsField::Port => "Bridge port",
            SettingsField::AudioInput => "Audio input",
            SettingsField::BeatCooldown => "Beat cooldown",
            SettingsField::Sensitivity => "Sensitivity",
            SettingsField::OpenBrowser => "Open browser on start",
            SettingsField::DebugMode => "Debug mode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Quit,
    ToggleView,
    ToggleZone(usize),
    ToggleAllZones,
    Hue(f64),
    Brightness(i64),
    TurnOn,
    TurnOff,
    CycleMode(isize),
    NextPreset,
    CycleButton(isize),
    SendButton,
    AddColor,
    RemoveColor,
    Reset,
    Retry,
    // Settings view
    CycleField(isize),
    Adjust(isize),
    TypeChar(char),
    Backspace,
    Apply,
}

/// Every mode in menu order, music modes last
fn all_modes() -> Vec<Mode> {
    Mode::BUILT_IN
        .iter()
        .copied()
        .chain(MusicMode::ALL.iter().map(|m| Mode::Music(*m)))
        .collect()
}

/// Maps a key press to an action for the current view
pub fn key_to_action(key: KeyEvent, view: View, field: SettingsField) -> Option<UiAction> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(UiAction::Quit);
    }

    match view {
        View::Controls => match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(UiAction::Quit),
            KeyCode::Char('s') => Some(UiAction::ToggleView),
            KeyCode::Char('0') => Some(UiAction::ToggleAllZones),
            KeyCode::Char(c @ '1'..='4') => Some(UiAction::ToggleZone(c as usize - '1' as usize)),
            KeyCode::Left => Some(UiAction::Hue(-HUE_STEP)),
            KeyCode::Right => Some(UiAction::Hue(HUE_STEP)),
            KeyCode::Up => Some(UiAction::Brightness(BRIGHTNESS_STEP)),
            KeyCode::Down => Some(UiAction::Brightness(-BRIGHTNESS_STEP)),
            KeyCode::Char('o') => Some(UiAction::TurnOn),
            KeyCode::Char('f') => Some(UiAction::TurnOff),
            KeyCode::Char('m') => Some(UiAction::CycleMode(1)),
            KeyCode::Char('M') => Some(UiAction::CycleMode(-1)),
            KeyCode::Char('p') => Some(UiAction::NextPreset),
            KeyCode::Tab => Some(UiAction::CycleButton(1)),
            KeyCode::BackTab => Some(UiAction::CycleButton(-1)),
            KeyCode::Enter => Some(UiAction::SendButton),
            KeyCode::Char('a') => Some(UiAction::AddColor),
            KeyCode::Char('d') => Some(UiAction::RemoveColor),
            KeyCode::Char('r') => Some(UiAction::Reset),
            KeyCode::Char('R') => Some(UiAction::Retry),
            _ => None,
        },
        View::Settings => match key.code {
            KeyCode::Esc => Some(UiAction::ToggleView),
            KeyCode::Up => Some(UiAction::CycleField(-1)),
            KeyCode::Down | KeyCode::Tab => Some(UiAction::CycleField(1)),
            KeyCode::Left => Some(UiAction::Adjust(-1)),
            KeyCode::Right => Some(UiAction::Adjust(1)),
            KeyCode::Enter => Some(UiAction::Apply),
            KeyCode::Backspace if field == SettingsField::ForceBridge => Some(UiAction::Backspace),
            KeyCode::Char(c) if field == SettingsField::ForceBridge && (c.is_ascii_hexdigit() || c == '.' || c == ':') => {
                Some(UiAction::TypeChar(c))
            }
            KeyCode::Char('s') => Some(UiAction::ToggleView),
            KeyCode::Char('q') => Some(UiAction::Quit),
            KeyCode::Char('R') => Some(UiAction::Retry),
            _ => None,
        },
    }
}

/// Panel state that exists only for the terminal
struct UiState {
    view: View,
    field: usize,
    mode_index: usize,
    preset_index: usize,
    button: usize,
}

impl UiState {
    fn field(&self) -> SettingsField {
        SettingsField::ALL[self.field]
    }
}

// Failures already reached the notice board; this only records them in the log
fn report<T>(action: &str, result: Result<T, PanelError>) {
    if let Err(e) = result {
        if e.is_local() {
            debug!(action, error = %e, "action refused");
        } else {
            warn!(action, error = %e, "action failed");
        }
    }
}

async fn handle_action(panel: &mut Panel, ui: &mut UiState, action: UiAction) {
    match action {
        UiAction::Quit => {}
        UiAction::ToggleView => {
            ui.view = match ui.view {
                View::Controls => View::Settings,
                View::Settings => View::Controls,
            };
        }
        UiAction::ToggleZone(zone) => {
            panel.toggle_zone(zone);
        }
        UiAction::ToggleAllZones => {
            panel.toggle_all_zones();
        }
        UiAction::Hue(delta) => {
            panel.rotate_hue(delta);
        }
        UiAction::Brightness(delta) => panel.set_brightness(panel.brightness() as i64 + delta),
        UiAction::TurnOn => panel.turn_on(),
        UiAction::TurnOff => panel.turn_off(),
        UiAction::CycleMode(step) => {
            let modes = all_modes();
            let next = (ui.mode_index as isize + step).rem_euclid(modes.len() as isize) as usize;
            // The cursor moves on even when a music mode is refused
            ui.mode_index = next;
            report("select mode", panel.select_mode(modes[next]));
        }
        UiAction::NextPreset => {
            panel.preset(PresetColor::ALL[ui.preset_index]);
            ui.preset_index = (ui.preset_index + 1) % PresetColor::ALL.len();
        }
        UiAction::CycleButton(step) => {
            let count = panel.settings().buttons().len();
            if count > 0 {
                ui.button = (ui.button as isize + step).rem_euclid(count as isize) as usize;
            }
        }
        UiAction::SendButton => {
            panel.send_custom_color(ui.button);
        }
        UiAction::AddColor => {
            report("add color", panel.add_current_color().await);
        }
        UiAction::RemoveColor => {
            report("remove color", panel.remove_custom_color(ui.button).await);
            ui.button = ui.button.min(panel.settings().buttons().len().saturating_sub(1));
        }
        UiAction::Reset => {
            report("reset", panel.reset().await);
            ui.button = 0;
        }
        UiAction::Retry => {
            if panel.settings().state() == SyncState::Failed {
                report("retry", panel.retry().await);
            } else {
                report("load", panel.load().await);
            }
        }
        UiAction::CycleField(step) => {
            let len = SettingsField::ALL.len() as isize;
            ui.field = (ui.field as isize + step).rem_euclid(len) as usize;
            // Skip the forced address while it is hidden
            if ui.field() == SettingsField::ForceBridge && !panel.settings().form().debug_mode {
                ui.field = (ui.field as isize + step).rem_euclid(len) as usize;
            }
        }
        UiAction::Adjust(step) => adjust_field(panel, ui.field(), step).await,
        UiAction::TypeChar(c) => panel.settings_mut().edit(|form| form.force_bridge_ip_address.push(c)),
        UiAction::Backspace => panel.settings_mut().edit(|form| {
            form.force_bridge_ip_address.pop();
        }),
        UiAction::Apply => {
            let result = panel.apply().await;
            // A saved document closes the editor; a corrected one stays open for review
            if matches!(result, Ok(ApplyOutcome::Saved)) {
                ui.view = View::Controls;
            }
            report("apply", result);
        }
    }
}

async fn adjust_field(panel: &mut Panel, field: SettingsField, step: isize) {
    let form = panel.settings().form().clone();
    match field {
        SettingsField::Bridge => panel.settings_mut().edit(|form| form.bridge.cycle(step)),
        SettingsField::ForceBridge => {}
        SettingsField::Port => {
            let port = (form.bridge_port as i64 + step as i64).clamp(0, u16::MAX as i64) as u32;
            panel.settings_mut().edit(|form| form.bridge_port = port);
        }
        SettingsField::AudioInput => panel.settings_mut().edit(|form| form.target_data_line.cycle(step)),
        SettingsField::BeatCooldown => {
            report("beat cooldown", panel.set_beat_cooldown(form.beat_cooldown as i64 + step as i64 * COOLDOWN_STEP).await);
        }
        SettingsField::Sensitivity => {
            report("sensitivity", panel.set_sensitivity(form.sensitivity + step as f64 * SENSITIVITY_STEP).await);
        }
        SettingsField::OpenBrowser => panel
            .settings_mut()
            .edit(|form| form.open_browser_on_start = !form.open_browser_on_start),
        SettingsField::DebugMode => panel.set_debug_mode(!form.debug_mode),
    }
}

fn swatch(hex: &str) -> Color {
    match Rgb::from_hex(hex) {
        Ok(rgb) => Color::Rgb(rgb.r, rgb.g, rgb.b),
        Err(_) => Color::Reset,
    }
}

fn hsl_swatch(hsl: &Hsl) -> Color {
    swatch(&hsl.to_hex())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn draw_header(f: &mut Frame, area: ratatui::layout::Rect, panel: &Panel) {
    let zones = panel.zones();
    let mut spans = vec![Span::styled(
        format!(" All {} ", if zones.all_active() { "■" } else { "□" }),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for zone in 0..ZONE_COUNT {
        let selected = zones.mask().is_selected(zone);
        let style = if selected {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" Zone {} ", zone + 1), style));
        spans.push(Span::raw(" "));
    }

    let color = panel.color();
    spans.push(Span::raw(format!("  Brightness {:>3}%  ", panel.brightness())));
    spans.push(Span::styled("      ", Style::default().bg(hsl_swatch(&color))));
    spans.push(Span::raw(format!(" h={:.0}", color.h)));
    if let Some(mode) = panel.mode() {
        spans.push(Span::raw(format!("  Mode {}", mode)));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("rustmilight"));
    f.render_widget(header, area);
}

fn draw_controls(f: &mut Frame, area: ratatui::layout::Rect, panel: &Panel, ui: &UiState) {
    let buttons = panel.settings().buttons();
    let mut lines = vec![
        Line::from("0-4 zones | ←/→ hue | ↑/↓ brightness | o/f on/off | m/M mode | p preset"),
        Line::from("Tab select color | Enter send | a save current | d delete | r reset | s settings | q quit"),
        Line::from(""),
    ];

    if buttons.is_empty() {
        lines.push(Line::from(Span::styled("No custom colors saved", Style::default().fg(Color::DarkGray))));
    }
    for (i, button) in buttons.iter().enumerate() {
        let marker = if i == ui.button { "▶ " } else { "  " };
        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled("    ", Style::default().bg(swatch(&button.hex))),
            Span::raw(format!(" {}  {}", button.hex, button.key)),
        ]));
    }

    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Custom colors"));
    f.render_widget(widget, area);
}

fn draw_settings(f: &mut Frame, area: ratatui::layout::Rect, panel: &Panel, ui: &UiState) {
    let form = panel.settings().form();
    let bridge_label = form
        .bridge
        .selected_index()
        .map(|i| form.bridge.options[i].label.clone())
        .unwrap_or_default();

    let mut lines = vec![
        Line::from("↑/↓ field | ←/→ change | Enter apply | Esc back"),
        Line::from(""),
    ];
    for (i, field) in SettingsField::ALL.iter().enumerate() {
        // The forced address is a debug-only control
        if *field == SettingsField::ForceBridge && !form.debug_mode {
            continue;
        }
        let value = match field {
            SettingsField::Bridge => bridge_label.clone(),
            SettingsField::ForceBridge => format!("{}_", form.force_bridge_ip_address),
            SettingsField::Port => form.bridge_port.to_string(),
            SettingsField::AudioInput => form.target_data_line.value().to_string(),
            SettingsField::BeatCooldown => format!("{} ms", form.beat_cooldown),
            SettingsField::Sensitivity => format!("{:.2}", form.sensitivity),
            SettingsField::OpenBrowser => on_off(form.open_browser_on_start).to_string(),
            SettingsField::DebugMode => on_off(form.debug_mode).to_string(),
        };
        let style = if i == ui.field {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {:<22}", field.label()), style),
            Span::raw(format!(" {}", value)),
        ]));
    }

    let title = format!("Settings ({:?})", panel.settings().state());
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_footer(f: &mut Frame, area: ratatui::layout::Rect, board: &NoticeBoard) {
    let line = match board.latest() {
        Some(notice) => {
            let color = match notice.severity() {
                Severity::Info => Color::Green,
                Severity::Warning => Color::Yellow,
                Severity::Error => Color::Red,
            };
            Line::from(Span::styled(notice.to_string(), Style::default().fg(color)))
        }
        None => Line::from("Ready"),
    };
    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

fn draw(f: &mut Frame, panel: &Panel, ui: &UiState, board: &NoticeBoard) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Zones, brightness, picker
            Constraint::Min(8),    // Custom colors or settings
            Constraint::Length(3), // Latest notice
        ])
        .split(f.size());

    draw_header(f, chunks[0], panel);
    match ui.view {
        View::Controls => draw_controls(f, chunks[1], panel, ui),
        View::Settings => draw_settings(f, chunks[1], panel, ui),
    }
    draw_footer(f, chunks[2], board);
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    panel: &mut Panel,
    ui: &mut UiState,
    board: &NoticeBoard,
) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, panel, ui, board))?;

        if !poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let Some(action) = key_to_action(key, ui.view, ui.field()) else {
            continue;
        };
        if action == UiAction::Quit {
            return Ok(());
        }
        handle_action(panel, ui, action).await;
    }
}

/// Runs the interactive panel until the user quits
pub async fn run_panel(mut panel: Panel, board: Arc<NoticeBoard>) -> Result<()> {
    // Settings problems are shown in the footer; the panel still works for commands
    report("load", panel.load().await);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut ui = UiState { view: View::Controls, field: 0, mode_index: 0, preset_index: 0, button: 0 };

    let result = event_loop(&mut terminal, &mut panel, &mut ui, &board).await;

    // Cleanup terminal
    terminal.show_cursor()?;
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;

    panel.flush().await;
    info!("panel closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandChannel;
    use crate::panel::DEFAULT_COLOR_THROTTLE;
    use crate::sync::{Endpoints, SettingsSync};
    use crate::transport::testing::MockTransport;
    use crate::transport::TransportError;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_control_keys() {
        let field = SettingsField::Bridge;
        assert_eq!(key_to_action(key(KeyCode::Char('3')), View::Controls, field), Some(UiAction::ToggleZone(2)));
        assert_eq!(key_to_action(key(KeyCode::Char('0')), View::Controls, field), Some(UiAction::ToggleAllZones));
        assert_eq!(key_to_action(key(KeyCode::Right), View::Controls, field), Some(UiAction::Hue(HUE_STEP)));
        assert_eq!(key_to_action(key(KeyCode::Char('x')), View::Controls, field), None);
        assert_eq!(
            key_to_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), View::Settings, field),
            Some(UiAction::Quit)
        );
    }

    #[test]
    fn test_force_bridge_field_takes_text() {
        let typed = key_to_action(key(KeyCode::Char('7')), View::Settings, SettingsField::ForceBridge);
        assert_eq!(typed, Some(UiAction::TypeChar('7')));
        // Elsewhere in the settings view letters are shortcuts
        assert_eq!(key_to_action(key(KeyCode::Char('s')), View::Settings, SettingsField::Port), Some(UiAction::ToggleView));
        assert_eq!(key_to_action(key(KeyCode::Char('7')), View::Settings, SettingsField::Port), None);
    }

    fn panel() -> (Arc<MockTransport>, Panel) {
        let transport = Arc::new(MockTransport::new());
        let board = Arc::new(NoticeBoard::new());
        let commands = CommandChannel::new(transport.clone(), board.clone(), "command");
        let settings = SettingsSync::new(transport.clone(), board, Endpoints::default());
        (transport, Panel::new(commands, settings, DEFAULT_COLOR_THROTTLE))
    }

    fn settings_ui() -> UiState {
        UiState { view: View::Settings, field: 0, mode_index: 0, preset_index: 0, button: 0 }
    }

    #[tokio::test]
    async fn test_saved_apply_closes_settings() {
        let (transport, mut panel) = panel();
        transport.reply(r#"{"bridgeIpAddress":"192.168.1.20"}"#);
        panel.load().await.unwrap();

        let mut ui = settings_ui();
        transport.reply("OK");
        handle_action(&mut panel, &mut ui, UiAction::Apply).await;
        assert_eq!(ui.view, View::Controls);
    }

    #[tokio::test]
    async fn test_corrected_apply_keeps_settings_open() {
        let (transport, mut panel) = panel();
        transport.reply(r#"{"bridgeIpAddress":"192.168.1.20"}"#);
        panel.load().await.unwrap();

        let mut ui = settings_ui();
        transport.reply(r#"ERROR: bad port numberERROR-END{"bridgeIpAddress":"192.168.1.20"}"#);
        handle_action(&mut panel, &mut ui, UiAction::Apply).await;
        assert_eq!(ui.view, View::Settings);

        transport.fail(TransportError::Timeout);
        handle_action(&mut panel, &mut ui, UiAction::Apply).await;
        assert_eq!(ui.view, View::Settings);
    }

    #[test]
    fn test_mode_menu_order() {
        let modes = all_modes();
        assert_eq!(modes.len(), 13);
        assert_eq!(modes[0], Mode::ColorWheel);
        assert!(modes[7].is_music());
    }
}
