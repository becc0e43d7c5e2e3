// rustmilight - Control panel and bridge controller for four-zone RGB lighting bridges
// Sends zone-addressed commands and keeps the server's settings document in sync
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod command;
mod config;
mod discovery;
mod error;
mod form;
mod httpd;
mod notify;
mod panel;
mod protocol;
mod settings;
mod store;
mod sync;
mod transport;
mod tui;
mod types;
mod zones;

use command::{Command, CommandChannel, Mode};
use config::{Action, Args, PanelConfig};
use error::PanelError;
use httpd::ServerState;
use notify::NoticeBoard;
use panel::Panel;
use protocol::CommandReply;
use store::SettingsStore;
use sync::{ApplyOutcome, SettingsSync};
use transport::{HttpTransport, Transport};
use types::Hsl;
use zones::{ZoneMask, ZoneSelector};

fn init_logging(verbose: u8, to_file: bool) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rustmilight={},tower_http={}", level, level)));

    if to_file {
        // Keep the terminal clean while the panel owns it
        let path = config::config_dir()?.join("rustmilight.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// "1,0,1,0" addresses a zone mask, a single digit one zone (0 = all)
fn parse_zones(zones: Option<&str>) -> Result<ZoneSelector> {
    match zones {
        None => Ok(ZoneSelector::Mask(ZoneMask::all())),
        Some(value) if value.contains(',') => ZoneSelector::parse("zones", value),
        Some(value) => ZoneSelector::parse("zone", value),
    }
}

/// "h,s,l" as typed on the command line
fn parse_hsl(value: &str) -> Result<Hsl> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid color '{}', expected h,s,l", value))?;
    match parts.as_slice() {
        [h, s, l] => Ok(Hsl::new(*h, *s, *l)),
        _ => bail!("Invalid color '{}', expected h,s,l", value),
    }
}

fn print_notices(board: &NoticeBoard) {
    for notice in board.drain() {
        eprintln!("{}", notice);
    }
}

fn load_config(args: &Args) -> Result<PanelConfig> {
    let cfg_arg = args.cfg.as_deref();
    let config_path = PanelConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    let mut config = if config_file_exists {
        PanelConfig::load_with_path(cfg_arg)
            .with_context(|| format!("Please fix {} or delete it to regenerate defaults", config_path.display()))?
    } else {
        PanelConfig { config_path: Some(config_path), ..PanelConfig::default() }
    };

    let args_provided = config.merge_with_args(args);

    // Create the file on first run; CLI overrides are persisted like the file's own values
    if !config_file_exists || args_provided {
        config.save()?;
    }
    Ok(config)
}

struct Client {
    board: Arc<NoticeBoard>,
    commands: CommandChannel,
    settings: SettingsSync,
}

impl Client {
    fn new(config: &PanelConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.server_url, config.request_timeout())?);
        let board = Arc::new(NoticeBoard::new());
        let commands = CommandChannel::new(transport.clone(), board.clone(), &config.command_endpoint);
        let settings = SettingsSync::new(transport, board.clone(), config.endpoints());
        Ok(Client { board, commands, settings })
    }
}

async fn send_command(client: &Client, command: Command, zones: ZoneSelector) -> Result<()> {
    let reply = client.commands.send(command, zones).await?;
    match reply {
        CommandReply::Accepted(text) => {
            if !text.is_empty() {
                println!("{}", text);
            }
            Ok(())
        }
        CommandReply::Rejected(message) => bail!("{}", message),
    }
}

async fn run_mode(client: &mut Client, name: &str, zones: Option<&str>) -> Result<()> {
    let mode: Mode = name.parse()?;
    let zones = parse_zones(zones)?;
    if mode.is_music() {
        // The audio-input gate needs the current settings
        client.settings.load().await?;
        if !client.settings.document().map(|d| d.has_audio_input()).unwrap_or(false) {
            return Err(PanelError::MissingAudioInput.into());
        }
    }
    send_command(client, Command::SetMode(mode), zones).await
}

async fn run_reset(client: &mut Client) -> Result<()> {
    client.settings.reset().await?;
    let doc = client.settings.document().context("Settings are not loaded")?;
    println!("{}", serde_json::to_string_pretty(doc)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_settings(
    client: &mut Client,
    bridge: Option<String>,
    port: Option<u32>,
    audio_input: Option<String>,
    beat_cooldown: Option<i64>,
    sensitivity: Option<f64>,
    add_color: Option<String>,
    remove_color: Option<String>,
) -> Result<()> {
    let sync = &mut client.settings;
    sync.load().await?;

    let edits = bridge.is_some()
        || port.is_some()
        || audio_input.is_some()
        || beat_cooldown.is_some()
        || sensitivity.is_some();

    if let Some(input) = &audio_input {
        let index = sync
            .form()
            .target_data_line
            .options
            .iter()
            .position(|o| &o.value == input)
            .with_context(|| format!("Audio input '{}' is not offered by the server", input))?;
        sync.edit(|form| form.target_data_line.select(index));
    }
    let mut outcomes = Vec::new();
    if edits {
        sync.edit(|form| {
            if let Some(ip) = bridge {
                form.force_bridge_ip_address = ip;
            }
            if let Some(port) = port {
                form.bridge_port = port;
            }
            if let Some(value) = beat_cooldown {
                form.set_beat_cooldown(value);
            }
            if let Some(value) = sensitivity {
                form.set_sensitivity(value);
            }
        });
        outcomes.push(sync.apply().await?);
    }
    if let Some(color) = add_color {
        outcomes.push(sync.add_custom_color(parse_hsl(&color)?).await?);
    }
    if let Some(color) = remove_color {
        outcomes.push(sync.remove_custom_color(&parse_hsl(&color)?.key()).await?);
    }

    for outcome in outcomes {
        match outcome {
            ApplyOutcome::Saved => info!("settings saved"),
            ApplyOutcome::Recovered { message } => warn!(%message, "server corrected settings"),
        }
    }

    let doc = sync.document().context("Settings are not loaded")?;
    println!("{}", serde_json::to_string_pretty(doc)?);
    Ok(())
}

async fn run_server(config: &PanelConfig, no_discovery: bool) -> Result<()> {
    let settings_path = config.settings_path()?;
    let mut store = SettingsStore::open(&settings_path)?;
    info!(path = %settings_path.display(), "using settings file");

    store.set_audio_inputs(config.audio_inputs.clone());

    let discover = config.discover_bridges && !no_discovery;
    if discover {
        match discovery::discover_bridges(config.discovery_timeout()).await {
            Ok(bridges) => {
                info!(?bridges, "bridges found");
                store.set_possible_bridges(bridges);
            }
            Err(e) => warn!(error = %e, "bridge discovery failed"),
        }
    }

    let state = Arc::new(ServerState::new(store, discover.then(|| config.discovery_timeout())));
    httpd::run_http_server(&config.httpd_ip, config.httpd_port, state).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set global config path immediately (before any config loads)
    PanelConfig::set_config_path(args.cfg.clone());

    let action = args.action.clone().unwrap_or(Action::Panel);
    init_logging(args.verbose, action == Action::Panel)?;

    let config = load_config(&args)?;
    info!(server = %config.server_url, "configuration loaded");

    let mut client = Client::new(&config)?;
    let result = match action {
        Action::Panel => {
            let Client { board, commands, settings } = client;
            let panel = Panel::new(commands, settings, config.color_throttle());
            return tui::run_panel(panel, board).await;
        }
        Action::Send { command, zones } => {
            let command: Command = command.parse()?;
            send_command(&client, command, parse_zones(zones.as_deref())?).await
        }
        Action::Mode { name, zones } => run_mode(&mut client, &name, zones.as_deref()).await,
        Action::Color { hue, saturation, lightness, zones } => {
            let hsl = Hsl::new(hue, saturation, lightness);
            send_command(&client, Command::color(&hsl), parse_zones(zones.as_deref())?).await
        }
        Action::Settings { bridge, port, audio_input, beat_cooldown, sensitivity, add_color, remove_color } => {
            run_settings(&mut client, bridge, port, audio_input, beat_cooldown, sensitivity, add_color, remove_color).await
        }
        Action::Reset => run_reset(&mut client).await,
        Action::Serve { no_discovery, .. } => run_server(&config, no_discovery).await,
    };

    print_notices(&client.board);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Zone;

    #[test]
    fn test_parse_zones() {
        assert_eq!(parse_zones(None).unwrap(), ZoneSelector::Mask(ZoneMask::all()));
        assert_eq!(
            parse_zones(Some("0,1,0,0")).unwrap(),
            ZoneSelector::Mask(ZoneMask([false, true, false, false]))
        );
        assert_eq!(parse_zones(Some("2")).unwrap(), ZoneSelector::Single(Zone::Second));
        assert!(parse_zones(Some("9")).is_err());
    }

    #[test]
    fn test_parse_hsl() {
        assert_eq!(parse_hsl("10, 50,50").unwrap(), Hsl::new(10.0, 50.0, 50.0));
        assert!(parse_hsl("10,50").is_err());
        assert!(parse_hsl("red").is_err());
    }
}
