// Config Module - Configuration management and command-line argument parsing
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::panel::DEFAULT_COLOR_THROTTLE;
use crate::sync::Endpoints;

const APP_DIR: &str = "rustmilight";

// Global storage for custom config path
static CUSTOM_CONFIG_PATH: OnceLock<Option<String>> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Terminal control panel and bridge controller for MiLight-style RGB lighting",
    long_about = "Controls a four-zone RGB lighting bridge through a bridge controller server.\n\
                  Sends zone-addressed commands (color, brightness, modes) and keeps the\n\
                  server's settings document in sync. Can also run the server itself."
)]
pub struct Args {
    /// Bridge controller URL
    #[arg(short = 'S', long)]
    pub server: Option<String>,

    /// Config name (in ~/.config/rustmilight) or path
    #[arg(long)]
    pub cfg: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Action {
    /// Interactive terminal panel (default)
    Panel,

    /// Send one command string, e.g. "turnOn" or "setBrightness:40"
    Send {
        command: String,
        /// Zone mask "1,0,1,0" or single zone 0-4
        #[arg(short, long)]
        zones: Option<String>,
    },

    /// Switch the animation mode, e.g. "Party" or "MPulse"
    Mode {
        name: String,
        #[arg(short, long)]
        zones: Option<String>,
    },

    /// Send a color by hue
    Color {
        hue: f64,
        #[arg(long, default_value_t = 100.0)]
        saturation: f64,
        #[arg(long, default_value_t = 50.0)]
        lightness: f64,
        #[arg(short, long)]
        zones: Option<String>,
    },

    /// Show the settings document, or change fields and apply them
    Settings {
        #[arg(long)]
        bridge: Option<String>,
        #[arg(long)]
        port: Option<u32>,
        #[arg(long)]
        audio_input: Option<String>,
        #[arg(long)]
        beat_cooldown: Option<i64>,
        #[arg(long)]
        sensitivity: Option<f64>,
        /// Save a custom color given as "h,s,l"
        #[arg(long)]
        add_color: Option<String>,
        /// Remove a custom color given as "h,s,l"
        #[arg(long)]
        remove_color: Option<String>,
    },

    /// Restore the server's default settings
    Reset,

    /// Run the bridge controller server
    Serve {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Settings document location
        #[arg(long)]
        settings_file: Option<String>,
        /// Skip UDP bridge discovery
        #[arg(long)]
        no_discovery: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    // Client
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub color_throttle_ms: u64,
    pub settings_endpoint: String,
    pub apply_endpoint: String,
    pub reset_endpoint: String,
    pub command_endpoint: String,

    // Server
    pub httpd_ip: String,
    pub httpd_port: u16,
    pub settings_file: String,
    pub discover_bridges: bool,
    pub discovery_timeout_ms: u64,
    pub audio_inputs: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            config_path: None,
            server_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_ms: 5000,
            color_throttle_ms: DEFAULT_COLOR_THROTTLE.as_millis() as u64,
            settings_endpoint: "settings.json".to_string(),
            apply_endpoint: "applySettings".to_string(),
            reset_endpoint: "resetSettings".to_string(),
            command_endpoint: "command".to_string(),
            httpd_ip: "0.0.0.0".to_string(),
            httpd_port: 8080,
            settings_file: String::new(),
            discover_bridges: true,
            discovery_timeout_ms: 1000,
            audio_inputs: Vec::new(),
        }
    }
}

/// ~/.config/rustmilight, created on demand
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    let dir = PathBuf::from(home).join(".config").join(APP_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

impl PanelConfig {
    /// Applies command-line overrides. Returns true if any were given.
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        let mut args_provided = false;

        if let Some(ref server) = args.server {
            self.server_url = server.clone();
            args_provided = true;
        }
        if let Some(timeout) = args.timeout_ms {
            self.request_timeout_ms = timeout;
            args_provided = true;
        }
        if let Some(Action::Serve { ip, port, settings_file, .. }) = &args.action {
            if let Some(ip) = ip {
                self.httpd_ip = ip.clone();
                args_provided = true;
            }
            if let Some(port) = port {
                self.httpd_port = *port;
                args_provided = true;
            }
            if let Some(file) = settings_file {
                self.settings_file = file.clone();
                args_provided = true;
            }
        }

        self.sanitize();
        args_provided
    }

    /// Set the global config path (called once at startup)
    pub fn set_config_path(cfg: Option<String>) {
        let _ = CUSTOM_CONFIG_PATH.set(cfg);
    }

    fn get_config_path_arg() -> Option<&'static str> {
        CUSTOM_CONFIG_PATH.get().and_then(|opt| opt.as_deref())
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        // Priority: explicit arg > global > default
        let Some(cfg) = cfg_arg.or_else(|| Self::get_config_path_arg()) else {
            return Ok(config_dir()?.join("config.conf"));
        };

        let path = PathBuf::from(cfg);
        if path.is_absolute() || cfg.contains('/') || cfg.contains('\\') {
            return Ok(path);
        }

        // Otherwise a config name in the config directory
        let filename = if cfg.ends_with(".conf") { cfg.to_string() } else { format!("{}.conf", cfg) };
        Ok(config_dir()?.join(filename))
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        parsed.config_path = Some(path);
        parsed.sanitize();
        Ok(parsed)
    }

    /// Trims strings and clamps numbers to usable ranges
    pub fn sanitize(&mut self) {
        self.server_url = self.server_url.trim().trim_end_matches('/').to_string();
        if !self.server_url.contains("://") && !self.server_url.is_empty() {
            self.server_url = format!("http://{}", self.server_url);
        }
        for endpoint in [
            &mut self.settings_endpoint,
            &mut self.apply_endpoint,
            &mut self.reset_endpoint,
            &mut self.command_endpoint,
        ] {
            *endpoint = endpoint.trim().trim_start_matches('/').to_string();
        }
        self.httpd_ip = self.httpd_ip.trim().to_string();
        self.settings_file = self.settings_file.trim().to_string();
        self.audio_inputs = self
            .audio_inputs
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != crate::settings::NO_TARGET_DATA_LINE)
            .collect();

        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 120_000);
        self.color_throttle_ms = self.color_throttle_ms.min(5000);
        self.httpd_port = self.httpd_port.max(1);
        self.discovery_timeout_ms = self.discovery_timeout_ms.clamp(50, 30_000);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn color_throttle(&self) -> Duration {
        Duration::from_millis(self.color_throttle_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            settings: self.settings_endpoint.clone(),
            apply: self.apply_endpoint.clone(),
            reset: self.reset_endpoint.clone(),
        }
    }

    /// Settings document location; defaults to settings.json next to the config
    pub fn settings_path(&self) -> Result<PathBuf> {
        if !self.settings_file.is_empty() {
            return Ok(PathBuf::from(&self.settings_file));
        }
        Ok(config_dir()?.join("settings.json"))
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::config_path(None)?,
        };

        let mut sanitized = self.clone();
        sanitized.sanitize();

        let audio_inputs = sanitized
            .audio_inputs
            .iter()
            .map(|s| quoted(s))
            .collect::<Vec<_>>()
            .join(", ");

        // Build TOML with comments manually for better documentation
        let contents = format!(
            r#"# rustmilight configuration file

# ---- Panel / client ----

# Bridge controller the panel talks to
server_url = {}

# Give up on a request after this many milliseconds
request_timeout_ms = {}

# Minimum time between two color commands while dragging the picker
color_throttle_ms = {}

# Endpoint paths, relative to server_url
settings_endpoint = {}
apply_endpoint = {}
reset_endpoint = {}
command_endpoint = {}

# ---- Server (rustmilight serve) ----

httpd_ip = {}
httpd_port = {}

# Where the settings document is stored (empty: settings.json next to this file)
settings_file = {}

# Look for bridges on the local network at startup and on reset
discover_bridges = {}
discovery_timeout_ms = {}

# Audio inputs offered to clients for music modes
audio_inputs = [{}]
"#,
            quoted(&sanitized.server_url),
            sanitized.request_timeout_ms,
            sanitized.color_throttle_ms,
            quoted(&sanitized.settings_endpoint),
            quoted(&sanitized.apply_endpoint),
            quoted(&sanitized.reset_endpoint),
            quoted(&sanitized.command_endpoint),
            quoted(&sanitized.httpd_ip),
            sanitized.httpd_port,
            quoted(&sanitized.settings_file),
            sanitized.discover_bridges,
            sanitized.discovery_timeout_ms,
            audio_inputs,
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
