// HTTP Server Module - Bridge controller endpoints: settings resource, apply/reset and commands
use anyhow::{Context, Result};
use axum::{
    extract::{RawQuery, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::command::Command;
use crate::discovery;
use crate::protocol::{ApplyResponse, CommandReply};
use crate::settings::SettingsDocument;
use crate::store::SettingsStore;
use crate::zones::{ZoneMask, ZoneSelector};

pub const NO_BRIDGE: &str = "Please create a bridge";
pub const NEEDS_AUDIO_INPUT: &str = "Select audio input to use music modes";
const MISSING_COMMAND: &str = "Command not found!";

/// Shared server state. Settings updates are serialized by the store lock.
pub struct ServerState {
    store: Mutex<SettingsStore>,
    // Re-run bridge discovery on reset with this reply window
    discovery: Option<Duration>,
}

impl ServerState {
    pub fn new(store: SettingsStore, discovery: Option<Duration>) -> Self {
        ServerState { store: Mutex::new(store), discovery }
    }

    async fn document(&self) -> SettingsDocument {
        self.store.lock().await.document().clone()
    }

    /// Runs one command against the current settings
    async fn execute(&self, command: Command, zones: ZoneSelector) -> CommandReply {
        let doc = self.document().await;
        if !doc.has_bridge() {
            return CommandReply::Rejected(NO_BRIDGE.to_string());
        }
        if let Command::SetMode(mode) = &command {
            if mode.is_music() && !doc.has_audio_input() {
                return CommandReply::Rejected(NEEDS_AUDIO_INPUT.to_string());
            }
        }

        info!(%command, zones = %zones.to_mask(), bridge = %doc.bridge_ip_address, "command accepted");
        CommandReply::Accepted(describe(&command))
    }
}

fn describe(command: &Command) -> String {
    match command {
        Command::TurnOn => "Turned on".to_string(),
        Command::TurnOff => "Turned off".to_string(),
        Command::SetBrightness(value) => format!("Set brightness to {}", value),
        Command::SetColorTo(value) => format!("Set color to {}", value),
        Command::SetMode(mode) => format!("Changed mode to: {}", mode),
        Command::SetPresetColor(color) => format!("Changed color to {}", color.name().to_lowercase()),
    }
}

/// Parses `command=<cmd>&zones=<mask>` or `command=<cmd>&zone=<n>`.
/// A missing zone field addresses every zone.
pub fn parse_command_request(body: &str) -> Result<(Command, ZoneSelector), String> {
    let mut command = None;
    let mut zones = None;

    for pair in body.trim().split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "command" => command = Some(value),
            "zone" | "zones" => {
                zones = Some(ZoneSelector::parse(key, value).map_err(|e| e.to_string())?);
            }
            _ => {}
        }
    }

    let command: Command = command
        .ok_or_else(|| MISSING_COMMAND.to_string())?
        .parse()
        .map_err(|e: anyhow::Error| e.to_string())?;
    Ok((command, zones.unwrap_or(ZoneSelector::Mask(ZoneMask::all()))))
}

fn text(body: String) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

fn json_document(doc: &SettingsDocument) -> Response {
    match serde_json::to_string_pretty(doc) {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn get_settings(State(state): State<Arc<ServerState>>) -> Response {
    json_document(&state.document().await)
}

async fn apply_settings(State(state): State<Arc<ServerState>>, body: String) -> Response {
    let response: ApplyResponse = state.store.lock().await.update(&body);
    match response.to_legacy() {
        Ok(body) => text(body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn reset_settings(State(state): State<Arc<ServerState>>) -> Response {
    // Discovery runs outside the lock so commands keep flowing meanwhile
    let bridges = match state.discovery {
        Some(wait) => match discovery::discover_bridges(wait).await {
            Ok(bridges) => Some(bridges),
            Err(e) => {
                warn!(error = %e, "bridge discovery failed");
                None
            }
        },
        None => None,
    };

    let mut store = state.store.lock().await;
    if let Some(bridges) = bridges {
        store.set_possible_bridges(bridges);
    }
    json_document(store.reset())
}

async fn run_command(state: &ServerState, request: &str) -> Response {
    let reply = match parse_command_request(request) {
        Ok((command, zones)) => state.execute(command, zones).await,
        Err(message) => CommandReply::Rejected(message),
    };
    if let CommandReply::Rejected(message) = &reply {
        warn!(%request, %message, "command rejected");
    }
    text(reply.to_legacy())
}

async fn post_command(State(state): State<Arc<ServerState>>, body: String) -> Response {
    run_command(&state, &body).await
}

async fn get_command(State(state): State<Arc<ServerState>>, RawQuery(query): RawQuery) -> Response {
    run_command(&state, query.as_deref().unwrap_or_default()).await
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/settings.json", get(get_settings))
        .route("/applySettings", post(apply_settings))
        .route("/resetSettings", get(reset_settings))
        .route("/command", get(get_command).post(post_command))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_http_server(ip: &str, port: u16, state: Arc<ServerState>) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router(state)).await.context("HTTP server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Mode;
    use crate::zones::Zone;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(bridge: &str) -> Arc<ServerState> {
        let mut store = SettingsStore::in_memory();
        store.set_audio_inputs(vec!["Line In".to_string()]);
        if !bridge.is_empty() {
            store.update(&format!(r#"{{"bridgeIpAddress":"{}"}}"#, bridge));
        }
        Arc::new(ServerState::new(store, None))
    }

    async fn call(state: &Arc<ServerState>, request: Request<Body>) -> (StatusCode, String) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder().method("POST").uri(uri).body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_command_request() {
        let (command, zones) = parse_command_request("command=setColorTo:28&zones=1,0,1,0").unwrap();
        assert_eq!(command, Command::SetColorTo(28));
        assert_eq!(zones, ZoneSelector::Mask(ZoneMask([true, false, true, false])));

        let (_, zones) = parse_command_request("command=turnOn&zone=3").unwrap();
        assert_eq!(zones, ZoneSelector::Single(Zone::Third));

        assert_eq!(parse_command_request("command=jump&zones=1,1,1,1").unwrap_err(), "Command not found!");
        assert_eq!(parse_command_request("zones=1,1,1,1").unwrap_err(), "Command not found!");
    }

    #[tokio::test]
    async fn test_settings_resource() {
        let state = state("192.168.1.20");
        let (status, body) = call(&state, get("/settings.json")).await;
        assert_eq!(status, StatusCode::OK);
        let doc = SettingsDocument::from_json(&body).unwrap();
        assert_eq!(doc.bridge_ip_address, "192.168.1.20");
        assert_eq!(doc.possible_target_data_lines, vec!["Line In".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_bad_port_returns_corrected_document() {
        let state = state("192.168.1.20");
        let (status, body) = call(&state, post("/applySettings", r#"{"bridgeIpAddress":"192.168.1.20","bridgePort":99999}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let response = ApplyResponse::parse(&body).unwrap();
        assert_eq!(response.message.as_deref(), Some("bad port number"));
        assert_eq!(response.document.unwrap().bridge_port, 5987);
    }

    #[tokio::test]
    async fn test_apply_unparseable() {
        let state = state("");
        let (_, body) = call(&state, post("/applySettings", "not json")).await;
        assert_eq!(body, "ERROR: Failed to update settings");
    }

    #[tokio::test]
    async fn test_command_without_bridge() {
        let state = state("");
        let (_, body) = call(&state, post("/command", "command=turnOn&zones=1,1,1,1")).await;
        assert_eq!(body, "ERROR: Please create a bridge");
    }

    #[tokio::test]
    async fn test_commands_are_described() {
        let state = state("192.168.1.20");
        let (_, body) = call(&state, post("/command", "command=setColorTo:28&zones=1,0,0,0")).await;
        assert_eq!(body, "Set color to 28");
        let (_, body) = call(&state, get("/command?command=setMode:Party&zone=0")).await;
        assert_eq!(body, "Changed mode to: Party");
        let (_, body) = call(&state, post("/command", "command=setMode:Disco&zones=1,1,1,1")).await;
        assert_eq!(body, "ERROR: Unknown Mode");
    }

    #[test]
    fn test_missing_zone_addresses_all() {
        let (command, zones) = parse_command_request("command=setMode:Party").unwrap();
        assert_eq!(command, Command::SetMode(Mode::Party));
        assert_eq!(zones, ZoneSelector::Mask(ZoneMask::all()));
    }

    #[tokio::test]
    async fn test_music_mode_needs_audio_input() {
        let state = state("192.168.1.20");
        let (_, body) = call(&state, post("/command", "command=setMode:MPulse&zones=1,1,1,1")).await;
        assert_eq!(body, "ERROR: Select audio input to use music modes");

        call(&state, post("/applySettings", r#"{"bridgeIpAddress":"192.168.1.20","activeTargetDataLine":"Line In"}"#)).await;
        let (_, body) = call(&state, post("/command", "command=setMode:MPulse&zones=1,1,1,1")).await;
        assert_eq!(body, "Changed mode to: MPulse");
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let state = state("192.168.1.20");
        let (_, body) = call(&state, get("/resetSettings")).await;
        let doc = SettingsDocument::from_json(&body).unwrap();
        assert_eq!(doc.bridge_ip_address, "");
        assert_eq!(doc.possible_target_data_lines, vec!["Line In".to_string()]);
    }
}
