// Protocol Module - Typed replies and the legacy "ERROR...ERROR-END..." text encoding
use crate::settings::SettingsDocument;

pub const ERROR_MARKER: &str = "ERROR";
pub const ERROR_END_MARKER: &str = "ERROR-END";

/// Reply to an applySettings request.
///
/// On the wire this is either a plain body (success, usually the stored
/// document) or `ERROR<message>ERROR-END<document>`. The first `ERROR-END`
/// splits the two payloads; anything after it belongs to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResponse {
    pub ok: bool,
    pub message: Option<String>,
    pub document: Option<SettingsDocument>,
}

impl ApplyResponse {
    pub fn accepted(document: Option<SettingsDocument>) -> Self {
        ApplyResponse { ok: true, message: None, document }
    }

    pub fn rejected(message: impl Into<String>, document: Option<SettingsDocument>) -> Self {
        ApplyResponse { ok: false, message: Some(message.into()), document }
    }

    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        if !body.starts_with(ERROR_MARKER) {
            // Success replies may be a document or just a token
            return Ok(ApplyResponse::accepted(serde_json::from_str(body).ok()));
        }

        match body.find(ERROR_END_MARKER) {
            Some(idx) => {
                let message = display_message(&body[..idx]);
                let document = serde_json::from_str(&body[idx + ERROR_END_MARKER.len()..])?;
                Ok(ApplyResponse::rejected(message, Some(document)))
            }
            None => Ok(ApplyResponse::rejected(display_message(body), None)),
        }
    }

    pub fn to_legacy(&self) -> Result<String, serde_json::Error> {
        let document = match &self.document {
            Some(doc) => serde_json::to_string_pretty(doc)?,
            None => String::new(),
        };

        if self.ok {
            return Ok(document);
        }

        // The message must not contain the sentinel or the split moves into it
        let message = self
            .message
            .as_deref()
            .unwrap_or_default()
            .replace(ERROR_END_MARKER, "ERROR_END");
        if self.document.is_some() {
            Ok(format!("{}: {}{}{}", ERROR_MARKER, message, ERROR_END_MARKER, document))
        } else {
            Ok(format!("{}: {}", ERROR_MARKER, message))
        }
    }
}

// Strips the leading "ERROR" marker and an optional ':' separator
fn display_message(raw: &str) -> String {
    raw.strip_prefix(ERROR_MARKER)
        .unwrap_or(raw)
        .trim_start_matches(':')
        .trim()
        .to_string()
}

/// Reply to a command. Only the "starts with ERROR" signal carries meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Accepted(String),
    Rejected(String),
}

impl CommandReply {
    pub fn parse(body: &str) -> Self {
        if body.starts_with(ERROR_MARKER) {
            CommandReply::Rejected(display_message(body))
        } else {
            CommandReply::Accepted(body.to_string())
        }
    }

    pub fn to_legacy(&self) -> String {
        match self {
            CommandReply::Accepted(text) => text.clone(),
            CommandReply::Rejected(message) => format!("{}: {}", ERROR_MARKER, message),
        }
    }
}
