// Transport Module - Request/response primitive shared by commands and settings sync
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const CONTENT_TYPE_JSON: &str = "application/json;";
pub const CONTENT_TYPE_TEXT: &str = "text/plain;";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server answered with status {status}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub content_type: &'static str,
    pub body: String,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Request {
            method: Method::Get,
            path: path.to_string(),
            content_type: CONTENT_TYPE_TEXT,
            body: String::new(),
        }
    }

    pub fn post(path: &str, content_type: &'static str, body: String) -> Self {
        Request { method: Method::Post, path: path.to_string(), content_type, body }
    }
}

/// Sends one request and hands back the response body.
///
/// Anything other than a 200 status is an error; the body of a 200 response
/// is returned verbatim, including "ERROR..." bodies, which callers interpret.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<String, TransportError> {
        let url = self.url(&request.path);
        debug!(method = ?request.method, %url, body = %request.body, "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url).body(request.body),
        };

        let response = builder
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        debug!(%url, %body, "received response");
        Ok(body)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory transport: replays queued replies and records every request
    #[derive(Default)]
    pub struct MockTransport {
        replies: Mutex<VecDeque<Result<String, TransportError>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(&self, body: &str) -> &Self {
            self.replies.lock().unwrap().push_back(Ok(body.to_string()));
            self
        }

        pub fn fail(&self, error: TransportError) -> &Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: Request) -> Result<String, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }
}
