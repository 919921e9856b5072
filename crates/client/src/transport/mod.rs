//! HTTP exchange with the provider.
//!
//! `Transport` is the seam between the dispatch engine and the network: it
//! takes a request relative to the provider host and returns the raw answer.
//! Status handling lives in [`classify`]; authentication is attached by the
//! implementation.

pub mod classify;
pub mod http;

use std::collections::HashMap;

use crate::context::RequestContext;
use crate::error::TransportError;

pub use classify::classify;
pub use http::{Credentials, HttpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the provider host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Vec<u8>>,
}

impl ProviderRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Status, headers and body of a completed exchange.
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one HTTP exchange with the provider.
///
/// Implementations must honor the context budget and report unreachability
/// as [`TransportError::Connect`] so that push jobs can retry it.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        ctx: &RequestContext,
        request: &ProviderRequest,
    ) -> Result<RawResponse, TransportError>;
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, path.trim_start_matches('/'))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://h/v3/", "/push"), "https://h/v3/push");
        assert_eq!(join_url("https://h/v3", "push"), "https://h/v3/push");
        assert_eq!(join_url("https://h/v3", "/push"), "https://h/v3/push");
        assert_eq!(join_url("", "/push"), "/push");
        assert_eq!(join_url("https://h", ""), "https://h");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let raw = RawResponse::new(429, "").with_header("X-Rate-Limit-Reset", "7");
        assert_eq!(raw.header("x-rate-limit-reset"), Some("7"));
        assert_eq!(raw.header("X-RATE-LIMIT-RESET"), Some("7"));
        assert!(!raw.is_success());
    }
}
