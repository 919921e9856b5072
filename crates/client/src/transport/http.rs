//! `reqwest`-backed transport.

use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace};

use super::{Method, ProviderRequest, RawResponse, Transport, join_url};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::TransportError;

const USER_AGENT: &str = concat!("pushgate/", env!("CARGO_PKG_VERSION"));

/// Basic-auth credentials attached to every request.
#[derive(Clone)]
pub struct Credentials {
    pub app_key: String,
    pub master_secret: String,
}

impl Credentials {
    pub fn new(app_key: impl Into<String>, master_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            master_secret: master_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("master_secret", &"<redacted>")
            .finish()
    }
}

/// Blocking HTTP transport with a shared connection pool.
///
/// Workers call it from their own threads, one request at a time each.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    host: String,
    credentials: Credentials,
}

impl HttpTransport {
    /// `timeout` applies when the request context does not set a tighter one.
    pub fn new(
        host: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: host.into(),
            credentials,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(
            config.host.clone(),
            Credentials::new(config.app_key.clone(), config.master_secret.clone()),
            config.request_timeout,
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        ctx: &RequestContext,
        request: &ProviderRequest,
    ) -> Result<RawResponse, TransportError> {
        let budget = ctx.budget()?;
        let url = join_url(&self.host, &request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .basic_auth(&self.credentials.app_key, Some(&self.credentials.master_secret));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        if let Some(budget) = budget {
            builder = builder.timeout(budget);
        }

        trace!(method = ?request.method, url = %url, "sending provider request");
        let response = builder.send().map_err(map_send_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| TransportError::Body(e.to_string()))?
            .to_vec();

        debug!(method = ?request.method, path = %request.path, status, "provider answered");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
