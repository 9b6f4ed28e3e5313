//! # Core Configuration Module
//!
//! Builder-based configuration for the catalog core.
//!
//! `CoreConfig` carries the injected host capabilities plus the handful of
//! knobs the session manager and catalog client read. The builder fails fast
//! with an actionable message when a required capability is missing.
//!
//! ## Required Dependencies
//!
//! - `Navigator` - performs the login redirect
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `HttpClient` - desktop default (`ReqwestHttpClient`) with the
//!   `desktop-shims` feature, otherwise required
//! - `Clock` - `SystemClock`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .api_prefix("https://app.example.com/api/catalog")
//!     .navigator(Arc::new(MyNavigator))
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`CoreConfigBuilder::from_env`] seeds a builder from `CATALOG_API_PREFIX`
//! and `CATALOG_REQUEST_TIMEOUT_SECS`. Explicit builder calls made afterwards
//! win.

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, Navigator, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default API prefix for a locally served backend.
pub const DEFAULT_API_PREFIX: &str = "http://localhost:3000/api/catalog";

/// Access tokens expiring within this window are refreshed before use.
pub const DEFAULT_TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_API_PREFIX: &str = "CATALOG_API_PREFIX";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CATALOG_REQUEST_TIMEOUT_SECS";

/// Core configuration. Construct with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL every route is appended to, without a trailing slash.
    pub api_prefix: String,

    pub http_client: Arc<dyn HttpClient>,

    pub navigator: Arc<dyn Navigator>,

    pub clock: Arc<dyn Clock>,

    /// Applied to requests that do not set their own timeout.
    pub request_timeout: Duration,

    pub token_refresh_buffer: Duration,

    /// Capacity of the event bus broadcast channel.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_prefix", &self.api_prefix)
            .field("http_client", &"HttpClient { ... }")
            .field("navigator", &"Navigator { ... }")
            .field("request_timeout", &self.request_timeout)
            .field("token_refresh_buffer", &self.token_refresh_buffer)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Joins `path` onto the API prefix. `path` must start with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_prefix, path)
    }

    /// Checks value ranges. Called by [`CoreConfigBuilder::build`].
    pub fn validate(&self) -> Result<()> {
        validate_api_prefix(&self.api_prefix)?;

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.token_refresh_buffer > Duration::from_secs(24 * 60 * 60) {
            return Err(Error::Config(
                "Token refresh buffer exceeds maximum of 24 hours".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_api_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::Config("API prefix cannot be empty".to_string()));
    }

    let url = Url::parse(prefix)
        .map_err(|e| Error::Config(format!("API prefix '{}' is not a URL: {}", prefix, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "API prefix must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::Config(
            "API prefix must not carry a query string or fragment".to_string(),
        ));
    }

    Ok(())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_timeout(timeout));
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject an HttpClient adapter with .http_client()."
            .to_string(),
    })
}

fn navigator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "Navigator".to_string(),
        message: "A Navigator is required to start the login redirect. \
                 Desktop: inject bridge_desktop::SystemBrowserNavigator. \
                 Headless: inject bridge_traits::RecordingNavigator and surface the URL yourself."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_prefix: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Option<Arc<dyn Clock>>,
    request_timeout: Option<Duration>,
    token_refresh_buffer: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Builder seeded from the process environment.
    ///
    /// # Errors
    ///
    /// `Error::Config` when `CATALOG_REQUEST_TIMEOUT_SECS` is not a positive
    /// integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(prefix) = lookup(ENV_API_PREFIX).filter(|v| !v.trim().is_empty()) {
            builder = builder.api_prefix(prefix.trim());
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_REQUEST_TIMEOUT_SECS, raw
                ))
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    /// Base URL for every route, e.g. `https://app.example.com/api/catalog`.
    /// A trailing slash is stripped.
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.api_prefix = Some(prefix.trim_end_matches('/').to_string());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the navigator (required).
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn token_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.token_refresh_buffer = Some(buffer);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` when no navigator is set, or no HTTP
    ///   client is set and no desktop default is compiled in
    /// - `Error::Config` for out-of-range values
    pub fn build(self) -> Result<CoreConfig> {
        let navigator = self.navigator.ok_or_else(navigator_missing_error)?;
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = CoreConfig {
            api_prefix: self
                .api_prefix
                .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            http_client,
            navigator,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            request_timeout,
            token_refresh_buffer: self
                .token_refresh_buffer
                .unwrap_or(DEFAULT_TOKEN_REFRESH_BUFFER),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
