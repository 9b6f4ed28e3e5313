//! Core service façade and bootstrap helpers.
//!
//! Wires a [`CoreConfig`] into one event bus, one [`SessionManager`] and a
//! [`CatalogClient`] that borrows the session's bearer tokens. Desktop hosts
//! typically enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`]; other hosts inject their own HTTP client and
//! navigator through the config builder.

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::{Clock, HttpClient, Navigator};
pub use core_auth::{SessionManager, SessionPhase, SessionSnapshot, UserProfile};
pub use core_catalog::CatalogClient;
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder};
pub use core_runtime::events::{CoreEvent, EventBus};

use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    events: EventBus,
    session: SessionManager,
    catalog: CatalogClient,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    pub fn new(config: CoreConfig) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        let session = SessionManager::new(&config, events.clone());
        let catalog = CatalogClient::new(&config)
            .with_session(session.clone())
            .with_events(events.clone());

        info!(api_prefix = %config.api_prefix, "Core service initialized");

        Self {
            config,
            events,
            session,
            catalog,
        }
    }

    /// Build `builder` and create the service from it.
    ///
    /// # Errors
    ///
    /// `CoreError::CapabilityMissing` when a required bridge is absent,
    /// `CoreError::InitializationFailed` for invalid settings.
    pub fn bootstrap(builder: CoreConfigBuilder) -> Result<Self> {
        Ok(Self::new(builder.build()?))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    /// Sign out and drop every session-scoped state.
    ///
    /// Any held token is revoked, including one whose profile is still
    /// loading or failed to load.
    pub async fn shutdown(&self) {
        self.session.logout().await;
        info!("Core service shut down");
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish()
    }
}

/// Convenience bootstrapper for desktop hosts: reqwest transport and the
/// system browser for the login redirect.
///
/// ```no_run
/// # fn example() -> core_service::Result<()> {
/// let core = core_service::bootstrap_desktop(
///     core_service::CoreConfig::builder().api_prefix("https://catalog.example.com/api"),
/// )?;
/// let results = core.catalog().search_tracks("ambient");
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(builder: CoreConfigBuilder) -> Result<CoreService> {
    use std::sync::Arc;

    let builder = builder.navigator(Arc::new(bridge_desktop::SystemBrowserNavigator::new()));
    CoreService::bootstrap(builder)
}
