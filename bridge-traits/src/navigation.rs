//! Host navigation
//!
//! Starting a login sends the user agent to the provider's authorize page.
//! In a browser that is a location change; on desktop it is usually the system
//! browser. The core only needs to hand over the URL.

use async_trait::async_trait;

use crate::error::Result;

/// Sends the user agent to an external URL.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `url`. The call returns once the host has accepted the
    /// request, not when the page finishes loading.
    async fn navigate(&self, url: &str) -> Result<()>;
}

/// Navigator that only records the last requested URL.
///
/// Useful for headless hosts that print the authorize link instead of
/// opening it.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    last: std::sync::Mutex<Option<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_url(&self) -> Option<String> {
        self.last.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, url: &str) -> Result<()> {
        if let Ok(mut slot) = self.last.lock() {
            *slot = Some(url.to_string());
        }
        Ok(())
    }
}
