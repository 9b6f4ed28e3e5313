//! # Event Bus System
//!
//! Typed lifecycle events for the catalog core, fanned out over
//! `tokio::sync::broadcast`.
//!
//! The session manager and every paginator publish here. UIs usually observe
//! state through the `watch` receivers the components hand out; the bus is for
//! cross-cutting listeners (analytics, toasts, debug panels) that want to know
//! *what happened* rather than *what the state is now*.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Auth(AuthEvent::SigningIn)).ok();
//!
//! assert_eq!(rx.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::SigningIn));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `RecvError::Lagged(n)` means a slow subscriber missed `n` events and may keep
//! reading. `RecvError::Closed` means every sender is gone. `emit` fails only
//! when nobody is subscribed, which publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session and token lifecycle
    Auth(AuthEvent),
    /// Collection paging and catalog mutations
    Catalog(CatalogEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Catalog(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { recoverable, .. }) => {
                if *recoverable {
                    EventSeverity::Warning
                } else {
                    EventSeverity::Error
                }
            }
            CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::ProfileUnavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Catalog(CatalogEvent::PageFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Catalog(CatalogEvent::MutationFailed { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut)
            | CoreEvent::Auth(AuthEvent::ProfileLoaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Session lifecycle events. Never carry token material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Login redirect requested.
    SigningIn,
    /// Callback exchange stored a fresh token pair.
    SignedIn {
        /// Unix epoch seconds at which the access token expires.
        expires_at: i64,
    },
    /// Profile for the current token arrived.
    ProfileLoaded { user_id: String, username: String },
    /// Profile fetch failed without invalidating the token.
    ProfileUnavailable {
        status: Option<u16>,
        message: String,
    },
    TokenRefreshed { expires_at: i64 },
    /// User-initiated logout finished.
    SignedOut,
    /// The remote API rejected the session and it was cleared.
    SessionInvalidated { reason: String },
    AuthError {
        message: String,
        /// Whether a retry could succeed.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Redirecting to login",
            AuthEvent::SignedIn { .. } => "Signed in",
            AuthEvent::ProfileLoaded { .. } => "Profile loaded",
            AuthEvent::ProfileUnavailable { .. } => "Profile unavailable",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::SignedOut => "Signed out",
            AuthEvent::SessionInvalidated { .. } => "Session invalidated",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Catalog Events
// ============================================================================

/// Paging and mutation events. `collection` is the paginator's label, e.g.
/// `"search/tracks"` or `"users/42/followers"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    /// State was cleared for a new query identity or an explicit reset.
    QueryReset { collection: String, generation: u64 },
    PageLoaded {
        collection: String,
        generation: u64,
        /// Items appended by this page after de-duplication.
        added: usize,
        /// Accumulated item count after the page was applied.
        total: usize,
        exhausted: bool,
    },
    PageFailed {
        collection: String,
        generation: u64,
        message: String,
    },
    /// An imperative mutation (like/unlike) failed.
    MutationFailed { operation: String, message: String },
}

impl CatalogEvent {
    fn description(&self) -> &str {
        match self {
            CatalogEvent::QueryReset { .. } => "Collection reset",
            CatalogEvent::PageLoaded { .. } => "Page loaded",
            CatalogEvent::PageFailed { .. } => "Page load failed",
            CatalogEvent::MutationFailed { .. } => "Mutation failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast hub shared by every component of one core instance.
///
/// Cloning is cheap; clones publish to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus. Subscribers lagging more than `capacity` events behind
    /// receive `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        trace!(severity = ?event.severity(), "{}", event.description());
        self.sender.send(event)
    }

    /// New receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn page_loaded(total: usize) -> CoreEvent {
        CoreEvent::Catalog(CatalogEvent::PageLoaded {
            collection: "search/tracks".to_string(),
            generation: 1,
            added: 2,
            total,
            exhausted: false,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Auth(AuthEvent::SignedIn { expires_at: 3600 });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for total in 0..5 {
            bus.emit(page_loaded(total)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let fatal = CoreEvent::Auth(AuthEvent::AuthError {
            message: "exchange rejected".to_string(),
            recoverable: false,
        });
        assert_eq!(fatal.severity(), EventSeverity::Error);

        let transient = CoreEvent::Auth(AuthEvent::AuthError {
            message: "login url unavailable".to_string(),
            recoverable: true,
        });
        assert_eq!(transient.severity(), EventSeverity::Warning);

        assert_eq!(
            CoreEvent::Auth(AuthEvent::SignedOut).severity(),
            EventSeverity::Info
        );
        assert_eq!(page_loaded(4).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Auth(AuthEvent::SessionInvalidated {
            reason: "401 from /me".to_string(),
        });
        assert_eq!(event.description(), "Session invalidated");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Catalog(CatalogEvent::QueryReset {
            collection: "users/1/followers".to_string(),
            generation: 3,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Catalog");
        assert_eq!(json["payload"]["event"], "QueryReset");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
