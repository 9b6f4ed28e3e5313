//! # Host Bridge Traits
//!
//! Capabilities the catalog core needs from its host but does not implement
//! itself.
//!
//! - [`HttpClient`](http::HttpClient): request/response transport, with a
//!   cancellation-aware entry point used by every in-flight core request.
//! - [`Navigator`](navigation::Navigator): the redirect side effect of
//!   starting a login.
//! - [`Clock`](time::Clock): time source for token expiry.
//! - [`LoggerSink`](time::LoggerSink): forwards structured logs to the host.
//!
//! Desktop adapters live in `bridge-desktop`. Hosts embedding the core
//! elsewhere inject their own.
//!
//! All traits are `Send + Sync`; the core shares them across tokio tasks
//! behind `Arc<dyn Trait>`.

pub mod error;
pub mod http;
pub mod navigation;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use navigation::{Navigator, RecordingNavigator};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
