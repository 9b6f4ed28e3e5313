//! # Desktop Bridge Implementations
//!
//! Default bridge adapters for desktop hosts (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `Navigator` that hands the authorize URL to the system browser
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SystemBrowserNavigator};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()))
//!     .navigator(Arc::new(SystemBrowserNavigator::new()))
//!     .build()?;
//! ```

mod http;
mod navigation;

pub use http::ReqwestHttpClient;
pub use navigation::SystemBrowserNavigator;
