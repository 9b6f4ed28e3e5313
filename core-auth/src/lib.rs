//! # Session Module
//!
//! OAuth session lifecycle for the catalog client.
//!
//! ## Overview
//!
//! The backend owns the OAuth provider credentials. This crate drives the
//! client half of the flow against it:
//!
//! - `GET /auth/login` for the authorize URL, handed to the host `Navigator`
//! - `GET /auth/callback?code&state` for the token set
//! - `GET /me` for the profile of the signed-in user
//! - `POST /auth/refresh` and `POST /auth/logout`
//!
//! Tokens are kept in process memory only ([`TokenStore`]). Every change is
//! published as a [`SessionSnapshot`] through a `watch` channel and as an
//! `AuthEvent` on the core event bus.

pub mod error;
pub mod session;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use session::{SessionManager, SessionSettings};
pub use token_store::{TokenSnapshot, TokenStore};
pub use types::{OAuthTokens, SessionPhase, SessionSnapshot, UserProfile};
