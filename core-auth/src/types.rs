use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds assumed when a refresh response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// OAuth 2.0 token set.
///
/// All three parts are present or the whole value is absent
/// (`Option<OAuthTokens>`); a partial token cannot be represented.
///
/// # Security
///
/// Tokens live in process memory only and are never logged. The `Debug`
/// implementation redacts both secrets.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = OAuthTokens::new("T".to_string(), "R".to_string(), 3600, now).unwrap();
///
/// assert!(!tokens.is_expired_with_buffer(now, Duration::seconds(300)));
/// assert!(tokens.is_expired_with_buffer(now + Duration::minutes(56), Duration::seconds(300)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Token set expiring `expires_in` seconds after `now`.
    ///
    /// `None` when the expiry is outside the representable time range.
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))?;
        Some(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// True when the access token expires within `buffer` of `now`.
    pub fn is_expired_with_buffer(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at.checked_sub_signed(buffer) {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// `None` once the token has expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        (now < self.expires_at).then(|| self.expires_at - now)
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of `/auth/callback` and `/auth/refresh`.
///
/// Every field is optional on the wire so a missing one can be reported by
/// name instead of as a generic decode failure.
#[derive(Default, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Strict conversion used for the callback exchange: all fields required.
    pub(crate) fn into_exchange_tokens(self, now: DateTime<Utc>) -> Result<OAuthTokens, String> {
        let missing: Vec<&str> = [
            ("access_token", self.access_token.as_deref().map_or(true, str::is_empty)),
            ("refresh_token", self.refresh_token.as_deref().map_or(true, str::is_empty)),
            ("expires_in", self.expires_in.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(format!("token response missing {}", missing.join(", ")));
        }

        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        OAuthTokens::new(
            self.access_token.unwrap_or_default(),
            self.refresh_token.unwrap_or_default(),
            expires_in,
            now,
        )
        .ok_or_else(|| format!("expires_in {} out of range", expires_in))
    }

    /// Lenient conversion used for refresh: the previous refresh token is kept
    /// when the server does not rotate it.
    pub(crate) fn into_refreshed_tokens(
        self,
        previous: &OAuthTokens,
        now: DateTime<Utc>,
    ) -> Result<OAuthTokens, String> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "refresh response missing access_token".to_string())?;

        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        OAuthTokens::new(
            access_token,
            self.refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| previous.refresh_token.clone()),
            expires_in,
            now,
        )
        .ok_or_else(|| format!("expires_in {} out of range", expires_in))
    }
}

#[derive(Deserialize)]
pub(crate) struct LoginUrlResponse {
    #[serde(default)]
    pub url: Option<String>,
}

/// Profile of the signed-in user as returned by `/me`.
///
/// Fields the core does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Where the session is in its lifecycle.
///
/// ```text
/// Anonymous --exchange ok--> Authenticating --profile ok--> Authenticated
///                                  |
///                                  +--profile failed--> AuthenticatedNoProfile
/// any --logout / rejected token--> Anonymous
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionPhase {
    #[default]
    Anonymous,
    /// Token held, profile request in flight.
    Authenticating,
    Authenticated,
    /// Token held but the profile could not be loaded.
    AuthenticatedNoProfile,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Anonymous => write!(f, "Anonymous"),
            SessionPhase::Authenticating => write!(f, "Authenticating..."),
            SessionPhase::Authenticated => write!(f, "Authenticated"),
            SessionPhase::AuthenticatedNoProfile => write!(f, "Authenticated (no profile)"),
        }
    }
}

/// Point-in-time view of the session, published to observers on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub tokens: Option<OAuthTokens>,
    pub user: Option<UserProfile>,
    /// True while a profile request for the current token is in flight.
    pub auth_loading: bool,
    /// Token store generation this snapshot was taken at.
    pub generation: u64,
}

impl SessionSnapshot {
    /// Token and profile both present.
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some() && self.user.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.tokens, &self.user) {
            (None, _) => SessionPhase::Anonymous,
            (Some(_), Some(_)) => SessionPhase::Authenticated,
            (Some(_), None) if self.auth_loading => SessionPhase::Authenticating,
            (Some(_), None) => SessionPhase::AuthenticatedNoProfile,
        }
    }
}
