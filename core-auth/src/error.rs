use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The callback exchange was rejected or returned an unusable token set.
    #[error("Authorization exchange failed{}: {reason}", status_suffix(.status))]
    AuthExchange { status: Option<u16>, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The operation was superseded (logout, newer exchange) or cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AuthError {
    /// Transport hiccups and 5xx responses can succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Transport(_) | AuthError::TokenRefreshFailed(_) => true,
            AuthError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<BridgeError> for AuthError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled => AuthError::Cancelled,
            other => AuthError::Transport(other.to_string()),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, AuthError>;
