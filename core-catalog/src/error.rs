use bridge_traits::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Failure of a catalog request.
///
/// `Clone` because paginators and mutation state keep the last error around
/// for observers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// Superseded by a newer request. Never stored in state.
    #[error("Request cancelled")]
    Cancelled,
}

impl CatalogError {
    /// 401 or 403 from the API.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, CatalogError::HttpStatus { status: 401 | 403, .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Transport(_) => true,
            CatalogError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<BridgeError> for CatalogError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled => CatalogError::Cancelled,
            other => CatalogError::Transport(other.to_string()),
        }
    }
}

impl From<AuthError> for CatalogError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotAuthenticated => CatalogError::NotAuthenticated,
            AuthError::Cancelled => CatalogError::Cancelled,
            AuthError::HttpStatus { status, url } => CatalogError::HttpStatus { status, url },
            other => CatalogError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
