//! In-memory Token Store
//!
//! Holds the single current token set for this process together with a
//! generation counter. Every replacement or clear bumps the generation, which
//! lets asynchronous work started against one token detect that the session
//! moved on before it writes anything back.
//!
//! Tokens are never persisted. Locks are held only for the duration of a
//! field copy, never across an `.await`.
//!
//! ## Example
//!
//! ```
//! use core_auth::{OAuthTokens, TokenStore};
//! use chrono::Utc;
//!
//! let store = TokenStore::new();
//! let start = store.generation();
//!
//! let tokens = OAuthTokens::new("T".into(), "R".into(), 3600, Utc::now()).unwrap();
//! assert!(store.replace_if(start, tokens.clone()).is_some());
//!
//! // A result computed against the old generation is rejected.
//! assert!(store.replace_if(start, tokens).is_none());
//! ```

use crate::types::OAuthTokens;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

#[derive(Debug, Default)]
struct TokenSlot {
    tokens: Option<OAuthTokens>,
    generation: u64,
}

/// Consistent read of the store.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub tokens: Option<OAuthTokens>,
    pub generation: u64,
}

/// Process-memory token storage with generation tracking.
#[derive(Debug, Default)]
pub struct TokenStore {
    slot: RwLock<TokenSlot>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<OAuthTokens> {
        self.read(|slot| slot.tokens.clone())
    }

    pub fn generation(&self) -> u64 {
        self.read(|slot| slot.generation)
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.read(|slot| TokenSnapshot {
            tokens: slot.tokens.clone(),
            generation: slot.generation,
        })
    }

    pub fn is_present(&self) -> bool {
        self.read(|slot| slot.tokens.is_some())
    }

    /// Unconditionally store `tokens`. Returns the new generation.
    pub fn replace(&self, tokens: OAuthTokens) -> u64 {
        self.write(|slot| {
            slot.tokens = Some(tokens);
            slot.generation += 1;
            slot.generation
        })
    }

    /// Store `tokens` only if the generation is still `expected`.
    ///
    /// Returns the new generation, or `None` if the store changed since the
    /// caller observed it.
    pub fn replace_if(&self, expected: u64, tokens: OAuthTokens) -> Option<u64> {
        self.write(|slot| {
            if slot.generation != expected {
                trace!(
                    expected,
                    current = slot.generation,
                    "Discarding stale token write"
                );
                return None;
            }
            slot.tokens = Some(tokens);
            slot.generation += 1;
            Some(slot.generation)
        })
    }

    /// Drop the tokens. Returns the new generation.
    pub fn clear(&self) -> u64 {
        self.write(|slot| {
            slot.tokens = None;
            slot.generation += 1;
            slot.generation
        })
    }

    /// Drop the tokens only if the generation is still `expected`.
    pub fn clear_if(&self, expected: u64) -> Option<u64> {
        self.write(|slot| {
            if slot.generation != expected {
                return None;
            }
            slot.tokens = None;
            slot.generation += 1;
            Some(slot.generation)
        })
    }

    fn read<R>(&self, f: impl FnOnce(&TokenSlot) -> R) -> R {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&slot)
    }

    fn write<R>(&self, f: impl FnOnce(&mut TokenSlot) -> R) -> R {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }
}
