//! # Session Manager
//!
//! Owns the OAuth token lifecycle for one process: starting the login
//! redirect, exchanging the callback for tokens, loading the user profile,
//! refreshing tokens and logging out.
//!
//! ## Concurrency model
//!
//! - The [`TokenStore`] and the published [`SessionSnapshot`] are updated
//!   together inside a single `watch::Sender::send_if_modified` call, so
//!   observers never see a token without the matching snapshot.
//! - Work started against a token remembers the store generation. Results
//!   arriving after the generation moved on (logout, newer exchange, refresh)
//!   are discarded instead of applied.
//! - At most one profile request is live. Starting a new one drops the
//!   previous task's [`DropGuard`], which cancels it; so does dropping the
//!   last `SessionManager` handle.
//! - Token refreshes are serialised behind an async mutex; callers queued
//!   behind a refresh reuse its result.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::SessionManager;
//!
//! let session = SessionManager::new(&config, event_bus.clone());
//!
//! session.initiate_login().await;            // redirects via the Navigator
//! session.exchange_callback(&code, &state).await?;
//! let snapshot = session.wait_until_settled().await;
//! assert!(snapshot.is_authenticated());
//! ```

use crate::error::{AuthError, Result};
use crate::token_store::{TokenSnapshot, TokenStore};
use crate::types::{
    LoginUrlResponse, OAuthTokens, SessionPhase, SessionSnapshot, TokenResponse, UserProfile,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, Clock, HttpClient, HttpRequest, HttpResponse, Navigator};
use core_async::sync::{watch, CancellationToken, DropGuard, Mutex as AsyncMutex};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::strip_query;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, debug_span, error, info, instrument, warn, Instrument};

/// Longest response body echoed back in an exchange error.
const MAX_REASON_LEN: usize = 200;

/// Endpoint and timing settings for a [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub api_prefix: String,
    pub request_timeout: Duration,
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_buffer: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            api_prefix: config.api_prefix.clone(),
            request_timeout: config.request_timeout,
            refresh_buffer: config.token_refresh_buffer,
        }
    }
}

struct ProfileTask {
    id: u64,
    _guard: DropGuard,
}

struct Inner {
    http: Arc<dyn HttpClient>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: SessionSettings,
    tokens: TokenStore,
    state: watch::Sender<SessionSnapshot>,
    profile_task: Mutex<Option<ProfileTask>>,
    next_task_id: AtomicU64,
    refresh_lock: AsyncMutex<()>,
}

enum ProfileOutcome {
    Loaded(UserProfile),
    Rejected(u16),
    Failed { status: Option<u16>, message: String },
}

/// Cloneable handle to the session state machine.
///
/// All clones share one token store and one profile task.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Build a manager from the core configuration.
    pub fn new(config: &CoreConfig, events: EventBus) -> Self {
        Self::with_parts(
            Arc::clone(&config.http_client),
            Arc::clone(&config.navigator),
            Arc::clone(&config.clock),
            events,
            SessionSettings::from_config(config),
        )
    }

    pub fn with_parts(
        http: Arc<dyn HttpClient>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        settings: SessionSettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                http,
                navigator,
                clock,
                events,
                settings,
                tokens: TokenStore::new(),
                state,
                profile_task: Mutex::new(None),
                next_task_id: AtomicU64::new(1),
                refresh_lock: AsyncMutex::new(()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver that yields every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Token and profile both present.
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.borrow().user.clone()
    }

    /// The current access token, without any expiry check.
    pub fn access_token(&self) -> Option<String> {
        self.inner.tokens.current().map(|t| t.access_token)
    }

    pub fn auth_loading(&self) -> bool {
        self.inner.state.borrow().auth_loading
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase()
    }

    pub fn generation(&self) -> u64 {
        self.inner.tokens.generation()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Resolves with the first snapshot whose `auth_loading` is false.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|s| !s.auth_loading).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    // ------------------------------------------------------------------
    // Login
    // ------------------------------------------------------------------

    /// Ask the backend for the authorize URL and hand it to the navigator.
    ///
    /// Never fails: problems are logged and published as a recoverable
    /// `AuthEvent::AuthError`.
    #[instrument(skip(self))]
    pub async fn initiate_login(&self) {
        self.emit(AuthEvent::SigningIn);

        let url = match self.fetch_login_url().await {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Failed to obtain login URL");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: true,
                });
                return;
            }
        };

        if let Err(e) = self.inner.navigator.navigate(&url).await {
            error!(error = %e, "Navigator refused login redirect");
            self.emit(AuthEvent::AuthError {
                message: format!("Login redirect failed: {}", e),
                recoverable: true,
            });
        }
    }

    async fn fetch_login_url(&self) -> Result<String> {
        let url = self.endpoint("/auth/login");
        let response = self.execute(HttpRequest::get(&url)).await?;

        if !response.is_success() {
            return Err(AuthError::HttpStatus {
                status: response.status,
                url,
            });
        }

        let body: LoginUrlResponse = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        body.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("login response has no url".to_string()))
    }

    /// Exchange the OAuth callback parameters for a token set.
    ///
    /// On success the tokens are stored and a profile request starts in the
    /// background; await [`wait_until_settled`](Self::wait_until_settled) to
    /// observe its outcome.
    ///
    /// If the session changed while the request was in flight (a logout, or
    /// another exchange that stored its tokens first) the response is
    /// discarded and the call still returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// - `AuthError::AuthExchange` for a non-2xx response or a body missing
    ///   any of `access_token`, `refresh_token`, `expires_in`. The store is
    ///   left untouched.
    /// - `AuthError::Transport` when the request could not be made.
    #[instrument(skip(self, code, state))]
    pub async fn exchange_callback(&self, code: &str, state: &str) -> Result<()> {
        match self.exchange_inner(code, state).await {
            Ok(()) => Ok(()),
            Err(AuthError::Cancelled) => {
                debug!("Callback exchange superseded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Callback exchange failed");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    async fn exchange_inner(&self, code: &str, state: &str) -> Result<()> {
        let observed = self.inner.tokens.generation();

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", code)
            .append_pair("state", state)
            .finish();
        let url = format!("{}?{}", self.endpoint("/auth/callback"), query);

        let response = self.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(AuthError::AuthExchange {
                status: Some(response.status),
                reason: response_reason(&response, "callback rejected"),
            });
        }

        let now = self.inner.clock.now();
        let tokens = response
            .json::<TokenResponse>()
            .map_err(|e| e.to_string())
            .and_then(|body| body.into_exchange_tokens(now))
            .map_err(|reason| AuthError::AuthExchange {
                status: Some(response.status),
                reason,
            })?;

        let expires_at = tokens.expires_at.timestamp();
        let access_token = tokens.access_token.clone();

        let started = self.transition(|store, snapshot| {
            let generation = store.replace_if(observed, tokens.clone())?;
            *snapshot = SessionSnapshot {
                tokens: Some(tokens),
                user: None,
                auth_loading: true,
                generation,
            };
            Some((generation, self.replace_profile_task()))
        });

        let Some((generation, (task_id, cancel))) = started else {
            debug!(observed, "Session changed during exchange; discarding tokens");
            return Err(AuthError::Cancelled);
        };

        info!(generation, "Signed in");
        self.emit(AuthEvent::SignedIn { expires_at });
        self.spawn_profile_fetch(generation, task_id, cancel, access_token);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    /// Re-request the profile for the current token.
    ///
    /// Returns `false` when there is no token. Must be called from within a
    /// runtime.
    pub fn refresh_profile(&self) -> bool {
        let started = self.transition(|store, snapshot| {
            let TokenSnapshot {
                tokens: Some(tokens),
                generation,
            } = store.snapshot()
            else {
                return None;
            };
            snapshot.auth_loading = true;
            Some((generation, self.replace_profile_task(), tokens.access_token))
        });

        match started {
            Some((generation, (task_id, cancel), access_token)) => {
                self.spawn_profile_fetch(generation, task_id, cancel, access_token);
                true
            }
            None => false,
        }
    }

    fn replace_profile_task(&self) -> (u64, CancellationToken) {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        // Dropping the previous task's guard cancels its request.
        *self.lock_profile_task() = Some(ProfileTask {
            id,
            _guard: cancel.clone().drop_guard(),
        });
        (id, cancel)
    }

    fn release_profile_task(&self, id: u64) {
        let mut slot = self.lock_profile_task();
        if slot.as_ref().map(|task| task.id) == Some(id) {
            *slot = None;
        }
    }

    fn lock_profile_task(&self) -> MutexGuard<'_, Option<ProfileTask>> {
        self.inner
            .profile_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_profile_fetch(
        &self,
        generation: u64,
        task_id: u64,
        cancel: CancellationToken,
        access_token: String,
    ) {
        let request = HttpRequest::get(self.endpoint("/me"))
            .bearer_token(&access_token)
            .default_timeout(Some(self.inner.settings.request_timeout));
        let http = Arc::clone(&self.inner.http);
        let inner = Arc::downgrade(&self.inner);

        core_async::spawn(
            async move {
                let outcome = http.execute_cancellable(request, &cancel).await;
                match inner.upgrade() {
                    Some(inner) => {
                        SessionManager { inner }.finish_profile_fetch(
                            generation, task_id, &cancel, outcome,
                        );
                    }
                    None => debug!("Session dropped before profile arrived"),
                }
            }
            .instrument(debug_span!("profile_fetch", generation)),
        );
    }

    fn finish_profile_fetch(
        &self,
        generation: u64,
        task_id: u64,
        cancel: &CancellationToken,
        outcome: BridgeResult<HttpResponse>,
    ) {
        let outcome = match outcome {
            Err(BridgeError::Cancelled) => {
                debug!("Profile request cancelled");
                return;
            }
            Err(e) => ProfileOutcome::Failed {
                status: None,
                message: e.to_string(),
            },
            Ok(response) if response.is_auth_failure() => ProfileOutcome::Rejected(response.status),
            Ok(response) if !response.is_success() => ProfileOutcome::Failed {
                status: Some(response.status),
                message: format!("HTTP {}", response.status),
            },
            Ok(response) => match response.json::<UserProfile>() {
                Ok(user) => ProfileOutcome::Loaded(user),
                Err(e) => ProfileOutcome::Failed {
                    status: Some(response.status),
                    message: e.to_string(),
                },
            },
        };

        let is_current =
            |store: &TokenStore| !cancel.is_cancelled() && store.generation() == generation;

        match outcome {
            ProfileOutcome::Loaded(user) => {
                let user_id = user.id.to_string();
                let username = user.username.clone();
                let applied = self.transition(|store, snapshot| {
                    is_current(store).then(|| {
                        snapshot.user = Some(user);
                        snapshot.auth_loading = false;
                    })
                });

                if applied.is_some() {
                    self.release_profile_task(task_id);
                    info!(user_id = %user_id, "Profile loaded");
                    self.emit(AuthEvent::ProfileLoaded { user_id, username });
                } else {
                    debug!("Discarding profile for superseded session");
                }
            }
            ProfileOutcome::Rejected(status) => {
                let cleared = self.transition(|store, snapshot| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let next = store.clear_if(generation)?;
                    self.reset_snapshot(snapshot, next);
                    Some(next)
                });

                if cleared.is_some() {
                    let reason = format!("profile request returned HTTP {}", status);
                    warn!(status, "Token rejected while loading profile; session cleared");
                    self.emit(AuthEvent::SessionInvalidated { reason });
                }
            }
            ProfileOutcome::Failed { status, message } => {
                // The token is kept; only the profile is dropped.
                let applied = self.transition(|store, snapshot| {
                    is_current(store).then(|| {
                        snapshot.user = None;
                        snapshot.auth_loading = false;
                    })
                });

                if applied.is_some() {
                    self.release_profile_task(task_id);
                    warn!(status = ?status, error = %message, "Profile unavailable");
                    self.emit(AuthEvent::ProfileUnavailable { status, message });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one request: whoever waited on the refresh
    /// lock while another caller replaced the tokens gets those tokens back.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotAuthenticated` when there is no session, or the
    ///   backend rejected the refresh token (the session is then cleared)
    /// - `AuthError::TokenRefreshFailed` for other failures; tokens are kept
    /// - `AuthError::Cancelled` if the session changed during the request
    #[instrument(skip(self))]
    pub async fn refresh_tokens(&self) -> Result<OAuthTokens> {
        let observed = self.inner.tokens.generation();
        let _refresh = self.inner.refresh_lock.lock().await;

        let TokenSnapshot { tokens, generation } = self.inner.tokens.snapshot();
        let Some(current) = tokens else {
            return Err(AuthError::NotAuthenticated);
        };

        if generation != observed {
            debug!(observed, generation, "Tokens replaced while waiting; reusing them");
            return Ok(current);
        }

        let request = HttpRequest::post(self.endpoint("/auth/refresh"))
            .json(&serde_json::json!({ "refresh_token": current.refresh_token }))
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        let response = match self.execute(request).await {
            Ok(response) => response,
            Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => return Err(self.refresh_failed(e.to_string())),
        };

        if response.is_auth_failure() {
            let cleared = self.transition(|store, snapshot| {
                let next = store.clear_if(generation)?;
                self.reset_snapshot(snapshot, next);
                Some(next)
            });
            if cleared.is_some() {
                warn!(status = response.status, "Refresh token rejected; session cleared");
                self.emit(AuthEvent::SessionInvalidated {
                    reason: format!("refresh returned HTTP {}", response.status),
                });
            }
            return Err(AuthError::NotAuthenticated);
        }

        if !response.is_success() {
            return Err(self.refresh_failed(format!("HTTP {}", response.status)));
        }

        let now = self.inner.clock.now();
        let refreshed = match response
            .json::<TokenResponse>()
            .map_err(|e| e.to_string())
            .and_then(|body| body.into_refreshed_tokens(&current, now))
        {
            Ok(tokens) => tokens,
            Err(reason) => return Err(self.refresh_failed(reason)),
        };

        let applied = self.transition(|store, snapshot| {
            let next = store.replace_if(generation, refreshed.clone())?;
            // The profile is kept while it is re-fetched for the new token.
            snapshot.tokens = Some(refreshed.clone());
            snapshot.auth_loading = true;
            snapshot.generation = next;
            Some((next, self.replace_profile_task()))
        });

        let Some((next, (task_id, cancel))) = applied else {
            debug!("Session changed during refresh; discarding tokens");
            return Err(AuthError::Cancelled);
        };

        info!(generation = next, "Access token refreshed");
        self.emit(AuthEvent::TokenRefreshed {
            expires_at: refreshed.expires_at.timestamp(),
        });
        self.spawn_profile_fetch(next, task_id, cancel, refreshed.access_token.clone());
        Ok(refreshed)
    }

    fn refresh_failed(&self, reason: String) -> AuthError {
        warn!(error = %reason, "Token refresh failed");
        self.emit(AuthEvent::AuthError {
            message: format!("Token refresh failed: {}", reason),
            recoverable: true,
        });
        AuthError::TokenRefreshFailed(reason)
    }

    /// Access token that is valid for at least the refresh buffer, refreshing
    /// first if needed.
    ///
    /// If a refresh fails for a transient reason but the current token has not
    /// actually expired yet, the current token is returned.
    pub async fn valid_access_token(&self) -> Result<String> {
        let tokens = self
            .inner
            .tokens
            .current()
            .ok_or(AuthError::NotAuthenticated)?;

        let now = self.inner.clock.now();
        let buffer = chrono::Duration::from_std(self.inner.settings.refresh_buffer)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        if !tokens.is_expired_with_buffer(now, buffer) {
            return Ok(tokens.access_token);
        }

        debug!("Access token inside refresh window");
        match self.refresh_tokens().await {
            Ok(refreshed) => Ok(refreshed.access_token),
            Err(AuthError::TokenRefreshFailed(_))
                if !tokens.is_expired_with_buffer(now, chrono::Duration::zero()) =>
            {
                warn!("Using current access token until it expires");
                Ok(tokens.access_token)
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Logout / invalidation
    // ------------------------------------------------------------------

    /// Best-effort remote revoke, then unconditionally clear the session.
    ///
    /// Also cancels any exchange or profile request in flight.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Some(tokens) = self.inner.tokens.current() {
            self.revoke(&tokens).await;
        }

        let generation = self.clear_all();
        info!(generation, "Signed out");
        self.emit(AuthEvent::SignedOut);
    }

    async fn revoke(&self, tokens: &OAuthTokens) {
        let request = match HttpRequest::post(self.endpoint("/auth/logout"))
            .json(&serde_json::json!({ "access_token": tokens.access_token }))
        {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not encode logout request");
                return;
            }
        };

        match self.execute(request).await {
            Ok(response) if response.is_success() => debug!("Remote session revoked"),
            Ok(response) => warn!(status = response.status, "Logout endpoint refused revoke"),
            Err(e) => warn!(error = %e, "Logout request failed"),
        }
    }

    /// Clear the session after an authenticated endpoint answered 401/403.
    ///
    /// No revoke call is made. A no-op when already anonymous.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let cleared = self.transition(|store, snapshot| {
            if !store.is_present() {
                return None;
            }
            let next = store.clear();
            self.reset_snapshot(snapshot, next);
            Some(next)
        });

        if let Some(generation) = cleared {
            warn!(generation, reason = %reason, "Session invalidated");
            self.emit(AuthEvent::SessionInvalidated { reason });
        }
    }

    /// Like [`invalidate`](Self::invalidate), but only if `rejected` is still
    /// the current access token. Returns whether the session was cleared.
    ///
    /// A 401 for a token that has since been refreshed leaves the new session
    /// alone.
    pub fn invalidate_token(&self, rejected: &str, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let cleared = self.transition(|store, snapshot| {
            let TokenSnapshot {
                tokens: Some(tokens),
                generation,
            } = store.snapshot()
            else {
                return None;
            };
            if tokens.access_token != rejected {
                return None;
            }
            let next = store.clear_if(generation)?;
            self.reset_snapshot(snapshot, next);
            Some(next)
        });

        match cleared {
            Some(generation) => {
                warn!(generation, reason = %reason, "Session invalidated");
                self.emit(AuthEvent::SessionInvalidated { reason });
                true
            }
            None => {
                debug!("Rejected token is no longer current; session kept");
                false
            }
        }
    }

    fn clear_all(&self) -> u64 {
        self.transition(|store, snapshot| {
            let next = store.clear();
            self.reset_snapshot(snapshot, next);
            Some(next)
        })
        .unwrap_or_else(|| self.inner.tokens.generation())
    }

    fn reset_snapshot(&self, snapshot: &mut SessionSnapshot, generation: u64) {
        *self.lock_profile_task() = None;
        *snapshot = SessionSnapshot {
            generation,
            ..SessionSnapshot::default()
        };
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Apply `f` to the token store and the published snapshot as one step.
    /// Observers are notified only when `f` returns `Some`.
    fn transition<R>(
        &self,
        f: impl FnOnce(&TokenStore, &mut SessionSnapshot) -> Option<R>,
    ) -> Option<R> {
        let mut result = None;
        self.inner.state.send_if_modified(|snapshot| {
            result = f(&self.inner.tokens, snapshot);
            result.is_some()
        });
        result
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.inner.settings.api_prefix, path)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.default_timeout(Some(self.inner.settings.request_timeout));
        debug!(method = request.method.as_str(), url = %strip_query(&request.url), "Session request");
        Ok(self.inner.http.execute(request).await?)
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.inner.events.emit(CoreEvent::Auth(event));
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.state.borrow();
        f.debug_struct("SessionManager")
            .field("phase", &snapshot.phase())
            .field("generation", &snapshot.generation)
            .field("auth_loading", &snapshot.auth_loading)
            .finish()
    }
}

fn response_reason(response: &HttpResponse, fallback: &str) -> String {
    match response.text() {
        Ok(text) if !text.trim().is_empty() => {
            let text = text.trim();
            match text.char_indices().nth(MAX_REASON_LEN) {
                Some((cut, _)) => format!("{}...", &text[..cut]),
                None => text.to_string(),
            }
        }
        _ => fallback.to_string(),
    }
}
