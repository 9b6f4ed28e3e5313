//! # Catalog Client
//!
//! Typed access to the catalog routes exposed by the backend.
//!
//! ## Overview
//!
//! - Single resources (`track`, `user`, `playlist`, `resolve`, `me`) are
//!   plain async calls.
//! - Small one-shot collections (`track_comments`, `track_likes`,
//!   `related_tracks`) return the first page only.
//! - Paged collections return a [`Paginator`] bound to a [`CollectionQuery`].
//! - `like_track` / `unlike_track` publish their progress through a
//!   [`MutationState`] watch channel and also return the error to the caller.
//!
//! Routes under `/me` and the like endpoints need a [`SessionManager`]; see
//! [`CatalogClient::with_session`].
//!
//! ## Usage
//!
//! ```ignore
//! let client = CatalogClient::new(&config).with_session(session.clone());
//!
//! let results = client.search_tracks("strobe");
//! results.load_more().await;
//! for track in results.items() {
//!     println!("{}", track.title);
//! }
//! ```

use crate::error::{CatalogError, Result};
use crate::fetchers::{
    decode, Access, Api, CollectionFetcher, CollectionQuery, PlaylistQuery, TrackQuery, UserQuery,
};
use crate::models::{Comment, Playlist, PlaylistId, Resource, Track, TrackId, User, UserId};
use crate::pagination::CollectionResponse;
use crate::paginator::{PageFetcher, Paginator};
use bridge_traits::{HttpMethod, HttpRequest};
use core_async::sync::{watch, CancellationToken};
use core_auth::SessionManager;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Progress of like/unlike calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    pending: usize,
    /// Error of the most recent failed mutation, cleared when a new one starts.
    pub error: Option<CatalogError>,
}

impl MutationState {
    /// True while any mutation is in flight.
    pub fn loading(&self) -> bool {
        self.pending > 0
    }
}

/// Cloneable client for the catalog API.
#[derive(Clone)]
pub struct CatalogClient {
    api: Api,
    events: Option<EventBus>,
    mutations: Arc<watch::Sender<MutationState>>,
}

impl CatalogClient {
    /// Anonymous client. Only public routes will succeed.
    pub fn new(config: &CoreConfig) -> Self {
        let (mutations, _) = watch::channel(MutationState::default());
        Self {
            api: Api::new(config),
            events: None,
            mutations: Arc::new(mutations),
        }
    }

    /// Use `session` for bearer tokens on authenticated routes.
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.api = self.api.with_session(session);
        self
    }

    /// Report paging and mutation failures on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session(&self) -> Option<&SessionManager> {
        self.api.session()
    }

    // ------------------------------------------------------------------
    // Single resources
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn track(&self, id: TrackId) -> Result<Track> {
        self.get(&format!("/tracks/{}", id), Access::Public).await
    }

    #[instrument(skip(self))]
    pub async fn user(&self, id: UserId) -> Result<User> {
        self.get(&format!("/users/{}", id), Access::Public).await
    }

    #[instrument(skip(self))]
    pub async fn playlist(&self, id: PlaylistId) -> Result<Playlist> {
        self.get(&format!("/playlists/{}", id), Access::Public).await
    }

    /// Resolve a public web URL (e.g. a track permalink) to its resource.
    #[instrument(skip(self))]
    pub async fn resolve(&self, url: &str) -> Result<Resource> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("url", url)
            .finish();
        let value: serde_json::Value = self
            .get(&format!("/resolve?{}", query), Access::Public)
            .await?;
        Resource::from_value(value).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    /// Profile of the signed-in user.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User> {
        self.get("/me", Access::Authenticated).await
    }

    // ------------------------------------------------------------------
    // One-shot collections
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn track_comments(&self, id: TrackId) -> Result<Vec<Comment>> {
        self.get_collection(&format!("/tracks/{}/comments", id)).await
    }

    /// Users who liked the track.
    #[instrument(skip(self))]
    pub async fn track_likes(&self, id: TrackId) -> Result<Vec<User>> {
        self.get_collection(&format!("/tracks/{}/likes", id)).await
    }

    #[instrument(skip(self))]
    pub async fn related_tracks(&self, id: TrackId) -> Result<Vec<Track>> {
        self.get_collection(&format!("/tracks/{}/related", id)).await
    }

    // ------------------------------------------------------------------
    // Paged collections
    // ------------------------------------------------------------------

    /// Paginator for any collection query.
    pub fn paginate<Q: CollectionQuery>(&self, query: Q) -> Paginator<Q::Item, Q> {
        let fetcher: Arc<dyn PageFetcher<Q::Item, Q>> =
            Arc::new(CollectionFetcher::<Q>::new(self.api.clone()));
        match &self.events {
            Some(events) => {
                let label = query.label();
                Paginator::with_events(fetcher, query, events.clone(), label)
            }
            None => Paginator::from_fetcher(fetcher, query),
        }
    }

    pub fn search_tracks(&self, text: impl Into<String>) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::Search(text.into()))
    }

    pub fn playlist_tracks(&self, id: PlaylistId) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::InPlaylist(id))
    }

    pub fn user_tracks(&self, id: UserId) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::ByUser(id))
    }

    pub fn user_liked_tracks(&self, id: UserId) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::LikedBy(id))
    }

    pub fn my_tracks(&self) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::Mine)
    }

    pub fn my_liked_tracks(&self) -> Paginator<Track, TrackQuery> {
        self.paginate(TrackQuery::MyLikes)
    }

    pub fn search_users(&self, text: impl Into<String>) -> Paginator<User, UserQuery> {
        self.paginate(UserQuery::Search(text.into()))
    }

    pub fn user_followers(&self, id: UserId) -> Paginator<User, UserQuery> {
        self.paginate(UserQuery::FollowersOf(id))
    }

    pub fn user_followings(&self, id: UserId) -> Paginator<User, UserQuery> {
        self.paginate(UserQuery::FollowingsOf(id))
    }

    pub fn my_followers(&self) -> Paginator<User, UserQuery> {
        self.paginate(UserQuery::MyFollowers)
    }

    pub fn my_followings(&self) -> Paginator<User, UserQuery> {
        self.paginate(UserQuery::MyFollowings)
    }

    pub fn search_playlists(&self, text: impl Into<String>) -> Paginator<Playlist, PlaylistQuery> {
        self.paginate(PlaylistQuery::Search(text.into()))
    }

    pub fn user_playlists(&self, id: UserId) -> Paginator<Playlist, PlaylistQuery> {
        self.paginate(PlaylistQuery::ByUser(id))
    }

    pub fn my_playlists(&self) -> Paginator<Playlist, PlaylistQuery> {
        self.paginate(PlaylistQuery::Mine)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Like a track as the signed-in user.
    ///
    /// # Errors
    ///
    /// `CatalogError::NotAuthenticated` without a session token; this check
    /// happens before any state change. Request failures are recorded in
    /// [`MutationState::error`] and returned.
    #[instrument(skip(self))]
    pub async fn like_track(&self, id: TrackId) -> Result<()> {
        self.mutate("like_track", HttpMethod::Post, id).await
    }

    #[instrument(skip(self))]
    pub async fn unlike_track(&self, id: TrackId) -> Result<()> {
        self.mutate("unlike_track", HttpMethod::Delete, id).await
    }

    pub fn mutation_state(&self) -> MutationState {
        self.mutations.borrow().clone()
    }

    pub fn subscribe_mutations(&self) -> watch::Receiver<MutationState> {
        self.mutations.subscribe()
    }

    async fn mutate(&self, operation: &str, method: HttpMethod, id: TrackId) -> Result<()> {
        let signed_in = self
            .api
            .session()
            .is_some_and(|session| session.access_token().is_some());
        if !signed_in {
            return Err(CatalogError::NotAuthenticated);
        }

        self.mutations.send_modify(|state| {
            state.pending += 1;
            state.error = None;
        });

        let request = HttpRequest::new(method, self.api.endpoint(&format!("/tracks/{}/like", id)));
        let result = self
            .api
            .send(request, Access::Authenticated, &CancellationToken::new())
            .await
            .map(|_| ());

        self.mutations.send_modify(|state| {
            state.pending = state.pending.saturating_sub(1);
            if let Err(error) = &result {
                state.error = Some(error.clone());
            }
        });

        match &result {
            Ok(()) => info!(track_id = %id, operation, "Mutation applied"),
            Err(error) => {
                warn!(track_id = %id, operation, error = %error, "Mutation failed");
                if let Some(events) = &self.events {
                    let _ = events.emit(CoreEvent::Catalog(CatalogEvent::MutationFailed {
                        operation: operation.to_string(),
                        message: error.to_string(),
                    }));
                }
            }
        }

        result
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn get<R: serde::de::DeserializeOwned>(&self, route: &str, access: Access) -> Result<R> {
        self.api
            .get_json(route, access, &CancellationToken::new())
            .await
    }

    async fn get_collection<T: serde::de::DeserializeOwned>(&self, route: &str) -> Result<Vec<T>> {
        let response = self
            .api
            .send(
                HttpRequest::get(self.api.endpoint(route)),
                Access::Public,
                &CancellationToken::new(),
            )
            .await?;
        let body: CollectionResponse<T> = decode(&response)?;
        Ok(body.into_items())
    }
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("authenticated", &self.api.session().is_some())
            .field("mutations", &*self.mutations.borrow())
            .finish()
    }
}
