//! Collection queries and the HTTP-backed page fetcher
//!
//! Each query enum names one family of collection routes. The first page is
//! requested from the query's own route; every following page goes through
//! `{api_prefix}/next?url=<next_href>` so the backend can attach its
//! credentials to the upstream cursor URL.

use crate::error::{CatalogError, Result};
use crate::models::{Identify, Playlist, PlaylistId, Track, User, UserId};
use crate::pagination::{CollectionResponse, Cursor, Page};
use crate::paginator::PageFetcher;
use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
use core_async::sync::CancellationToken;
use core_auth::SessionManager;
use core_runtime::config::CoreConfig;
use core_runtime::logging::strip_query;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether a route needs the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// A collection the catalog API can page through.
pub trait CollectionQuery: Clone + PartialEq + Send + Sync + 'static {
    type Item: Identify + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Route of the first page relative to the API prefix, or `None` when the
    /// query cannot match anything (a blank search).
    fn route(&self) -> Option<String>;

    fn access(&self) -> Access;

    /// Short name used in logs and events.
    fn label(&self) -> String;
}

fn search_route(kind: &str, text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("q", text)
        .finish();
    Some(format!("/search/{}?{}", kind, query))
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackQuery {
    Search(String),
    InPlaylist(PlaylistId),
    ByUser(UserId),
    LikedBy(UserId),
    /// Tracks uploaded by the signed-in user
    Mine,
    /// Tracks liked by the signed-in user
    MyLikes,
}

impl CollectionQuery for TrackQuery {
    type Item = Track;

    fn route(&self) -> Option<String> {
        match self {
            TrackQuery::Search(text) => search_route("tracks", text),
            TrackQuery::InPlaylist(id) => Some(format!("/playlists/{}/tracks", id)),
            TrackQuery::ByUser(id) => Some(format!("/users/{}/tracks", id)),
            TrackQuery::LikedBy(id) => Some(format!("/users/{}/likes/tracks", id)),
            TrackQuery::Mine => Some("/me/tracks".to_string()),
            TrackQuery::MyLikes => Some("/me/likes".to_string()),
        }
    }

    fn access(&self) -> Access {
        match self {
            TrackQuery::Mine | TrackQuery::MyLikes => Access::Authenticated,
            _ => Access::Public,
        }
    }

    fn label(&self) -> String {
        match self {
            TrackQuery::Search(_) => "tracks:search".to_string(),
            TrackQuery::InPlaylist(id) => format!("playlists/{}/tracks", id),
            TrackQuery::ByUser(id) => format!("users/{}/tracks", id),
            TrackQuery::LikedBy(id) => format!("users/{}/likes", id),
            TrackQuery::Mine => "me/tracks".to_string(),
            TrackQuery::MyLikes => "me/likes".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserQuery {
    Search(String),
    FollowersOf(UserId),
    FollowingsOf(UserId),
    MyFollowers,
    MyFollowings,
}

impl CollectionQuery for UserQuery {
    type Item = User;

    fn route(&self) -> Option<String> {
        match self {
            UserQuery::Search(text) => search_route("users", text),
            UserQuery::FollowersOf(id) => Some(format!("/users/{}/followers", id)),
            UserQuery::FollowingsOf(id) => Some(format!("/users/{}/followings", id)),
            UserQuery::MyFollowers => Some("/me/followers".to_string()),
            UserQuery::MyFollowings => Some("/me/followings".to_string()),
        }
    }

    fn access(&self) -> Access {
        match self {
            UserQuery::MyFollowers | UserQuery::MyFollowings => Access::Authenticated,
            _ => Access::Public,
        }
    }

    fn label(&self) -> String {
        match self {
            UserQuery::Search(_) => "users:search".to_string(),
            UserQuery::FollowersOf(id) => format!("users/{}/followers", id),
            UserQuery::FollowingsOf(id) => format!("users/{}/followings", id),
            UserQuery::MyFollowers => "me/followers".to_string(),
            UserQuery::MyFollowings => "me/followings".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaylistQuery {
    Search(String),
    ByUser(UserId),
    Mine,
}

impl CollectionQuery for PlaylistQuery {
    type Item = Playlist;

    fn route(&self) -> Option<String> {
        match self {
            PlaylistQuery::Search(text) => search_route("playlists", text),
            PlaylistQuery::ByUser(id) => Some(format!("/users/{}/playlists", id)),
            PlaylistQuery::Mine => Some("/me/playlists".to_string()),
        }
    }

    fn access(&self) -> Access {
        match self {
            PlaylistQuery::Mine => Access::Authenticated,
            _ => Access::Public,
        }
    }

    fn label(&self) -> String {
        match self {
            PlaylistQuery::Search(_) => "playlists:search".to_string(),
            PlaylistQuery::ByUser(id) => format!("users/{}/playlists", id),
            PlaylistQuery::Mine => "me/playlists".to_string(),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Request plumbing shared by the client and its fetchers.
#[derive(Clone)]
pub(crate) struct Api {
    http: Arc<dyn HttpClient>,
    session: Option<SessionManager>,
    api_prefix: String,
    request_timeout: Duration,
}

impl Api {
    pub(crate) fn new(config: &CoreConfig) -> Self {
        Self {
            http: Arc::clone(&config.http_client),
            session: None,
            api_prefix: config.api_prefix.clone(),
            request_timeout: config.request_timeout,
        }
    }

    pub(crate) fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn session(&self) -> Option<&SessionManager> {
        self.session.as_ref()
    }

    pub(crate) fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.api_prefix, route)
    }

    /// Send `request`, attaching a bearer token for authenticated routes.
    ///
    /// Non-2xx responses become `CatalogError::HttpStatus`. A 401/403 on an
    /// authenticated route also clears the session, unless the token was
    /// refreshed in the meantime.
    pub(crate) async fn send(
        &self,
        mut request: HttpRequest,
        access: Access,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let token = match access {
            Access::Public => None,
            Access::Authenticated => {
                let session = self.session.as_ref().ok_or(CatalogError::NotAuthenticated)?;
                Some(session.valid_access_token().await?)
            }
        };

        if let Some(token) = &token {
            request = request.bearer_token(token);
        }
        let request = request.default_timeout(Some(self.request_timeout));
        let url = strip_query(&request.url).to_string();
        debug!(method = request.method.as_str(), url = %url, "Catalog request");

        let response = self.http.execute_cancellable(request, cancel).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.is_auth_failure() {
            if let (Some(session), Some(token)) = (&self.session, &token) {
                warn!(status = response.status, url = %url, "Authenticated route rejected token");
                session.invalidate_token(token, format!("HTTP {} from {}", response.status, url));
            }
        }

        Err(CatalogError::HttpStatus {
            status: response.status,
            url,
        })
    }

    pub(crate) async fn get_json<R: DeserializeOwned>(
        &self,
        route: &str,
        access: Access,
        cancel: &CancellationToken,
    ) -> Result<R> {
        let response = self
            .send(HttpRequest::get(self.endpoint(route)), access, cancel)
            .await?;
        decode(&response)
    }
}

pub(crate) fn decode<R: DeserializeOwned>(response: &HttpResponse) -> Result<R> {
    response
        .json()
        .map_err(|e| CatalogError::Decode(e.to_string()))
}

/// Route that follows an upstream `next_href`.
pub(crate) fn next_route(cursor: &Cursor) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", cursor.as_str())
        .finish();
    format!("/next?{}", query)
}

/// [`PageFetcher`] for any [`CollectionQuery`].
pub struct CollectionFetcher<Q> {
    api: Api,
    _query: PhantomData<fn() -> Q>,
}

impl<Q> CollectionFetcher<Q> {
    pub(crate) fn new(api: Api) -> Self {
        Self {
            api,
            _query: PhantomData,
        }
    }
}

#[async_trait]
impl<Q: CollectionQuery> PageFetcher<Q::Item, Q> for CollectionFetcher<Q> {
    async fn fetch_page(
        &self,
        query: &Q,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page<Q::Item>> {
        let route = match cursor {
            Some(cursor) => next_route(cursor),
            None => match query.route() {
                Some(route) => route,
                None => return Ok(Page::last(Vec::new())),
            },
        };

        let body: CollectionResponse<Q::Item> =
            self.api.get_json(&route, query.access(), cancel).await?;
        Ok(body.into_page())
    }
}
