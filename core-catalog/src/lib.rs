//! # Catalog Module
//!
//! Typed catalog resources and the cursor pagination engine.
//!
//! ## Overview
//!
//! - [`Paginator`]: accumulates the pages of one collection query,
//!   deduplicating items by [`Identify::identity`] and discarding responses
//!   for superseded queries.
//! - [`CatalogClient`]: the routes of the catalog backend (tracks, users,
//!   playlists, search, likes) on top of the injected `HttpClient`, with
//!   bearer tokens from an optional `SessionManager`.
//! - [`pagination`]: `Page`, `Cursor` and the `{collection, next_href}` body.

pub mod client;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod pagination;
pub mod paginator;

pub use client::{CatalogClient, MutationState};
pub use error::{CatalogError, Result};
pub use fetchers::{Access, CollectionFetcher, CollectionQuery, PlaylistQuery, TrackQuery, UserQuery};
pub use models::{
    Comment, CommentId, Identify, Playlist, PlaylistId, Resource, Track, TrackId, User, UserId,
};
pub use pagination::{CollectionResponse, Cursor, Page};
pub use paginator::{page_fn, FnFetcher, PageFetcher, PaginationState, PaginationStatus, Paginator};
