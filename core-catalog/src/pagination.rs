//! Page and cursor types for collection endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque pagination marker.
///
/// For the catalog API this is the `next_href` of the previous page; the
/// client never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a collection. No cursor means this is the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// # Examples
    ///
    /// ```
    /// use core_catalog::pagination::{Cursor, Page};
    ///
    /// let page = Page::new(vec![1, 2], Some(Cursor::new("https://api.test/next")));
    /// assert!(!page.is_last());
    ///
    /// let last = Page::last(vec![3]);
    /// assert!(last.is_last());
    /// ```
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Body of a collection endpoint.
///
/// The API answers either `{ "collection": [...], "next_href": ... }` or a
/// bare array. An empty or null `next_href` ends the collection.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CollectionResponse<T> {
    Paged {
        collection: Vec<T>,
        #[serde(default)]
        next_href: Option<String>,
    },
    Bare(Vec<T>),
}

impl<T> CollectionResponse<T> {
    pub fn into_page(self) -> Page<T> {
        match self {
            CollectionResponse::Paged {
                collection,
                next_href,
            } => Page::new(
                collection,
                next_href.filter(|href| !href.is_empty()).map(Cursor::new),
            ),
            CollectionResponse::Bare(items) => Page::last(items),
        }
    }

    pub fn into_items(self) -> Vec<T> {
        self.into_page().items
    }
}
