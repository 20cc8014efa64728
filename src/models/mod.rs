use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub type UserId = i64;
pub type ItemId = i64;

/// A registered account. `password_hash` is `None` for OAuth-only accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: String,
    pub picture_url: Option<String>,
}

/// Kind of tracked media
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    /// Maps TMDB's `media_type` discriminator. Anything else (people,
    /// collections) is not a trackable title.
    pub fn from_tmdb(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(MediaType::Movie),
            "tv" => Some(MediaType::Tv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item sits in its lifecycle.
///
/// `Watchlisted` items carry no rating yet; promotion to `Rated` happens
/// when the owner re-adds or rates them. There is no transition back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Watchlisted,
    Rated,
}

impl ItemState {
    pub fn is_watchlisted(&self) -> bool {
        matches!(self, ItemState::Watchlisted)
    }
}

/// A tracked movie or TV title owned by one user
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: ItemId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub poster_url: String,
    pub release_date: Option<NaiveDate>,
    pub added_date: DateTime<Utc>,
    pub media_type: MediaType,
    pub state: ItemState,
    pub rating: Option<i16>,
    pub comment: Option<String>,
    /// Denormalized count of like-ledger rows; maintained transactionally
    /// with the ledger, never written on its own.
    pub like_count: i64,
}

/// What a user submits when adding a title, before it has a row
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub poster_url: String,
    pub release_date: Option<NaiveDate>,
    pub media_type: MediaType,
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// Which slice of a user's items a listing reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionView {
    /// Rated items only (the default collection page)
    Collection,
    /// Watchlisted items only
    Watchlist,
}

/// Supported list orderings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Likes,
    Rating,
    Title,
}

/// A listing request against one user's items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionQuery {
    pub view: CollectionView,
    pub sort: SortKey,
    pub media_type: Option<MediaType>,
}

impl CollectionQuery {
    pub fn collection(sort: SortKey, media_type: Option<MediaType>) -> Self {
        Self {
            view: CollectionView::Collection,
            sort,
            media_type,
        }
    }

    pub fn watchlist() -> Self {
        Self {
            view: CollectionView::Watchlist,
            sort: SortKey::Title,
            media_type: None,
        }
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// One entry of the heterogeneous `results` array from `/search/multi`.
/// Movies carry `title`/`release_date`, TV shows `name`/`first_air_date`.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbEntry {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
}

/// A search hit normalized into one shape for rendering and adding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub description: String,
    pub poster_url: String,
    pub release_date: Option<NaiveDate>,
    pub media_type: MediaType,
}

impl TmdbEntry {
    /// Collapses the movie/TV field split into one result. Returns `None`
    /// for non-title entries and for entries without a poster, which are
    /// unusable for display.
    pub fn normalize(self, image_base: &str) -> Option<SearchResult> {
        let media_type = MediaType::from_tmdb(self.media_type.as_deref()?)?;
        let poster_path = self.poster_path?;
        let title = self.title.or(self.name)?;

        let release_date = self
            .release_date
            .or(self.first_air_date)
            .filter(|d| !d.is_empty())
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

        Some(SearchResult {
            title,
            description: self.overview.unwrap_or_default(),
            poster_url: format!("{}{}", image_base, poster_path),
            release_date,
            media_type,
        })
    }
}
