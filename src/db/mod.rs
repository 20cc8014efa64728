/// Persistence seams
///
/// The reconciliation engine and auth gateway talk to storage through these
/// traits so the state-machine rules can be exercised against mocks and the
/// router against in-memory fakes. The Postgres implementations live in
/// `collection.rs` and `users.rs`.
use crate::{
    error::AppResult,
    models::{Candidate, CollectionQuery, ItemId, ItemState, MediaItem, User, UserId},
};

pub mod collection;
pub mod postgres;
pub mod users;

pub use collection::PgCollectionStore;
pub use postgres::create_pool;
pub use users::PgUserStore;

/// Result of recording a like against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Ledger row inserted and counter bumped in the same transaction
    Liked { like_count: i64 },
    /// Ledger already held (liker, item); nothing was written
    AlreadyLiked,
}

/// Storage for user-owned media items and the like ledger
///
/// Implementations must uphold two contracts the engine relies on:
/// - `insert_item` surfaces an `(owner, description)` uniqueness conflict
///   as `AppError::DuplicateItem` without writing anything;
/// - `delete_item` and `record_like` mutate the ledger and the item row as
///   one atomic unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert a new item row in the given state
    async fn insert_item(
        &self,
        owner: UserId,
        candidate: Candidate,
        state: ItemState,
    ) -> AppResult<MediaItem>;

    /// Look up the owner's item with this exact description
    async fn find_by_description(
        &self,
        owner: UserId,
        description: &str,
    ) -> AppResult<Option<MediaItem>>;

    /// Flip a watchlisted item to rated, taking the candidate's rating and
    /// comment. The row id is preserved.
    async fn promote_item(
        &self,
        owner: UserId,
        item: ItemId,
        rating: Option<i16>,
        comment: Option<String>,
    ) -> AppResult<MediaItem>;

    /// Set rating/comment on an owned item, forcing it out of the
    /// watchlist. Returns `None` when no row matches (owner, item).
    async fn set_rating(
        &self,
        owner: UserId,
        item: ItemId,
        rating: i16,
        comment: Option<String>,
    ) -> AppResult<Option<MediaItem>>;

    /// Delete an owned item and all its like-ledger rows in one
    /// transaction. Returns false when no row matches (owner, item).
    async fn delete_item(&self, owner: UserId, item: ItemId) -> AppResult<bool>;

    /// Whether the ledger already holds (liker, item)
    async fn has_liked(&self, liker: UserId, item: ItemId) -> AppResult<bool>;

    /// Insert the ledger row and bump the item's counter atomically.
    /// A concurrent duplicate resolves to `AlreadyLiked`, not an error.
    async fn record_like(&self, liker: UserId, item: ItemId) -> AppResult<LikeOutcome>;

    async fn get_item(&self, item: ItemId) -> AppResult<Option<MediaItem>>;

    /// List one user's items for the requested view, ordering and type
    /// filter
    async fn list_items(&self, owner: UserId, query: CollectionQuery)
        -> AppResult<Vec<MediaItem>>;
}

/// Storage for accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>>;

    /// Create a password account. An existing email surfaces as
    /// `AppError::EmailTaken`.
    async fn create_local(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> AppResult<User>;

    /// Fetch-or-provision an OAuth account. First login creates the row
    /// with no password hash; later logins refresh name and picture.
    async fn upsert_oauth(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<String>,
    ) -> AppResult<User>;
}
