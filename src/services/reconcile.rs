//! Collection-state reconciliation
//!
//! The rules for how an item moves between watchlist and rated states, how
//! duplicate adds turn into updates, and how the like ledger stays in step
//! with the denormalized counter. Identity is an explicit argument on every
//! call; nothing here reads ambient session state.

use std::sync::Arc;

use crate::{
    db::{CollectionStore, LikeOutcome},
    error::{AppError, AppResult},
    models::{Candidate, CollectionQuery, ItemId, ItemState, MediaItem, UserId},
};

/// How an add request was reconciled against the existing collection
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// No prior row; a new rated item was created
    Created(MediaItem),
    /// A watchlisted row with the same description was promoted in place
    Promoted(MediaItem),
}

impl AddOutcome {
    pub fn item(&self) -> &MediaItem {
        match self {
            AddOutcome::Created(item) | AddOutcome::Promoted(item) => item,
        }
    }
}

/// Enforces the add/update/delete/like state machine over a store
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CollectionStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store }
    }

    /// Add a rated item, or promote the owner's watchlisted row with the
    /// same description.
    ///
    /// The insert runs unconditionally; only on a uniqueness conflict is
    /// the existing row inspected. A conflict with an already-rated row is
    /// `DuplicateItem`, which callers recover from by re-rendering with a
    /// message. Exactly one row per (owner, description) survives.
    pub async fn add_or_update(
        &self,
        owner: UserId,
        candidate: Candidate,
    ) -> AppResult<AddOutcome> {
        if let Some(rating) = candidate.rating {
            validate_rating(rating)?;
        }

        match self
            .store
            .insert_item(owner, candidate.clone(), ItemState::Rated)
            .await
        {
            Ok(item) => {
                tracing::info!(owner_id = owner, item_id = item.id, title = %item.title, "item added");
                Ok(AddOutcome::Created(item))
            }
            Err(AppError::DuplicateItem) => {
                let existing = self
                    .store
                    .find_by_description(owner, &candidate.description)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(
                            "insert conflicted but no row matches the description".to_string(),
                        )
                    })?;

                if existing.state.is_watchlisted() {
                    let promoted = self
                        .store
                        .promote_item(owner, existing.id, candidate.rating, candidate.comment)
                        .await?;
                    tracing::info!(
                        owner_id = owner,
                        item_id = promoted.id,
                        rating = ?promoted.rating,
                        "watchlist entry promoted to rated"
                    );
                    Ok(AddOutcome::Promoted(promoted))
                } else {
                    Err(AppError::DuplicateItem)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Add a watchlist entry. Any existing row for (owner, description),
    /// in either state, rejects the add without creating or mutating
    /// anything.
    pub async fn add_to_watchlist(
        &self,
        owner: UserId,
        mut candidate: Candidate,
    ) -> AppResult<MediaItem> {
        // Watchlist entries carry no rating yet
        candidate.rating = None;
        candidate.comment = None;

        match self
            .store
            .insert_item(owner, candidate, ItemState::Watchlisted)
            .await
        {
            Ok(item) => {
                tracing::info!(owner_id = owner, item_id = item.id, title = %item.title, "watchlist entry added");
                Ok(item)
            }
            Err(AppError::DuplicateItem) => Err(AppError::AlreadyInWatchlist),
            Err(e) => Err(e),
        }
    }

    /// Re-rate an owned item. Always promotes out of the watchlist.
    pub async fn update_rating(
        &self,
        owner: UserId,
        item: ItemId,
        rating: i16,
        comment: Option<String>,
    ) -> AppResult<MediaItem> {
        validate_rating(rating)?;

        self.store
            .set_rating(owner, item, rating, comment)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {item}")))
    }

    /// Delete an owned item together with its like-ledger rows
    pub async fn delete(&self, owner: UserId, item: ItemId) -> AppResult<()> {
        if self.store.delete_item(owner, item).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("item {item}")))
        }
    }

    /// Like an item on behalf of `liker`, returning the new count.
    ///
    /// Two-phase: the ledger check rejects repeat likes without touching
    /// anything; the store then inserts the ledger row and bumps the
    /// counter as one unit, resolving concurrent duplicates to
    /// `AlreadyLiked`.
    pub async fn like(&self, liker: UserId, item: ItemId) -> AppResult<i64> {
        if self.store.has_liked(liker, item).await? {
            return Err(AppError::AlreadyLiked);
        }

        match self.store.record_like(liker, item).await? {
            LikeOutcome::Liked { like_count } => {
                tracing::info!(liker_id = liker, item_id = item, like_count, "item liked");
                Ok(like_count)
            }
            LikeOutcome::AlreadyLiked => Err(AppError::AlreadyLiked),
        }
    }

    pub async fn get(&self, item: ItemId) -> AppResult<Option<MediaItem>> {
        self.store.get_item(item).await
    }

    pub async fn list(&self, owner: UserId, query: CollectionQuery) -> AppResult<Vec<MediaItem>> {
        self.store.list_items(owner, query).await
    }
}

fn validate_rating(rating: i16) -> AppResult<()> {
    if (1..=10).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "rating must be between 1 and 10, got {rating}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockCollectionStore;
    use crate::models::MediaType;
    use chrono::Utc;

    fn candidate(rating: Option<i16>) -> Candidate {
        Candidate {
            title: "Dune".to_string(),
            description: "Paul Atreides leads a rebellion".to_string(),
            poster_url: "https://img.example/dune.jpg".to_string(),
            release_date: None,
            media_type: MediaType::Movie,
            rating,
            comment: None,
        }
    }

    fn item(id: i64, state: ItemState, rating: Option<i16>) -> MediaItem {
        MediaItem {
            id,
            owner_id: 1,
            title: "Dune".to_string(),
            description: "Paul Atreides leads a rebellion".to_string(),
            poster_url: "https://img.example/dune.jpg".to_string(),
            release_date: None,
            added_date: Utc::now(),
            media_type: MediaType::Movie,
            state,
            rating,
            comment: None,
            like_count: 0,
        }
    }

    #[tokio::test]
    async fn add_creates_rated_item_when_no_conflict() {
        let mut store = MockCollectionStore::new();
        let created = item(1, ItemState::Rated, Some(9));
        store
            .expect_insert_item()
            .withf(|owner, c, state| {
                *owner == 1 && c.rating == Some(9) && *state == ItemState::Rated
            })
            .return_once(move |_, _, _| Ok(created));

        let engine = Reconciler::new(Arc::new(store));
        let outcome = engine.add_or_update(1, candidate(Some(9))).await.unwrap();
        assert!(matches!(outcome, AddOutcome::Created(_)));
        assert_eq!(outcome.item().rating, Some(9));
    }

    #[tokio::test]
    async fn duplicate_add_promotes_watchlisted_row_in_place() {
        let mut store = MockCollectionStore::new();
        store
            .expect_insert_item()
            .return_once(|_, _, _| Err(AppError::DuplicateItem));
        store
            .expect_find_by_description()
            .withf(|owner, desc| *owner == 1 && desc == "Paul Atreides leads a rebellion")
            .return_once(|_, _| Ok(Some(item(7, ItemState::Watchlisted, None))));
        store
            .expect_promote_item()
            .withf(|owner, id, rating, _| *owner == 1 && *id == 7 && *rating == Some(9))
            .return_once(|_, _, _, _| Ok(item(7, ItemState::Rated, Some(9))));

        let engine = Reconciler::new(Arc::new(store));
        let outcome = engine.add_or_update(1, candidate(Some(9))).await.unwrap();

        // Same row id survives the promotion
        match outcome {
            AddOutcome::Promoted(promoted) => {
                assert_eq!(promoted.id, 7);
                assert_eq!(promoted.state, ItemState::Rated);
                assert_eq!(promoted.rating, Some(9));
            }
            other => panic!("expected promotion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_add_of_rated_row_is_rejected_without_mutation() {
        let mut store = MockCollectionStore::new();
        store
            .expect_insert_item()
            .return_once(|_, _, _| Err(AppError::DuplicateItem));
        store
            .expect_find_by_description()
            .return_once(|_, _| Ok(Some(item(7, ItemState::Rated, Some(8)))));
        // No promote_item expectation: calling it would fail the test.

        let engine = Reconciler::new(Arc::new(store));
        let err = engine
            .add_or_update(1, candidate(Some(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateItem));
    }

    #[tokio::test]
    async fn watchlist_add_strips_rating_and_comment() {
        let mut store = MockCollectionStore::new();
        store
            .expect_insert_item()
            .withf(|_, c, state| {
                c.rating.is_none() && c.comment.is_none() && *state == ItemState::Watchlisted
            })
            .return_once(|_, _, _| Ok(item(3, ItemState::Watchlisted, None)));

        let engine = Reconciler::new(Arc::new(store));
        let mut wanted = candidate(Some(9));
        wanted.comment = Some("heard it's great".to_string());
        let added = engine.add_to_watchlist(1, wanted).await.unwrap();
        assert!(added.state.is_watchlisted());
    }

    #[tokio::test]
    async fn watchlist_add_conflict_maps_to_already_in_watchlist() {
        let mut store = MockCollectionStore::new();
        store
            .expect_insert_item()
            .return_once(|_, _, _| Err(AppError::DuplicateItem));

        let engine = Reconciler::new(Arc::new(store));
        let err = engine.add_to_watchlist(1, candidate(None)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyInWatchlist));
    }

    #[tokio::test]
    async fn update_rating_rejects_out_of_range_values_before_touching_storage() {
        let store = MockCollectionStore::new();
        let engine = Reconciler::new(Arc::new(store));

        for bad in [0, 11, -3] {
            let err = engine.update_rating(1, 7, bad, None).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn update_rating_on_missing_or_foreign_item_is_not_found() {
        let mut store = MockCollectionStore::new();
        store.expect_set_rating().return_once(|_, _, _, _| Ok(None));

        let engine = Reconciler::new(Arc::new(store));
        let err = engine.update_rating(1, 99, 7, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn repeat_like_is_rejected_by_the_ledger_check() {
        let mut store = MockCollectionStore::new();
        store.expect_has_liked().return_once(|_, _| Ok(true));
        // record_like must not be called

        let engine = Reconciler::new(Arc::new(store));
        let err = engine.like(2, 7).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyLiked));
    }

    #[tokio::test]
    async fn like_returns_the_new_counter_value() {
        let mut store = MockCollectionStore::new();
        store.expect_has_liked().return_once(|_, _| Ok(false));
        store
            .expect_record_like()
            .withf(|liker, item| *liker == 2 && *item == 7)
            .return_once(|_, _| Ok(LikeOutcome::Liked { like_count: 4 }));

        let engine = Reconciler::new(Arc::new(store));
        assert_eq!(engine.like(2, 7).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn like_lost_race_resolves_to_already_liked() {
        let mut store = MockCollectionStore::new();
        store.expect_has_liked().return_once(|_, _| Ok(false));
        store
            .expect_record_like()
            .return_once(|_, _| Ok(LikeOutcome::AlreadyLiked));

        let engine = Reconciler::new(Arc::new(store));
        let err = engine.like(2, 7).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyLiked));
    }

    #[tokio::test]
    async fn delete_of_missing_item_is_not_found() {
        let mut store = MockCollectionStore::new();
        store.expect_delete_item().return_once(|_, _| Ok(false));

        let engine = Reconciler::new(Arc::new(store));
        let err = engine.delete(1, 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
