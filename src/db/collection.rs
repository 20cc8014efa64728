use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::{
    db::{CollectionStore, LikeOutcome},
    error::{AppError, AppResult},
    models::{
        Candidate, CollectionQuery, CollectionView, ItemId, ItemState, MediaItem, MediaType,
        SortKey, UserId,
    },
};

const ITEM_COLUMNS: &str = "id, owner_id, title, description, poster_url, release_date, \
     added_date, media_type, watchlist, rating, comment, like_count";

/// `CollectionStore` backed by Postgres
///
/// Uses runtime-bound queries so the crate builds without a live database.
/// Multi-row operations (delete cascade, like + counter) run inside a single
/// transaction; read-committed is enough because the like insert serializes
/// on the ledger primary key.
#[derive(Clone)]
pub struct PgCollectionStore {
    pool: PgPool,
}

impl PgCollectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    owner_id: i64,
    title: String,
    description: String,
    poster_url: String,
    release_date: Option<NaiveDate>,
    added_date: DateTime<Utc>,
    media_type: String,
    watchlist: bool,
    rating: Option<i16>,
    comment: Option<String>,
    like_count: i64,
}

impl TryFrom<ItemRow> for MediaItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> AppResult<Self> {
        let media_type = MediaType::from_tmdb(&row.media_type).ok_or_else(|| {
            AppError::Internal(format!("unknown media_type in row {}: {}", row.id, row.media_type))
        })?;

        let state = if row.watchlist {
            ItemState::Watchlisted
        } else {
            ItemState::Rated
        };

        Ok(MediaItem {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            poster_url: row.poster_url,
            release_date: row.release_date,
            added_date: row.added_date,
            media_type,
            state,
            rating: row.rating,
            comment: row.comment,
            like_count: row.like_count,
        })
    }
}

/// Maps an `(owner_id, description)` unique violation to the typed conflict
/// the engine branches on; everything else stays a persistence failure.
fn map_insert_conflict(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateItem,
        other => AppError::Database(other),
    }
}

#[async_trait::async_trait]
impl CollectionStore for PgCollectionStore {
    async fn insert_item(
        &self,
        owner: UserId,
        candidate: Candidate,
        state: ItemState,
    ) -> AppResult<MediaItem> {
        let sql = format!(
            "INSERT INTO media_items \
             (owner_id, title, description, poster_url, release_date, media_type, watchlist, rating, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ITEM_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(owner)
            .bind(&candidate.title)
            .bind(&candidate.description)
            .bind(&candidate.poster_url)
            .bind(candidate.release_date)
            .bind(candidate.media_type.as_str())
            .bind(state.is_watchlisted())
            .bind(candidate.rating)
            .bind(&candidate.comment)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_conflict)?;

        row.try_into()
    }

    async fn find_by_description(
        &self,
        owner: UserId,
        description: &str,
    ) -> AppResult<Option<MediaItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM media_items WHERE owner_id = $1 AND description = $2"
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(owner)
            .bind(description)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaItem::try_from).transpose()
    }

    async fn promote_item(
        &self,
        owner: UserId,
        item: ItemId,
        rating: Option<i16>,
        comment: Option<String>,
    ) -> AppResult<MediaItem> {
        let sql = format!(
            "UPDATE media_items SET watchlist = FALSE, rating = $3, comment = $4 \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {ITEM_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item)
            .bind(owner)
            .bind(rating)
            .bind(comment)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {item}")))?;

        row.try_into()
    }

    async fn set_rating(
        &self,
        owner: UserId,
        item: ItemId,
        rating: i16,
        comment: Option<String>,
    ) -> AppResult<Option<MediaItem>> {
        let sql = format!(
            "UPDATE media_items SET watchlist = FALSE, rating = $3, comment = $4 \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {ITEM_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item)
            .bind(owner)
            .bind(rating)
            .bind(comment)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaItem::try_from).transpose()
    }

    async fn delete_item(&self, owner: UserId, item: ItemId) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let owned = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM media_items WHERE id = $1 AND owner_id = $2",
        )
        .bind(item)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        if owned.is_none() {
            return Ok(false);
        }

        // Ledger rows first: the FK has no cascade, so this order is load-bearing.
        sqlx::query("DELETE FROM like_records WHERE item_id = $1")
            .bind(item)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM media_items WHERE id = $1")
            .bind(item)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(item_id = item, owner_id = owner, "item deleted with like cascade");
        Ok(true)
    }

    async fn has_liked(&self, liker: UserId, item: ItemId) -> AppResult<bool> {
        let liked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM like_records WHERE user_id = $1 AND item_id = $2)",
        )
        .bind(liker)
        .bind(item)
        .fetch_one(&self.pool)
        .await?;

        Ok(liked)
    }

    async fn record_like(&self, liker: UserId, item: ItemId) -> AppResult<LikeOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO like_records (user_id, item_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(liker)
        .bind(item)
        .execute(&mut *tx)
        .await;

        match inserted {
            // A concurrent like won the race; dropping the tx rolls back.
            Ok(res) if res.rows_affected() == 0 => return Ok(LikeOutcome::AlreadyLiked),
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(AppError::NotFound(format!("item {item}")));
            }
            Err(e) => return Err(e.into()),
        }

        let like_count = sqlx::query_scalar::<_, i64>(
            "UPDATE media_items SET like_count = like_count + 1 WHERE id = $1 \
             RETURNING like_count",
        )
        .bind(item)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(liker_id = liker, item_id = item, like_count, "like recorded");
        Ok(LikeOutcome::Liked { like_count })
    }

    async fn get_item(&self, item: ItemId) -> AppResult<Option<MediaItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM media_items WHERE id = $1");

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaItem::try_from).transpose()
    }

    async fn list_items(
        &self,
        owner: UserId,
        query: CollectionQuery,
    ) -> AppResult<Vec<MediaItem>> {
        let mut sql = format!(
            "SELECT {ITEM_COLUMNS} FROM media_items WHERE owner_id = $1 AND watchlist = $2"
        );
        if query.media_type.is_some() {
            sql.push_str(" AND media_type = $3");
        }
        sql.push_str(match query.sort {
            SortKey::Likes => " ORDER BY like_count DESC, title ASC",
            SortKey::Rating => " ORDER BY rating DESC NULLS LAST, title ASC",
            SortKey::Title => " ORDER BY title ASC",
        });

        let mut stmt = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(owner)
            .bind(query.view == CollectionView::Watchlist);
        if let Some(media_type) = query.media_type {
            stmt = stmt.bind(media_type.as_str());
        }

        let rows = stmt.fetch_all(&self.pool).await?;
        rows.into_iter().map(MediaItem::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> ItemRow {
        ItemRow {
            id: 7,
            owner_id: 1,
            title: "Dune".to_string(),
            description: "Paul Atreides leads a rebellion".to_string(),
            poster_url: "https://image.tmdb.org/t/p/original/dune.jpg".to_string(),
            release_date: NaiveDate::from_ymd_opt(2021, 9, 15),
            added_date: Utc::now(),
            media_type: "movie".to_string(),
            watchlist: true,
            rating: None,
            comment: None,
            like_count: 0,
        }
    }

    #[test]
    fn row_maps_watchlist_flag_to_state() {
        let item = MediaItem::try_from(sample_row()).unwrap();
        assert_eq!(item.state, ItemState::Watchlisted);
        assert_eq!(item.media_type, MediaType::Movie);

        let mut row = sample_row();
        row.watchlist = false;
        row.rating = Some(9);
        let item = MediaItem::try_from(row).unwrap();
        assert_eq!(item.state, ItemState::Rated);
        assert_eq!(item.rating, Some(9));
    }

    #[test]
    fn row_with_unknown_media_type_is_an_internal_error() {
        let mut row = sample_row();
        row.media_type = "podcast".to_string();
        assert!(matches!(
            MediaItem::try_from(row),
            Err(AppError::Internal(_))
        ));
    }
}
