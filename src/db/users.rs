use sqlx::PgPool;

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::{User, UserId},
};

const USER_COLUMNS: &str = "id, email, password_hash, display_name, picture_url";

/// `UserStore` backed by Postgres
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: Option<String>,
    display_name: String,
    picture_url: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            picture_url: row.picture_url,
        }
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn create_local(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, display_name) \
             VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .bind(password_hash)
            .bind(display_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => AppError::EmailTaken,
                other => AppError::Database(other),
            })?;

        Ok(row.into())
    }

    async fn upsert_oauth(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<String>,
    ) -> AppResult<User> {
        // First login provisions the row with no password hash; later
        // logins refresh the profile fields but never touch the hash.
        let sql = format!(
            "INSERT INTO users (email, password_hash, display_name, picture_url) \
             VALUES ($1, NULL, $2, $3) \
             ON CONFLICT (email) DO UPDATE \
             SET display_name = EXCLUDED.display_name, picture_url = EXCLUDED.picture_url \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .bind(display_name)
            .bind(picture_url)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }
}
