//! Credential verification and session identity
//!
//! Local accounts store an argon2 hash; OAuth-only accounts store no hash
//! at all and can never authenticate with a password. Sessions are a signed
//! cookie carrying the user id, resolved to a `User` per request by the
//! `AuthUser` extractor.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::User,
    web::AppState,
};

pub mod oauth;

pub use oauth::{GoogleOAuth, OAuthProfile};

/// Name of the signed session cookie; its value is the user id
pub const SESSION_COOKIE: &str = "reelshelf_session";

pub fn hash_password(plain: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Builds the session cookie for a freshly authenticated user
pub fn session_cookie(user: &User) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, user.id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Verifies credentials and provisions accounts
#[derive(Clone)]
pub struct AuthGateway {
    users: Arc<dyn UserStore>,
}

impl AuthGateway {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AppResult<User> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(AppError::InvalidInput("Enter a valid email".to_string()));
        }
        if password.len() < 8 {
            return Err(AppError::InvalidInput(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let display_name = if display_name.trim().is_empty() {
            email.split('@').next().unwrap_or(email)
        } else {
            display_name.trim()
        };

        let hash = hash_password(password)?;
        let user = self.users.create_local(email, &hash, display_name).await?;
        tracing::info!(user_id = user.id, "account registered");
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let user = self
            .users
            .find_by_email(email.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        // OAuth-only accounts have no hash to compare against
        let Some(stored_hash) = user.password_hash.as_deref() else {
            return Err(AppError::InvalidCredentials);
        };

        if verify_password(password, stored_hash) {
            Ok(user)
        } else {
            Err(AppError::InvalidCredentials)
        }
    }

    /// Fetch-or-create the account for a verified OAuth profile
    pub async fn provision_oauth(&self, profile: OAuthProfile) -> AppResult<User> {
        let user = self
            .users
            .upsert_oauth(&profile.email, &profile.display_name, profile.picture_url)
            .await?;
        tracing::info!(user_id = user.id, "oauth login");
        Ok(user)
    }
}

/// The authenticated requester; rejects to a /login redirect
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Like `AuthUser` but anonymous requests pass through as `None`
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

async fn resolve_session(parts: &mut Parts, state: &AppState) -> AppResult<Option<User>> {
    let jar = SignedCookieJar::from_headers(&parts.headers, state.cookie_key.clone());

    let Some(user_id) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| c.value().parse::<i64>().ok())
    else {
        return Ok(None);
    };

    state.users.find_by_id(user_id).await
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        resolve_session(parts, state)
            .await?
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        Ok(MaybeAuthUser(resolve_session(parts, state).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockUserStore;

    fn local_user(hash: Option<String>) -> User {
        User {
            id: 1,
            email: "ada@example.com".to_string(),
            password_hash: hash,
            display_name: "Ada".to_string(),
            picture_url: None,
        }
    }

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn verify_tolerates_garbage_hashes() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_password() {
        let hash = hash_password("the right one").unwrap();
        let mut users = MockUserStore::new();
        users
            .expect_find_by_email()
            .return_once(move |_| Ok(Some(local_user(Some(hash)))));

        let gateway = AuthGateway::new(Arc::new(users));
        let err = gateway
            .authenticate("ada@example.com", "the wrong one")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn authenticate_rejects_oauth_only_accounts() {
        let mut users = MockUserStore::new();
        users
            .expect_find_by_email()
            .return_once(|_| Ok(Some(local_user(None))));

        let gateway = AuthGateway::new(Arc::new(users));
        let err = gateway
            .authenticate("ada@example.com", "any password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_emails() {
        let mut users = MockUserStore::new();
        users.expect_find_by_email().return_once(|_| Ok(None));

        let gateway = AuthGateway::new(Arc::new(users));
        let err = gateway
            .authenticate("nobody@example.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn register_validates_email_and_password_before_storage() {
        let users = MockUserStore::new();
        let gateway = AuthGateway::new(Arc::new(users));

        assert!(matches!(
            gateway.register("not-an-email", "longenough", "Ada").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            gateway.register("ada@example.com", "short", "Ada").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn register_defaults_display_name_to_email_prefix() {
        let mut users = MockUserStore::new();
        users
            .expect_create_local()
            .withf(|email, _, name| email == "ada@example.com" && name == "ada")
            .return_once(|_, _, _| Ok(local_user(Some("hash".to_string()))));

        let gateway = AuthGateway::new(Arc::new(users));
        gateway
            .register("ada@example.com", "longenough", "  ")
            .await
            .unwrap();
    }
}
