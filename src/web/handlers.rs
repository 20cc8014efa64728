use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::{self, AuthUser, GoogleOAuth, MaybeAuthUser},
    error::{AppError, AppResult},
    models::{Candidate, CollectionQuery, MediaType, SortKey, User},
};

use super::{
    views::{CollectionPage, HtmlTemplate, LoginPage, RegisterPage, SearchPage},
    AppState,
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";

// Request/form types

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub sort: Option<SortKey>,
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct AddForm {
    pub title: String,
    pub description: String,
    pub poster_url: String,
    #[serde(default)]
    pub release_date: Option<String>,
    pub media_type: MediaType,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl AddForm {
    fn into_candidate(self) -> AppResult<Candidate> {
        Ok(Candidate {
            title: self.title,
            description: self.description,
            poster_url: self.poster_url,
            // Lenient like the search normalizer: an unparseable or empty
            // date just means "unknown"
            release_date: self
                .release_date
                .filter(|d| !d.is_empty())
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            media_type: self.media_type,
            rating: parse_rating(self.rating)?,
            comment: self.comment.filter(|c| !c.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateForm {
    pub item_id: i64,
    pub rating: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemForm {
    pub item_id: i64,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

fn parse_rating(raw: Option<String>) -> AppResult<Option<i16>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i16>()
            .map(Some)
            .map_err(|_| AppError::InvalidInput(format!("rating must be a number, got {value:?}"))),
    }
}

/// Only same-site paths are valid redirect targets
fn safe_next(next: Option<String>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n,
        _ => "/".to_string(),
    }
}

// View-model builders shared by the happy path and conflict re-renders

async fn collection_page(
    state: &AppState,
    user: &User,
    sort: SortKey,
    media_type: Option<MediaType>,
) -> AppResult<CollectionPage> {
    let items = state
        .engine
        .list(user.id, CollectionQuery::collection(sort, media_type))
        .await?;

    Ok(CollectionPage {
        heading: format!("{}'s collection", user.display_name),
        items,
        message: None,
        owned: true,
        watchlist: false,
    })
}

async fn watchlist_page(state: &AppState, user: &User) -> AppResult<CollectionPage> {
    let items = state
        .engine
        .list(user.id, CollectionQuery::watchlist())
        .await?;

    Ok(CollectionPage {
        heading: format!("{}'s watchlist", user.display_name),
        items,
        message: None,
        owned: true,
        watchlist: true,
    })
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// The viewer's rated collection, with ordering and type filters
pub async fn collection(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let page = collection_page(
        &state,
        &user,
        params.sort.unwrap_or_default(),
        params.media_type,
    )
    .await?;
    Ok(HtmlTemplate(page).into_response())
}

/// The viewer's watchlist
pub async fn watchlist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Response> {
    let page = watchlist_page(&state, &user).await?;
    Ok(HtmlTemplate(page).into_response())
}

/// TMDB search; upstream failure degrades to an inline message
pub async fn search(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(params): Query<SearchParams>,
) -> AppResult<Response> {
    if params.query.trim().is_empty() {
        let page = SearchPage {
            query: params.query,
            results: Vec::new(),
            message: None,
        };
        return Ok(HtmlTemplate(page).into_response());
    }

    match state.metadata.search(&params.query).await {
        Ok(results) => Ok(HtmlTemplate(SearchPage {
            query: params.query,
            results,
            message: None,
        })
        .into_response()),
        Err(e @ (AppError::ExternalApi(_) | AppError::HttpClient(_))) => {
            tracing::warn!(error = %e, query = %params.query, "metadata search failed");
            Ok(HtmlTemplate(SearchPage {
                query: params.query,
                results: Vec::new(),
                message: Some("Search is unavailable right now, try again in a moment".to_string()),
            })
            .into_response())
        }
        Err(e) => Err(e),
    }
}

/// Add a rated item (or promote a watchlisted one)
pub async fn add(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<AddForm>,
) -> AppResult<Response> {
    let candidate = form.into_candidate()?;

    match state.engine.add_or_update(user.id, candidate).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(e) if e.is_recoverable_conflict() => {
            let page = collection_page(&state, &user, SortKey::default(), None)
                .await?
                .with_message(e.to_string());
            Ok(HtmlTemplate(page).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Add a watchlist entry
pub async fn watchlist_add(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<AddForm>,
) -> AppResult<Response> {
    let candidate = form.into_candidate()?;

    match state.engine.add_to_watchlist(user.id, candidate).await {
        Ok(_) => Ok(Redirect::to("/watchlist").into_response()),
        Err(e) if e.is_recoverable_conflict() => {
            let page = watchlist_page(&state, &user).await?.with_message(e.to_string());
            Ok(HtmlTemplate(page).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Re-rate an item; always promotes it out of the watchlist
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<UpdateForm>,
) -> AppResult<Response> {
    let rating = parse_rating(Some(form.rating))?
        .ok_or_else(|| AppError::InvalidInput("rating is required".to_string()))?;

    state
        .engine
        .update_rating(
            user.id,
            form.item_id,
            rating,
            form.comment.filter(|c| !c.trim().is_empty()),
        )
        .await?;

    Ok(Redirect::to(&safe_next(form.next)).into_response())
}

/// Delete an item and its likes
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<ItemForm>,
) -> AppResult<Response> {
    state.engine.delete(user.id, form.item_id).await?;
    Ok(Redirect::to(&safe_next(form.next)).into_response())
}

/// Like another user's entry
pub async fn like(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<ItemForm>,
) -> AppResult<Response> {
    match state.engine.like(user.id, form.item_id).await {
        Ok(_) => Ok(Redirect::to(&safe_next(form.next)).into_response()),
        Err(AppError::AlreadyLiked) => {
            // Re-render the owner's collection with the message
            let item = state
                .engine
                .get(form.item_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("item {}", form.item_id)))?;
            let owner = state
                .users
                .find_by_id(item.owner_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("user {}", item.owner_id)))?;
            let items = state
                .engine
                .list(owner.id, CollectionQuery::collection(SortKey::default(), None))
                .await?;

            let page = CollectionPage {
                heading: format!("{}'s collection", owner.display_name),
                items,
                message: Some(AppError::AlreadyLiked.to_string()),
                owned: owner.id == user.id,
                watchlist: false,
            };
            Ok(HtmlTemplate(page).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Another user's rated collection; visible without a session
pub async fn public_collection(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(owner_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let owner = state
        .users
        .find_by_id(owner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {owner_id}")))?;

    let items = state
        .engine
        .list(
            owner.id,
            CollectionQuery::collection(params.sort.unwrap_or_default(), params.media_type),
        )
        .await?;

    let page = CollectionPage {
        heading: format!("{}'s collection", owner.display_name),
        items,
        message: None,
        owned: viewer.map(|u| u.id) == Some(owner.id),
        watchlist: false,
    };
    Ok(HtmlTemplate(page).into_response())
}

pub async fn login_page(State(state): State<AppState>) -> Response {
    HtmlTemplate(LoginPage {
        message: None,
        oauth_enabled: state.oauth.is_some(),
    })
    .into_response()
}

pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    match state.auth.authenticate(&form.email, &form.password).await {
        Ok(user) => {
            Ok((jar.add(auth::session_cookie(&user)), Redirect::to("/")).into_response())
        }
        Err(e @ AppError::InvalidCredentials) => Ok(HtmlTemplate(LoginPage {
            message: Some(e.to_string()),
            oauth_enabled: state.oauth.is_some(),
        })
        .into_response()),
        Err(e) => Err(e),
    }
}

pub async fn register_page() -> Response {
    HtmlTemplate(RegisterPage { message: None }).into_response()
}

pub async fn register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let display_name = form.display_name.unwrap_or_default();

    match state
        .auth
        .register(&form.email, &form.password, &display_name)
        .await
    {
        Ok(user) => {
            Ok((jar.add(auth::session_cookie(&user)), Redirect::to("/")).into_response())
        }
        Err(e @ (AppError::EmailTaken | AppError::InvalidInput(_))) => {
            Ok(HtmlTemplate(RegisterPage {
                message: Some(e.to_string()),
            })
            .into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn logout(jar: SignedCookieJar) -> Response {
    let cookie = Cookie::build((auth::SESSION_COOKIE, "")).path("/").build();
    (jar.remove(cookie), Redirect::to("/login")).into_response()
}

/// Kick off the Google consent flow, parking CSRF state in a signed cookie
pub async fn oauth_start(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let Some(oauth) = state.oauth.as_ref() else {
        return Redirect::to("/login").into_response();
    };

    let csrf = GoogleOAuth::generate_state();
    let url = oauth.authorize_url(&csrf);
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    (jar.add(cookie), Redirect::to(&url)).into_response()
}

/// Provision-or-fetch the account for the returning OAuth user
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> AppResult<Response> {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build((OAUTH_STATE_COOKIE, "")).path("/").build());

    let (Some(code), Some(returned)) = (params.code, params.state) else {
        return Err(AppError::InvalidInput(
            "OAuth callback missing code or state".to_string(),
        ));
    };
    if expected.as_deref() != Some(returned.as_str()) {
        return Err(AppError::InvalidInput("OAuth state mismatch".to_string()));
    }

    let Some(oauth) = state.oauth.as_ref() else {
        return Err(AppError::NotFound("OAuth login is not enabled".to_string()));
    };

    let profile = oauth.exchange_code(&code).await?;
    let user = state.auth.provision_oauth(profile).await?;

    Ok((jar.add(auth::session_cookie(&user)), Redirect::to("/")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rating_accepts_blank_and_numbers() {
        assert_eq!(parse_rating(None).unwrap(), None);
        assert_eq!(parse_rating(Some("".to_string())).unwrap(), None);
        assert_eq!(parse_rating(Some(" 9 ".to_string())).unwrap(), Some(9));
        assert!(parse_rating(Some("nine".to_string())).is_err());
    }

    #[test]
    fn safe_next_only_allows_local_paths() {
        assert_eq!(safe_next(Some("/watchlist".to_string())), "/watchlist");
        assert_eq!(safe_next(Some("https://evil.example".to_string())), "/");
        assert_eq!(safe_next(Some("//evil.example".to_string())), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn add_form_normalizes_optional_fields() {
        let form = AddForm {
            title: "Dune".to_string(),
            description: "desc".to_string(),
            poster_url: "http://img.example/d.jpg".to_string(),
            release_date: Some("".to_string()),
            media_type: MediaType::Movie,
            rating: Some("9".to_string()),
            comment: Some("   ".to_string()),
        };

        let candidate = form.into_candidate().unwrap();
        assert_eq!(candidate.release_date, None);
        assert_eq!(candidate.rating, Some(9));
        assert_eq!(candidate.comment, None);
    }
}
