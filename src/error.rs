use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Metadata API error: {0}")]
    ExternalApi(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("This title is already in your collection")]
    DuplicateItem,

    #[error("This title is already in your watchlist")]
    AlreadyInWatchlist,

    #[error("You already liked this title")]
    AlreadyLiked,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("That email is already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Conflicts the web layer recovers from by re-rendering the current
    /// view with an inline message instead of an error page.
    pub fn is_recoverable_conflict(&self) -> bool {
        matches!(
            self,
            AppError::DuplicateItem | AppError::AlreadyInWatchlist | AppError::AlreadyLiked
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Anonymous users get bounced to the login page rather than a 401 body.
        if matches!(self, AppError::Unauthorized) {
            return Redirect::to("/login").into_response();
        }

        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::DuplicateItem
            | AppError::AlreadyInWatchlist
            | AppError::AlreadyLiked
            | AppError::EmailTaken => StatusCode::CONFLICT,
            AppError::ExternalApi(_) | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Template(_)
            | AppError::Internal(_)
            | AppError::Unauthorized => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match status {
            // Do not leak driver/template internals to the browser.
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "request failed");
                "Something went wrong on our side".to_string()
            }
            _ => self.to_string(),
        };

        (status, Html(format!("<p>{message}</p>"))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_errors_are_recoverable() {
        assert!(AppError::DuplicateItem.is_recoverable_conflict());
        assert!(AppError::AlreadyInWatchlist.is_recoverable_conflict());
        assert!(AppError::AlreadyLiked.is_recoverable_conflict());
    }

    #[test]
    fn upstream_and_persistence_errors_are_not_recoverable() {
        assert!(!AppError::ExternalApi("down".into()).is_recoverable_conflict());
        assert!(!AppError::NotFound("item 4".into()).is_recoverable_conflict());
        assert!(!AppError::Internal("boom".into()).is_recoverable_conflict());
    }
}
