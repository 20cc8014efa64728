/// View-models for the HTML pages
///
/// The contract with the templates is deliberately small: a heading, a list
/// of items (or search results), and an optional inline message for
/// recovered conflicts and upstream failures.
use askama::Template;
use axum::response::{Html, IntoResponse, Response};

use crate::{
    error::AppError,
    models::{MediaItem, SearchResult},
};

/// Renders an askama template, degrading render failures to `AppError`
pub struct HtmlTemplate<T>(pub T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => AppError::Template(err).into_response(),
        }
    }
}

#[derive(Template)]
#[template(path = "collection.html")]
pub struct CollectionPage {
    pub heading: String,
    pub items: Vec<MediaItem>,
    pub message: Option<String>,
    /// Whether the viewer owns this collection (shows edit forms)
    pub owned: bool,
    /// Whether this is the watchlist tab (shows promote forms)
    pub watchlist: bool,
}

impl CollectionPage {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchPage {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub message: Option<String>,
    pub oauth_enabled: bool,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterPage {
    pub message: Option<String>,
}
