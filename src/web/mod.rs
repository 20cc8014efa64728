use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

pub mod handlers;
pub mod state;
pub mod views;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Collection & watchlist
        .route("/", get(handlers::collection))
        .route("/watchlist", get(handlers::watchlist))
        .route("/add", post(handlers::add))
        .route("/watchlist/add", post(handlers::watchlist_add))
        .route("/update", post(handlers::update))
        .route("/delete", post(handlers::delete))
        .route("/like", post(handlers::like))
        .route("/users/:id", get(handlers::public_collection))
        // Metadata search
        .route("/search", get(handlers::search))
        // Auth
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/register", get(handlers::register_page).post(handlers::register))
        .route("/logout", get(handlers::logout))
        .route("/auth/google", get(handlers::oauth_start))
        .route("/auth/google/callback", get(handlers::oauth_callback))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
