use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use tracing_subscriber::EnvFilter;

use reelshelf::{
    auth::GoogleOAuth,
    config::Config,
    db::{self, PgCollectionStore, PgUserStore},
    services::TmdbClient,
    web::{create_router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::postgres::run_migrations(&pool).await?;

    let metadata = TmdbClient::new(
        config.tmdb_api_token.clone(),
        config.tmdb_api_url.clone(),
        config.tmdb_image_url.clone(),
        config.search_language.clone(),
    );

    let oauth = GoogleOAuth::from_config(&config);
    if oauth.is_none() {
        tracing::info!("Google OAuth not configured; password login only");
    }

    let state = AppState::new(
        Arc::new(PgCollectionStore::new(pool.clone())),
        Arc::new(PgUserStore::new(pool)),
        Arc::new(metadata),
        oauth,
        Key::derive_from(config.session_secret.as_bytes()),
    );

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
