use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::{
    auth::{AuthGateway, GoogleOAuth},
    db::{CollectionStore, UserStore},
    services::{MetadataSearch, Reconciler},
};

/// Shared application state
///
/// Collaborators sit behind trait objects so tests can swap in mocks and
/// in-memory fakes without touching the router.
#[derive(Clone)]
pub struct AppState {
    pub engine: Reconciler,
    pub auth: AuthGateway,
    pub users: Arc<dyn UserStore>,
    pub metadata: Arc<dyn MetadataSearch>,
    pub oauth: Option<Arc<GoogleOAuth>>,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(
        collection: Arc<dyn CollectionStore>,
        users: Arc<dyn UserStore>,
        metadata: Arc<dyn MetadataSearch>,
        oauth: Option<GoogleOAuth>,
        cookie_key: Key,
    ) -> Self {
        Self {
            engine: Reconciler::new(collection),
            auth: AuthGateway::new(users.clone()),
            users,
            metadata,
            oauth: oauth.map(Arc::new),
            cookie_key,
        }
    }
}

/// Lets `SignedCookieJar` pull its key straight out of the state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}
