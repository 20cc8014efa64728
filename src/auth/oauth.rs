/// Google OAuth login
///
/// Plain authorization-code flow: redirect to Google's consent screen,
/// exchange the returned code for an access token, then read the userinfo
/// endpoint. CSRF state is generated here and carried in a signed cookie by
/// the web layer.
use reqwest::{Client as HttpClient, Url};
use serde::Deserialize;

use crate::{
    config::Config,
    error::{AppError, AppResult},
};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Identity fields consumed from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub email: String,
    pub display_name: String,
    pub picture_url: Option<String>,
}

#[derive(Clone)]
pub struct GoogleOAuth {
    http_client: HttpClient,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleOAuth {
    /// Returns `None` unless all three OAuth settings are configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let client_id = config.google_client_id.clone()?;
        let client_secret = config.google_client_secret.clone()?;
        let redirect_uri = config.google_redirect_uri.clone()?;

        Some(Self {
            http_client: HttpClient::new(),
            client_id,
            client_secret,
            redirect_uri,
        })
    }

    /// Fresh CSRF state for one authorization round-trip
    pub fn generate_state() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// The consent-screen URL the browser is redirected to
    pub fn authorize_url(&self, state: &str) -> String {
        // parse_with_params only fails on a malformed base, and the base
        // here is a static, valid URL
        let url = Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .expect("static endpoint URL");

        url.to_string()
    }

    /// Exchange the callback code for the user's profile
    pub async fn exchange_code(&self, code: &str) -> AppResult<OAuthProfile> {
        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "OAuth token exchange returned status {status}"
            )));
        }

        let token: TokenResponse = response.json().await?;

        let response = self
            .http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "OAuth userinfo returned status {status}"
            )));
        }

        let info: UserInfo = response.json().await?;
        profile_from_userinfo(info)
    }
}

fn profile_from_userinfo(info: UserInfo) -> AppResult<OAuthProfile> {
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::ExternalApi("OAuth profile carries no email".to_string()))?;

    let display_name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

    Ok(OAuthProfile {
        email,
        display_name,
        picture_url: info.picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_client_and_state() {
        let oauth = GoogleOAuth {
            http_client: HttpClient::new(),
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/auth/google/callback".to_string(),
        };

        let url = Url::parse(&oauth.authorize_url("csrf-state")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("client_id".to_string(), "client-123".to_string())));
        assert!(pairs.contains(&("state".to_string(), "csrf-state".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
    }

    #[test]
    fn profile_requires_an_email() {
        let err = profile_from_userinfo(UserInfo {
            email: None,
            name: Some("Ada".to_string()),
            picture: None,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::ExternalApi(_)));
    }

    #[test]
    fn profile_display_name_falls_back_to_email_prefix() {
        let profile = profile_from_userinfo(UserInfo {
            email: Some("ada@example.com".to_string()),
            name: None,
            picture: Some("http://img.example/ada.png".to_string()),
        })
        .unwrap();

        assert_eq!(profile.display_name, "ada");
        assert_eq!(profile.picture_url.as_deref(), Some("http://img.example/ada.png"));
    }
}
