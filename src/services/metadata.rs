/// TMDB metadata client
///
/// Wraps the `/search/multi` endpoint and collapses its heterogeneous
/// movie/TV result shapes into `SearchResult`. Entries that are neither
/// movie nor TV, or that carry no poster, are dropped before rendering.
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{SearchResult, TmdbEntry},
};

/// Seam for the external metadata API
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataSearch: Send + Sync {
    /// Search movies and TV shows by free-text query
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>>;
}

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_token: String,
    api_url: String,
    image_url: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

impl TmdbClient {
    pub fn new(api_token: String, api_url: String, image_url: String, language: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_token,
            api_url,
            image_url,
            language,
        }
    }
}

#[async_trait::async_trait]
impl MetadataSearch for TmdbClient {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let url = format!("{}/search/multi", self.api_url);

        // Single bounded attempt, first page only; a slow or failed
        // upstream degrades to an inline error, never a retry loop.
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[
                ("query", query),
                ("include_adult", "false"),
                ("language", self.language.as_str()),
                ("page", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB returned status {}: {}",
                status, body
            )));
        }

        let search_response: SearchResponse = response.json().await?;

        let results: Vec<SearchResult> = search_response
            .results
            .into_iter()
            .filter_map(|value| serde_json::from_value::<TmdbEntry>(value).ok())
            .filter_map(|entry| entry.normalize(&self.image_url))
            .collect();

        tracing::info!(
            query = %query,
            results = results.len(),
            provider = "tmdb",
            "metadata search completed"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;

    fn parse_results(json: &str) -> Vec<SearchResult> {
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        response
            .results
            .into_iter()
            .filter_map(|value| serde_json::from_value::<TmdbEntry>(value).ok())
            .filter_map(|entry| entry.normalize("https://image.tmdb.org/t/p/original"))
            .collect()
    }

    #[test]
    fn search_payload_keeps_only_posterful_movies_and_tv() {
        let json = r#"{
            "page": 1,
            "results": [
                {"media_type": "movie", "title": "The Batman",
                 "overview": "Gotham", "poster_path": "/batman.jpg",
                 "release_date": "2022-03-04"},
                {"media_type": "tv", "name": "Batman: The Animated Series",
                 "overview": "Animated", "poster_path": "/tas.jpg",
                 "first_air_date": "1992-09-05"},
                {"media_type": "movie", "title": "Posterless Batman",
                 "overview": "No art", "poster_path": null},
                {"media_type": "person", "name": "Christian Bale",
                 "profile_path": "/bale.jpg"}
            ]
        }"#;

        let results = parse_results(json);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "The Batman");
        assert_eq!(results[0].media_type, MediaType::Movie);
        assert_eq!(results[1].title, "Batman: The Animated Series");
        assert_eq!(results[1].media_type, MediaType::Tv);
        assert!(results
            .iter()
            .all(|r| r.poster_url.starts_with("https://image.tmdb.org")));
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let json = r#"{
            "results": [
                {"media_type": 42},
                {"media_type": "movie", "title": "Dune",
                 "poster_path": "/dune.jpg", "release_date": "2021-09-15"}
            ]
        }"#;

        let results = parse_results(json);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Dune");
    }

    #[test]
    fn empty_results_array_is_fine() {
        assert!(parse_results(r#"{"results": []}"#).is_empty());
        // TMDB always sends `results`, but a missing array defaults empty
        assert!(parse_results(r#"{"page": 1}"#).is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected_without_a_request() {
        let client = TmdbClient::new(
            "token".to_string(),
            "http://tmdb.invalid".to_string(),
            "http://img.invalid".to_string(),
            "en-US".to_string(),
        );
        let err = client.search("   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
