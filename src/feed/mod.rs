//! Remote article feed.
//!
//! The core only needs [`FeedClient`]; [`NewsApiClient`] is the concrete
//! client for a NewsAPI `top-headlines` endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::{Result, TidingsError};
use crate::domain::Article;
use crate::fetcher::{Fetcher, DEFAULT_TIMEOUT_SECS};

/// Single-attempt source of fresh articles. Retries, if any, belong here and
/// not in the sync layer.
#[async_trait]
pub trait FeedClient {
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
}

/// Configuration for the remote feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Endpoint returning NewsAPI-shaped JSON
    pub endpoint: String,

    /// Country filter (default: "us")
    pub country: Option<String>,

    /// Category filter (default: "technology")
    pub category: Option<String>,

    /// API key sent as the `apiKey` query parameter
    pub api_key: Option<String>,

    /// Request timeout in seconds (default: 10)
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://newsapi.org/v2/top-headlines".to_string(),
            country: Some("us".to_string()),
            category: Some("technology".to_string()),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ArticleResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleResponse {
    title: Option<String>,
    author: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
    description: Option<String>,
    url_to_image: Option<String>,
    url: Option<String>,
}

impl ArticleResponse {
    fn into_article(self) -> Article {
        let url = self.url.unwrap_or_default();
        let published_at = self
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut article = Article::new(&url, self.title.as_deref().unwrap_or_default(), published_at);
        article.author = self.author.filter(|a| !a.trim().is_empty());
        article.content = self.content.or(self.description);
        article.image_url = self.url_to_image.filter(|u| !u.trim().is_empty());
        article
    }
}

pub struct NewsApiClient {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    config: FeedConfig,
}

impl NewsApiClient {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>, config: FeedConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn request_url(&self) -> Result<String> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(country) = self.config.country.as_deref() {
            params.push(("country", country));
        }
        if let Some(category) = self.config.category.as_deref() {
            params.push(("category", category));
        }
        if let Some(key) = self.config.api_key.as_deref() {
            params.push(("apiKey", key));
        }

        let url = Url::parse_with_params(&self.config.endpoint, &params)?;
        Ok(url.to_string())
    }

    /// Decode a response body. Entries keep whatever they carry; validation
    /// happens at ingestion so bad entries are reported, not silently dropped.
    pub fn decode(body: &[u8]) -> Result<Vec<Article>> {
        let response: NewsResponse = serde_json::from_slice(body)?;

        if response.status != "ok" {
            return Err(TidingsError::Network(format!(
                "feed returned {}: {}",
                response.code.as_deref().unwrap_or(&response.status),
                response.message.as_deref().unwrap_or("no message")
            )));
        }

        Ok(response
            .articles
            .into_iter()
            .map(ArticleResponse::into_article)
            .collect())
    }
}

#[async_trait]
impl FeedClient for NewsApiClient {
    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let url = self.request_url()?;
        let body = self.fetcher.fetch(&url).await?;
        let articles = Self::decode(&body)?;
        tracing::info!("Fetched {} articles from feed", articles.len());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const SAMPLE: &str = r#"{
      "status": "ok",
      "totalResults": 2,
      "articles": [
        {
          "source": {"id": null, "name": "Example"},
          "author": "Ferris Crab",
          "title": "Rust ships new borrow checker",
          "description": "Short description",
          "url": "https://example.com/news/1",
          "urlToImage": "https://img.example.com/1.png",
          "publishedAt": "2024-01-01T12:00:00Z",
          "content": "Full content"
        },
        {
          "source": {"id": null, "name": "Example"},
          "author": null,
          "title": "Second story",
          "description": "Only a description",
          "url": "https://example.com/news/2",
          "urlToImage": null,
          "publishedAt": "2024-01-02T08:30:00.123Z",
          "content": null
        }
      ]
    }"#;

    struct RecordingFetcher {
        urls: Mutex<Vec<String>>,
        body: Vec<u8>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(self.body.clone())
        }
    }

    #[test]
    fn test_decode_articles() {
        let articles = NewsApiClient::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Rust ships new borrow checker");
        assert_eq!(first.author.as_deref(), Some("Ferris Crab"));
        assert_eq!(first.content.as_deref(), Some("Full content"));
        assert_eq!(first.image_url.as_deref(), Some("https://img.example.com/1.png"));
        assert_eq!(first.id, Article::id_for_url("https://example.com/news/1"));
        assert_eq!(first.published_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");
        assert!(!first.is_cached);

        let second = &articles[1];
        assert_eq!(second.author, None);
        assert_eq!(second.content.as_deref(), Some("Only a description"));
        assert!(!second.has_image());
    }

    #[test]
    fn test_ids_stable_across_fetches() {
        let a = NewsApiClient::decode(SAMPLE.as_bytes()).unwrap();
        let b = NewsApiClient::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[1].id, b[1].id);
    }

    #[test]
    fn test_decode_error_status() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let err = NewsApiClient::decode(body.as_bytes()).unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("apiKeyInvalid"));
    }

    #[test]
    fn test_decode_garbage() {
        let err = NewsApiClient::decode(b"<html>").unwrap_err();
        assert!(matches!(err, TidingsError::FeedDecode(_)));
    }

    #[test]
    fn test_decode_keeps_invalid_entries_for_validation() {
        let body = r#"{"status":"ok","articles":[{"title":null,"url":"https://example.com/x"}]}"#;
        let articles = NewsApiClient::decode(body.as_bytes()).unwrap();
        assert_eq!(articles.len(), 1);
        assert!(!articles[0].is_valid());
    }

    #[tokio::test]
    async fn test_fetch_articles_builds_query() {
        let fetcher = Arc::new(RecordingFetcher {
            urls: Mutex::new(Vec::new()),
            body: SAMPLE.as_bytes().to_vec(),
        });
        let config = FeedConfig {
            api_key: Some("secret".into()),
            ..FeedConfig::default()
        };
        let client = NewsApiClient::new(fetcher.clone(), config);

        let articles = client.fetch_articles().await.unwrap();
        assert_eq!(articles.len(), 2);

        let urls = fetcher.urls.lock().unwrap();
        assert_eq!(
            urls[0],
            "https://newsapi.org/v2/top-headlines?country=us&category=technology&apiKey=secret"
        );
    }
}
