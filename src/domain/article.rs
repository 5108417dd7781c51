use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

const SHORT_CONTENT_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Article ID is required")]
    MissingId,

    #[error("Article title is required")]
    MissingTitle,

    #[error("Article URL is required")]
    MissingUrl,

    #[error("Article URL is not valid: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub url: String,
    /// Unset means the source never said; only `Some(true)` counts as bookmarked.
    pub is_bookmarked: Option<bool>,
    pub is_cached: bool,
}

impl Article {
    pub fn new(url: &str, title: &str, published_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::id_for_url(url),
            title: title.to_string(),
            author: None,
            published_at,
            content: None,
            image_url: None,
            url: url.to_string(),
            is_bookmarked: Some(false),
            is_cached: false,
        }
    }

    /// Generate a deterministic ID from the article's canonical URL.
    ///
    /// The canonical form is the parsed URL without its fragment, so
    /// `https://Example.com/a#top` and `https://example.com/a` share an ID.
    /// Unparseable input is hashed as given (trimmed) so ID generation never
    /// fails; validation reports the bad URL separately.
    pub fn id_for_url(url: &str) -> String {
        let canonical = match Url::parse(url.trim()) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.trim().to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        Url::parse(&self.url).map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", self.url, e)))?;
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn is_bookmarked(&self) -> bool {
        self.is_bookmarked == Some(true)
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn display_author(&self) -> &str {
        self.author.as_deref().unwrap_or("Unknown")
    }

    /// First 150 characters of the content, with an ellipsis when truncated.
    pub fn short_content(&self) -> String {
        let Some(content) = self.content.as_deref() else {
            return String::new();
        };
        if content.chars().count() > SHORT_CONTENT_CHARS {
            let prefix: String = content.chars().take(SHORT_CONTENT_CHARS).collect();
            format!("{}...", prefix)
        } else {
            content.to_string()
        }
    }

    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.published_at);
        if elapsed.num_seconds() < 3600 {
            format!("{} minutes ago", elapsed.num_minutes().max(0))
        } else if elapsed.num_seconds() < 86400 {
            format!("{} hours ago", elapsed.num_hours())
        } else {
            format!("{} days ago", elapsed.num_days())
        }
    }

    /// Case-insensitive substring match on title or author.
    pub fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self
                .author
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(needle_lower))
    }
}

/// An article as persisted in the offline cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArticle {
    pub article: Article,
    /// Set on first persist, never touched by later updates.
    pub cached_at: DateTime<Utc>,
    /// Set whenever the flag becomes true; stale once the flag is cleared.
    pub bookmarked_at: Option<DateTime<Utc>>,
}

impl CachedArticle {
    pub fn into_article(self) -> Article {
        self.article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Article {
        Article::new("https://example.com/news/1", "Rust 2.0 released", Utc::now())
    }

    #[test]
    fn test_id_generation_deterministic() {
        let id1 = Article::id_for_url("https://example.com/news/1");
        let id2 = Article::id_for_url("https://example.com/news/1");
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_id_ignores_fragment_and_host_case() {
        let plain = Article::id_for_url("https://example.com/news/1");
        assert_eq!(plain, Article::id_for_url("https://EXAMPLE.com/news/1#comments"));
        assert_ne!(plain, Article::id_for_url("https://example.com/news/2"));
    }

    #[test]
    fn test_id_is_hex_sha256() {
        let id = Article::id_for_url("https://example.com/news/1");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut article = sample();
        article.id.clear();
        assert_eq!(article.validate(), Err(ValidationError::MissingId));

        let mut article = sample();
        article.title = "   ".into();
        assert_eq!(article.validate(), Err(ValidationError::MissingTitle));

        let mut article = sample();
        article.url.clear();
        assert_eq!(article.validate(), Err(ValidationError::MissingUrl));
    }

    #[test]
    fn test_validate_invalid_url() {
        let mut article = sample();
        article.url = "not a url".into();
        assert!(matches!(article.validate(), Err(ValidationError::InvalidUrl(_))));
        assert!(!article.is_valid());
    }

    #[test]
    fn test_bookmark_tri_state() {
        let mut article = sample();
        article.is_bookmarked = None;
        assert!(!article.is_bookmarked());
        article.is_bookmarked = Some(false);
        assert!(!article.is_bookmarked());
        article.is_bookmarked = Some(true);
        assert!(article.is_bookmarked());
    }

    #[test]
    fn test_short_content_truncates() {
        let mut article = sample();
        article.content = Some("a".repeat(200));
        let short = article.short_content();
        assert_eq!(short.len(), 153);
        assert!(short.ends_with("..."));

        article.content = Some("brief".into());
        assert_eq!(article.short_content(), "brief");

        article.content = None;
        assert_eq!(article.short_content(), "");
    }

    #[test]
    fn test_time_ago_buckets() {
        let now = Utc::now();
        let mut article = sample();

        article.published_at = now - Duration::minutes(5);
        assert_eq!(article.time_ago(now), "5 minutes ago");

        article.published_at = now - Duration::hours(3);
        assert_eq!(article.time_ago(now), "3 hours ago");

        article.published_at = now - Duration::days(2);
        assert_eq!(article.time_ago(now), "2 days ago");
    }

    #[test]
    fn test_has_image() {
        let mut article = sample();
        assert!(!article.has_image());
        article.image_url = Some(String::new());
        assert!(!article.has_image());
        article.image_url = Some("https://example.com/a.png".into());
        assert!(article.has_image());
    }

    #[test]
    fn test_matches_title_or_author() {
        let mut article = sample();
        article.author = Some("Ferris Crab".into());
        assert!(article.matches("rust"));
        assert!(article.matches("ferris"));
        assert!(!article.matches("gopher"));
    }
}
