use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Article;

/// Explicit "save for later" entry. A record exists exactly while the article
/// is bookmarked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub bookmarked_at: DateTime<Utc>,
}

impl BookmarkRecord {
    pub fn from_article(article: &Article, bookmarked_at: DateTime<Utc>) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            author: article.author.clone(),
            content: article.content.clone(),
            url: article.url.clone(),
            image_url: article.image_url.clone(),
            published_at: article.published_at,
            bookmarked_at,
        }
    }

    pub fn into_article(self) -> Article {
        Article {
            id: self.id,
            title: self.title,
            author: self.author,
            published_at: self.published_at,
            content: self.content,
            image_url: self.image_url,
            url: self.url,
            is_bookmarked: Some(true),
            is_cached: true,
        }
    }
}
