use std::collections::{HashMap, HashSet};

use crate::domain::Article;

/// Collapse duplicate ids. The last occurrence wins and takes the position of
/// the first, so the result is deterministic for a given input order.
pub fn dedup_by_id(articles: Vec<Article>) -> Vec<Article> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(articles.len());
    let mut unique: Vec<Article> = Vec::with_capacity(articles.len());

    for article in articles {
        match positions.get(&article.id) {
            Some(&index) => unique[index] = article,
            None => {
                positions.insert(article.id.clone(), unique.len());
                unique.push(article);
            }
        }
    }

    unique
}

/// The in-memory collection behind the read side: the full set plus an
/// optional search filter over it.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    all: Vec<Article>,
    filtered: Vec<Article>,
    query: String,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full set and re-apply the active query to it.
    pub fn replace(&mut self, articles: Vec<Article>) {
        self.all = dedup_by_id(articles);
        let query = std::mem::take(&mut self.query);
        self.search(&query);
    }

    /// Filter by case-insensitive substring on title or author. An empty
    /// query clears the filter.
    pub fn search(&mut self, query: &str) -> &[Article] {
        self.query = query.to_string();
        if query.is_empty() {
            self.filtered.clear();
        } else {
            let needle = query.to_lowercase();
            self.filtered = self
                .all
                .iter()
                .filter(|a| a.matches(&needle))
                .cloned()
                .collect();
        }
        self.effective()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn all(&self) -> &[Article] {
        &self.all
    }

    /// The filtered set when it has entries, otherwise the full set. A query
    /// that matches nothing therefore looks the same as no query.
    pub fn effective(&self) -> &[Article] {
        if self.filtered.is_empty() {
            &self.all
        } else {
            &self.filtered
        }
    }

    pub fn find(&self, id: &str) -> Option<&Article> {
        self.all.iter().find(|a| a.id == id)
    }

    /// Set the bookmark flag in both the full and the filtered copy.
    /// Returns false when the id is not in the working set.
    pub fn set_bookmarked(&mut self, id: &str, bookmarked: bool) -> bool {
        let mut found = false;
        for article in self.all.iter_mut().chain(self.filtered.iter_mut()) {
            if article.id == id {
                article.is_bookmarked = Some(bookmarked);
                found = true;
            }
        }
        found
    }

    /// Overwrite every flag from the authoritative bookmark id set.
    pub fn sync_bookmarks(&mut self, bookmarked: &HashSet<String>) {
        for article in self.all.iter_mut().chain(self.filtered.iter_mut()) {
            article.is_bookmarked = Some(bookmarked.contains(&article.id));
        }
    }

    /// Mark the given ids as no longer cached. Returns how many articles in
    /// the full set were affected.
    pub fn uncache(&mut self, ids: &HashSet<String>) -> usize {
        for article in self.filtered.iter_mut() {
            if ids.contains(&article.id) {
                article.is_cached = false;
            }
        }

        let mut affected = 0;
        for article in self.all.iter_mut() {
            if ids.contains(&article.id) {
                article.is_cached = false;
                affected += 1;
            }
        }
        affected
    }

    pub fn set_cached(&mut self, cached: bool) {
        for article in self.all.iter_mut().chain(self.filtered.iter_mut()) {
            article.is_cached = cached;
        }
    }
}
