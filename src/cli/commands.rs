use chrono::Utc;
use futures::future::join_all;

use crate::app::{AppContext, Result, TidingsError};
use crate::cache::format_size;
use crate::connectivity::ConnectivityMonitor;
use crate::domain::Article;
use crate::sync::{DataSource, LoadOutcome, SyncHandle};

pub async fn load_articles(ctx: &AppContext, sync: &SyncHandle) -> Result<()> {
    println!("Loading articles...");
    let outcome = sync.load_articles().await?;
    report_load(&outcome);
    download_images(ctx, &outcome).await;
    Ok(())
}

pub async fn refresh_articles(ctx: &AppContext, sync: &SyncHandle) -> Result<()> {
    let outcome = sync.refresh_articles().await?;
    report_load(&outcome);
    download_images(ctx, &outcome).await;
    Ok(())
}

async fn download_images(ctx: &AppContext, outcome: &LoadOutcome) {
    let Some(prefetcher) = &ctx.prefetcher else {
        return;
    };
    if outcome.source != DataSource::Network {
        return;
    }

    let handles =
        prefetcher.prefetch(outcome.articles.iter().filter_map(|a| a.image_url.clone()));
    if handles.is_empty() {
        return;
    }

    println!("Downloading {} images...", handles.len());
    join_all(handles).await;
}

fn report_load(outcome: &LoadOutcome) {
    if let Some(error) = &outcome.network_error {
        eprintln!("Could not reach the feed: {}", error);
    }

    let source = match outcome.source {
        DataSource::Network => "feed",
        DataSource::Cache => "offline cache",
    };
    println!("{} articles from {}", outcome.articles.len(), source);
    print_articles(&outcome.articles);
}

pub fn list_articles(ctx: &AppContext, bookmarked: bool) -> Result<()> {
    let articles = if bookmarked {
        ctx.cache.get_bookmarked()?
    } else {
        ctx.cache.get_all()?
    };

    if articles.is_empty() {
        println!("No cached articles");
        return Ok(());
    }

    print_articles(&articles);
    Ok(())
}

pub async fn search(sync: &SyncHandle, query: &str) -> Result<()> {
    sync.refresh_articles().await?;
    let results = sync.search(query).await?;

    if results.is_empty() {
        println!("No articles");
        return Ok(());
    }

    print_articles(&results);
    Ok(())
}

pub async fn toggle_bookmark(ctx: &AppContext, sync: &SyncHandle, id: &str) -> Result<()> {
    let article = find_article(ctx, id)?;
    let title = article.title.clone();

    if sync.toggle_bookmark(article).await? {
        println!("Bookmarked: {}", title);
    } else {
        println!("Removed bookmark: {}", title);
    }
    Ok(())
}

/// Look an article up by id, or by unique id prefix, in the cache and then
/// the bookmark list.
fn find_article(ctx: &AppContext, id: &str) -> Result<Article> {
    if let Some(record) = ctx.cache.get(id)? {
        return Ok(record.into_article());
    }

    let mut candidates = ctx
        .cache
        .get_all()?
        .into_iter()
        .chain(ctx.bookmarks.list_all()?)
        .filter(|a| a.id.starts_with(id))
        .fold(Vec::<Article>::new(), |mut acc, a| {
            if !acc.iter().any(|seen| seen.id == a.id) {
                acc.push(a);
            }
            acc
        });

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(TidingsError::ArticleNotFound(id.to_string())),
        n => Err(TidingsError::Other(format!(
            "Id prefix {} is ambiguous ({} matches)",
            id, n
        ))),
    }
}

pub async fn list_bookmarks(sync: &SyncHandle) -> Result<()> {
    let bookmarks = sync.bookmarked().await?;

    if bookmarks.is_empty() {
        println!("No bookmarks");
        return Ok(());
    }

    print_articles(&bookmarks);
    Ok(())
}

pub async fn evict(ctx: &AppContext, sync: &SyncHandle, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(ctx.config.storage.eviction_days);
    let removed = sync.evict_older_than(days).await?;
    println!("Evicted {} articles older than {} days", removed, days);
    Ok(())
}

pub fn stats(ctx: &AppContext) -> Result<()> {
    let cached = ctx.cache.count()?;
    let flagged = ctx.cache.get_bookmarked()?.len();
    let bookmarks = ctx.bookmarks.count()?;
    let size = ctx.cache.size_estimate()?;

    println!("Cached articles: {} ({} bookmarked)", cached, flagged);
    println!("Bookmarks:       {}", bookmarks);
    println!("Cache size:      {}", format_size(size));
    println!("Images:          {}", ctx.blobs.dir().display());
    println!(
        "Connectivity:    {}",
        if ctx.connectivity.is_connected() {
            "online"
        } else {
            "offline"
        }
    );
    Ok(())
}

pub async fn clear(sync: &SyncHandle, bookmarks: bool) -> Result<()> {
    if bookmarks {
        sync.clear_bookmarks().await?;
        println!("Cleared all bookmarks");
    } else {
        let cleared = sync.clear_cache().await?;
        println!("Cleared {} cached articles", cleared);
    }
    Ok(())
}

fn print_articles(articles: &[Article]) {
    let now = Utc::now();
    for article in articles {
        println!("{}", format_line(article, now));
    }
}

fn format_line(article: &Article, now: chrono::DateTime<Utc>) -> String {
    let marker = if article.is_bookmarked() { "*" } else { " " };
    let short_id: String = article.id.chars().take(8).collect();
    let mut line = format!(
        "{} {} {}\n           {} - {}",
        marker,
        short_id,
        article.title,
        article.display_author(),
        article.time_ago(now)
    );

    let summary = article.short_content();
    if !summary.is_empty() {
        line.push_str("\n           ");
        line.push_str(&summary);
    }
    line
}
