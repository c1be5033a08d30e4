pub mod sqlite;

use chrono::NaiveDateTime;
use futures_core::future::BoxFuture;
use thiserror::Error;

use crate::messages;

pub use sqlite::SqliteScanner;

/// Text format of every timestamp exchanged with a scanner backend.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unknown post {0}")]
    UnknownPost(String),
}

/// A post owned by the scanning backend. The bot only reads it and flips
/// `notified` / `interested` through the [`Scanner`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub over_18: bool,
    pub location: Option<String>,
    pub age: Option<i64>,
    pub flair: Option<String>,
    pub author: String,
    pub permalink: Option<String>,
    pub created_utc: String,
    pub notified: bool,
    pub interested: Option<bool>,
}

/// Source of posts to notify about.
///
/// Filtering and deduplication live entirely behind this trait: the bot
/// relies on `get_unmarked_posts` and `scan` skipping posts that were passed
/// to `mark_post_as_notified`.
pub trait Scanner: Send + Sync + 'static {
    /// Posts to notify about in this cycle, in delivery order.
    fn scan(&self) -> BoxFuture<'_, Result<Vec<Post>, Error>>;

    fn get_post_message(&self, post: &Post) -> String {
        messages::post(post)
    }

    fn mark_post_as_notified<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    fn mark_post_as_interested<'a>(
        &'a self,
        post_id: &'a str,
        interested: bool,
    ) -> BoxFuture<'a, Result<(), Error>>;

    /// Posts created at or after `since` that were never notified.
    fn get_unmarked_posts(&self, since: NaiveDateTime) -> BoxFuture<'_, Result<Vec<Post>, Error>>;

    /// Posts created at or after `since` that were marked as interesting.
    fn get_interested_posts(
        &self,
        since: NaiveDateTime,
    ) -> BoxFuture<'_, Result<Vec<Post>, Error>>;
}
