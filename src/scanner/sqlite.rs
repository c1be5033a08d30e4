use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures_core::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{query, query_as};
use tokio::sync::Mutex;

use super::{format_timestamp, Error, Post, Scanner};
use crate::scan_params::ScanParams;

const KEYWORDS_PARAM: &str = "keywords";
const MAX_POSTS_PARAM: &str = "max_posts";

/// Reads posts from the `posts` table that an external scraper fills.
#[derive(Clone)]
pub struct SqliteScanner {
    pool: SqlitePool,
    params: Arc<Mutex<ScanParams>>,
}

impl SqliteScanner {
    pub async fn connect(database_url: &str, params: Arc<Mutex<ScanParams>>) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool, params).await
    }

    pub async fn with_pool(pool: SqlitePool, params: Arc<Mutex<ScanParams>>) -> Result<Self, Error> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool, params })
    }

    async fn pending_posts(&self) -> Result<Vec<Post>, Error> {
        let (keywords, limit) = {
            let params = self.params.lock().await;
            let keywords: Vec<String> = params
                .list(KEYWORDS_PARAM)
                .unwrap_or_default()
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect();
            let limit = params.int(MAX_POSTS_PARAM).filter(|&n| n > 0);
            (keywords, limit)
        };

        let posts: Vec<Post> =
            query_as("SELECT * FROM posts WHERE notified = 0 ORDER BY created_utc, id")
                .fetch_all(&self.pool)
                .await?;

        let matching = posts.into_iter().filter(|post| {
            if keywords.is_empty() {
                return true;
            }
            let title = post.title.to_lowercase();
            let body = post.body.to_lowercase();
            keywords
                .iter()
                .any(|k| title.contains(k.as_str()) || body.contains(k.as_str()))
        });

        let posts = match limit {
            Some(n) => matching.take(n as usize).collect(),
            None => matching.collect(),
        };

        Ok(posts)
    }

    async fn set_notified(&self, post_id: &str) -> Result<(), Error> {
        let updated = query("UPDATE posts SET notified = 1 WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::UnknownPost(post_id.to_string()));
        }
        Ok(())
    }

    async fn set_interested(&self, post_id: &str, interested: bool) -> Result<(), Error> {
        let updated = query("UPDATE posts SET interested = ? WHERE id = ?")
            .bind(interested)
            .bind(post_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::UnknownPost(post_id.to_string()));
        }
        Ok(())
    }

    async fn posts_since(&self, condition: &str, since: NaiveDateTime) -> Result<Vec<Post>, Error> {
        let sql = format!(
            "SELECT * FROM posts WHERE {condition} AND created_utc >= ? ORDER BY created_utc, id"
        );
        let posts = query_as(&sql)
            .bind(format_timestamp(since))
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }
}

impl Scanner for SqliteScanner {
    fn scan(&self) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        Box::pin(self.pending_posts())
    }

    fn mark_post_as_notified<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.set_notified(post_id))
    }

    fn mark_post_as_interested<'a>(
        &'a self,
        post_id: &'a str,
        interested: bool,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.set_interested(post_id, interested))
    }

    fn get_unmarked_posts(&self, since: NaiveDateTime) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        Box::pin(self.posts_since("notified = 0", since))
    }

    fn get_interested_posts(
        &self,
        since: NaiveDateTime,
    ) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        Box::pin(self.posts_since("interested = 1", since))
    }
}
