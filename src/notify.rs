use std::sync::Arc;

use teloxide::types::ChatId;
use teloxide::RequestError;
use tokio::sync::{Mutex, MutexGuard};

use crate::messenger::Messenger;
use crate::prompt;
use crate::scanner::{self, Post, Scanner};
use crate::subscribers::Subscribers;

/// Sends `post` to `chat_id` with the Yes/No buttons attached.
pub async fn send_prompt(
    messenger: &dyn Messenger,
    scanner: &dyn Scanner,
    chat_id: ChatId,
    post: &Post,
) -> Result<(), RequestError> {
    let msg = scanner.get_post_message(post);
    messenger
        .send_post(chat_id, msg, Some(prompt::keyboard(&post.id)))
        .await?;
    log::debug!("Notification sent to {chat_id} about: {}", post.title);
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub posts: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Posts left unmarked so the next cycle offers them again.
    pub skipped: usize,
}

/// Runs scan → fan-out → mark-notified cycles. At most one cycle runs at a time.
pub struct Notifier {
    scanner: Arc<dyn Scanner>,
    subscribers: Arc<Mutex<Subscribers>>,
    running: Mutex<()>,
}

impl Notifier {
    pub fn new(scanner: Arc<dyn Scanner>, subscribers: Arc<Mutex<Subscribers>>) -> Self {
        Self {
            scanner,
            subscribers,
            running: Mutex::new(()),
        }
    }

    /// Waits for a running cycle to finish. No cycle starts while the guard is held.
    pub async fn pause(&self) -> MutexGuard<'_, ()> {
        self.running.lock().await
    }

    /// Each scanned post is offered to every subscriber, then marked as
    /// notified before the next post is sent. A failed delivery only affects
    /// that one (subscriber, post) pair. A post nobody could receive stays
    /// unmarked.
    pub async fn run_cycle(&self, messenger: &dyn Messenger) -> Result<CycleReport, scanner::Error> {
        let _running = self.running.lock().await;

        log::info!("Scanning for new posts");
        let posts = self.scanner.scan().await?;
        let subscribers = self.subscribers.lock().await.list();
        log::info!(
            "Sending {} posts to {} subscribers",
            posts.len(),
            subscribers.len()
        );

        let mut report = CycleReport {
            posts: posts.len(),
            ..Default::default()
        };

        for post in &posts {
            if !prompt::fits_callback_data(&post.id) {
                log::error!("Post id {} is too long for prompt buttons, skipping", post.id);
                report.skipped += 1;
                continue;
            }

            let mut delivered = 0;
            for &chat_id in &subscribers {
                match send_prompt(messenger, self.scanner.as_ref(), chat_id, post).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        log::warn!("Couldn't send post {} to {chat_id}: {e}", post.id);
                        report.failed += 1;
                    }
                }
            }
            report.delivered += delivered;

            if delivered == 0 && !subscribers.is_empty() {
                log::warn!("Post {} reached nobody, keeping it for the next cycle", post.id);
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.scanner.mark_post_as_notified(&post.id).await {
                log::error!("Couldn't mark post {} as notified: {e}", post.id);
            }
        }

        log::info!(
            "Cycle finished: {} posts, {} delivered, {} failed, {} skipped",
            report.posts,
            report.delivered,
            report.failed,
            report.skipped
        );
        Ok(report)
    }
}
