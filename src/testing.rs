//! In-memory stand-ins for the scanner backend and the chat transport.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use futures_core::future::BoxFuture;
use teloxide::types::{ChatId, InlineKeyboardButtonKind, InlineKeyboardMarkup, MessageId};
use teloxide::{ApiError, RequestError};

use crate::messenger::Messenger;
use crate::scanner::{format_timestamp, Error, Post, Scanner};

pub fn post(id: &str, title: &str) -> Post {
    Post {
        id: id.to_string(),
        title: title.to_string(),
        body: String::new(),
        over_18: false,
        location: None,
        age: None,
        flair: None,
        author: "someone".to_string(),
        permalink: None,
        created_utc: "2024-05-01 12:00:00".to_string(),
        notified: false,
        interested: None,
    }
}

#[derive(Default)]
pub struct MemoryScanner {
    pub posts: Mutex<Vec<Post>>,
    /// Every `mark_post_as_notified` call, in order.
    pub notified_calls: Mutex<Vec<String>>,
    pub windows: Mutex<Vec<String>>,
}

impl MemoryScanner {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: Mutex::new(posts),
            ..Default::default()
        }
    }

    pub fn find(&self, id: &str) -> Option<Post> {
        self.posts.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Post)) -> Result<(), Error> {
        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::UnknownPost(id.to_string()))?;
        f(post);
        Ok(())
    }

    fn select(&self, since: NaiveDateTime, f: impl Fn(&Post) -> bool) -> Vec<Post> {
        let since = format_timestamp(since);
        self.windows.lock().unwrap().push(since.clone());
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.created_utc >= since && f(p))
            .cloned()
            .collect()
    }
}

impl Scanner for MemoryScanner {
    fn scan(&self) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        let posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.notified)
            .cloned()
            .collect();
        Box::pin(async move { Ok(posts) })
    }

    fn mark_post_as_notified<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        self.notified_calls.lock().unwrap().push(post_id.to_string());
        let result = self.update(post_id, |p| p.notified = true);
        Box::pin(async move { result })
    }

    fn mark_post_as_interested<'a>(
        &'a self,
        post_id: &'a str,
        interested: bool,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let result = self.update(post_id, |p| p.interested = Some(interested));
        Box::pin(async move { result })
    }

    fn get_unmarked_posts(&self, since: NaiveDateTime) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        let posts = self.select(since, |p| !p.notified);
        Box::pin(async move { Ok(posts) })
    }

    fn get_interested_posts(
        &self,
        since: NaiveDateTime,
    ) -> BoxFuture<'_, Result<Vec<Post>, Error>> {
        let posts = self.select(since, |p| p.interested == Some(true));
        Box::pin(async move { Ok(posts) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: ChatId,
    pub text: String,
    /// Callback data of the attached buttons, if any.
    pub buttons: Vec<String>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<Sent>>,
    pub answered: Mutex<Vec<(String, Option<String>)>>,
    pub cleared: Mutex<Vec<(ChatId, MessageId)>>,
    /// Chats that behave as if they blocked the bot.
    pub blocked: HashSet<ChatId>,
}

impl RecordingMessenger {
    pub fn blocking(chats: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            blocked: chats.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id == chat_id)
            .map(|s| s.text)
            .collect()
    }

    fn record(&self, chat_id: ChatId, text: String, buttons: Vec<String>) -> Result<(), RequestError> {
        if self.blocked.contains(&chat_id) {
            return Err(RequestError::Api(ApiError::BotBlocked));
        }
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            text,
            buttons,
        });
        Ok(())
    }
}

impl Messenger for RecordingMessenger {
    fn send_text(&self, chat_id: ChatId, text: String) -> BoxFuture<'_, Result<(), RequestError>> {
        let result = self.record(chat_id, text, Vec::new());
        Box::pin(async move { result })
    }

    fn send_post(
        &self,
        chat_id: ChatId,
        html: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        let buttons = keyboard
            .into_iter()
            .flat_map(|k| k.inline_keyboard.into_iter().flatten())
            .filter_map(|b| match b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data),
                _ => None,
            })
            .collect();
        let result = self.record(chat_id, html, buttons);
        Box::pin(async move { result })
    }

    fn answer_callback(
        &self,
        query_id: String,
        text: Option<String>,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        self.answered.lock().unwrap().push((query_id, text));
        Box::pin(async { Ok(()) })
    }

    fn clear_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        self.cleared.lock().unwrap().push((chat_id, message_id));
        Box::pin(async { Ok(()) })
    }
}
