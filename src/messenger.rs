use futures_core::future::BoxFuture;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};

use crate::Bot;

/// Everything the bot logic needs from the chat transport.
pub trait Messenger: Send + Sync {
    fn send_text(&self, chat_id: ChatId, text: String) -> BoxFuture<'_, Result<(), RequestError>>;

    /// Sends an HTML formatted post, optionally with an inline keyboard.
    fn send_post(
        &self,
        chat_id: ChatId,
        html: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BoxFuture<'_, Result<(), RequestError>>;

    /// Stops the loading animation on the tapped button.
    fn answer_callback(
        &self,
        query_id: String,
        text: Option<String>,
    ) -> BoxFuture<'_, Result<(), RequestError>>;

    /// Removes the inline keyboard of a message. Safe to repeat.
    fn clear_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), RequestError>>;
}

impl Messenger for Bot {
    fn send_text(&self, chat_id: ChatId, text: String) -> BoxFuture<'_, Result<(), RequestError>> {
        Box::pin(async move { self.send_message(chat_id, text).await.map(|_| ()) })
    }

    fn send_post(
        &self,
        chat_id: ChatId,
        html: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        Box::pin(async move {
            let request = self.send_message(chat_id, html).parse_mode(ParseMode::Html);
            match keyboard {
                Some(keyboard) => request.reply_markup(keyboard).await,
                None => request.await,
            }
            .map(|_| ())
        })
    }

    fn answer_callback(
        &self,
        query_id: String,
        text: Option<String>,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        Box::pin(async move {
            let request = self.answer_callback_query(query_id);
            match text {
                Some(text) => request.text(text).await,
                None => request.await,
            }
            .map(|_| ())
        })
    }

    fn clear_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> BoxFuture<'_, Result<(), RequestError>> {
        Box::pin(async move {
            match self.edit_message_reply_markup(chat_id, message_id).await {
                Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
                Err(e) => Err(e),
            }
        })
    }
}
