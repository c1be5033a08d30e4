use teloxide::types::{CallbackQuery, ChatId, MessageId};
use teloxide::RequestError;

use crate::messages;
use crate::messenger::Messenger;
use crate::prompt::CallbackToken;
use crate::scanner::{self, Scanner};

/// The parts of a callback query the handler needs.
#[derive(Debug, Clone)]
pub struct ButtonTap {
    pub query_id: String,
    pub data: Option<String>,
    pub chat_id: ChatId,
    /// `None` when the prompt is too old to be accessible.
    pub message_id: Option<MessageId>,
}

impl From<&CallbackQuery> for ButtonTap {
    fn from(query: &CallbackQuery) -> Self {
        let (chat_id, message_id) = match &query.message {
            Some(message) => (message.chat().id, Some(message.id())),
            None => (ChatId::from(query.from.id), None),
        };

        Self {
            query_id: query.id.clone(),
            data: query.data.clone(),
            chat_id,
            message_id,
        }
    }
}

/// Records the decision of a tapped prompt button, then acknowledges the tap,
/// removes the prompt's buttons and confirms the new state in the chat.
pub async fn handle_tap(
    messenger: &dyn Messenger,
    scanner: &dyn Scanner,
    tap: ButtonTap,
) -> Result<(), RequestError> {
    let token = match tap.data.as_deref().unwrap_or_default().parse::<CallbackToken>() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("Invalid callback data {:?}: {e}", tap.data);
            return messenger
                .answer_callback(tap.query_id, Some(messages::invalid_button()))
                .await;
        }
    };

    let interested = token.decision.interested();
    log::info!("Post {} marked as interested: {interested}", token.post_id);

    if let Err(e) = scanner
        .mark_post_as_interested(&token.post_id, interested)
        .await
    {
        let reply = match e {
            scanner::Error::UnknownPost(_) => messages::unknown_post(),
            e => {
                log::error!("Couldn't update post {}: {e}", token.post_id);
                messages::internal_error()
            }
        };
        return messenger.answer_callback(tap.query_id, Some(reply)).await;
    }

    messenger.answer_callback(tap.query_id, None).await?;

    if let Some(message_id) = tap.message_id {
        if let Err(e) = messenger.clear_buttons(tap.chat_id, message_id).await {
            log::warn!("Couldn't remove buttons of message {message_id:?}: {e}");
        }
    }

    messenger
        .send_text(tap.chat_id, messages::interest_updated(interested))
        .await
}
