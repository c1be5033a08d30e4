use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use teloxide::types::ChatId;

use crate::storage;
pub use crate::storage::Error;

/// Chats that receive notifications, mirrored to a JSON file of the form
/// `{"<chat id>": true}` on every change.
#[derive(Debug)]
pub struct Subscribers {
    path: PathBuf,
    chats: BTreeSet<i64>,
}

impl Subscribers {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let chats = match storage::load_json::<BTreeMap<i64, bool>>(&path).await? {
            Some(map) => map
                .into_iter()
                .filter_map(|(id, subscribed)| subscribed.then_some(id))
                .collect(),
            None => {
                log::info!("No subscriber file at {}, starting empty", path.display());
                BTreeSet::new()
            }
        };

        Ok(Self { path, chats })
    }

    /// Subscribed chats in storage order.
    pub fn list(&self) -> Vec<ChatId> {
        self.chats.iter().copied().map(ChatId).collect()
    }

    /// Returns whether the chat was newly added. The file is rewritten either way.
    pub async fn add(&mut self, chat_id: ChatId) -> Result<bool, Error> {
        let added = self.chats.insert(chat_id.0);
        if let Err(e) = self.persist().await {
            if added {
                self.chats.remove(&chat_id.0);
            }
            return Err(e);
        }
        Ok(added)
    }

    /// Returns whether the chat was subscribed before. Removing an absent
    /// chat is not an error.
    pub async fn remove(&mut self, chat_id: ChatId) -> Result<bool, Error> {
        let removed = self.chats.remove(&chat_id.0);
        if let Err(e) = self.persist().await {
            if removed {
                self.chats.insert(chat_id.0);
            }
            return Err(e);
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), Error> {
        let map: BTreeMap<i64, bool> = self.chats.iter().map(|&id| (id, true)).collect();
        storage::save_json(&self.path, &map).await
    }
}
