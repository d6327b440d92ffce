//! Outbound chat operations, behind a trait so the workflow can be driven
//! without Telegram.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use telegram_api::{
    AnswerCallbackQueryRequest, EditMessageTextRequest, InlineKeyboardButton, InlineKeyboardMarkup,
    SendMessageRequest, TelegramClient,
};

use crate::action::Action;
use crate::error::Result;
use crate::session::{ChatId, MessageRef};

/// Dedupe entries kept before the cache is reset.
const EDIT_CACHE_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// Text is HTML formatted.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn send_message(&self, chat: ChatId, text: &str, keyboard: Option<&Keyboard>) -> Result<MessageRef>;

    async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<()>;

    async fn delete_message(&self, message: MessageRef) -> Result<()>;

    async fn answer_button(&self, callback_id: &str, text: Option<&str>, alert: bool) -> Result<()>;
}

pub struct TelegramTransport {
    client: TelegramClient,
    /// Hash of the last content written to each message.
    last_edit: Mutex<HashMap<MessageRef, u64>>,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient) -> Self {
        Self {
            client,
            last_edit: Mutex::new(HashMap::new()),
        }
    }

    /// Record `fingerprint` for `message`; false if it was already current.
    fn remember(&self, message: MessageRef, fingerprint: u64) -> bool {
        let mut cache = self.last_edit.lock().unwrap_or_else(|e| e.into_inner());
        if cache.get(&message) == Some(&fingerprint) {
            return false;
        }
        if cache.len() >= EDIT_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(message, fingerprint);
        true
    }

    fn forget(&self, message: MessageRef) {
        self.last_edit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&message);
    }
}

fn markup(keyboard: Option<&Keyboard>) -> Option<InlineKeyboardMarkup> {
    keyboard.map(|rows| InlineKeyboardMarkup {
        inline_keyboard: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton {
                        text: b.label.clone(),
                        callback_data: Some(b.action.to_string()),
                        url: None,
                    })
                    .collect()
            })
            .collect(),
    })
}

fn fingerprint(text: &str, keyboard: Option<&Keyboard>) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    keyboard.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, chat: ChatId, text: &str, keyboard: Option<&Keyboard>) -> Result<MessageRef> {
        let sent = self
            .client
            .send_message(&SendMessageRequest {
                chat_id: chat,
                text: text.to_string(),
                parse_mode: Some("HTML".into()),
                reply_markup: markup(keyboard),
            })
            .await?;

        let message = MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        };
        self.remember(message, fingerprint(text, keyboard));
        Ok(message)
    }

    async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let print = fingerprint(text, keyboard);
        if !self.remember(message, print) {
            return Ok(());
        }

        let result = self
            .client
            .edit_message_text(&EditMessageTextRequest {
                chat_id: message.chat_id,
                message_id: message.message_id,
                text: text.to_string(),
                parse_mode: Some("HTML".into()),
                reply_markup: markup(keyboard),
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => {
                self.forget(message);
                Err(e.into())
            }
        }
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.forget(message);
        match self
            .client
            .delete_message(message.chat_id, message.message_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_message_gone() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn answer_button(&self, callback_id: &str, text: Option<&str>, alert: bool) -> Result<()> {
        self.client
            .answer_callback_query(&AnswerCallbackQueryRequest {
                callback_query_id: callback_id.to_string(),
                text: text.map(str::to_string),
                show_alert: alert,
            })
            .await?;
        Ok(())
    }
}
