//! Typed Rust client for the Telegram Bot API.
//!
//! Covers the subset needed by a conversational bot that edits a single
//! prompt message in place: updates (long polling and webhook), messages
//! (send, edit, delete) and callback query answers.

mod types;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use types::*;

const BASE_URL: &str = "https://api.telegram.org";

/// Extra slack on top of the long-poll timeout before reqwest gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram {method} returned {status}: {description}")]
    Api {
        method: &'static str,
        status: reqwest::StatusCode,
        description: String,
    },
}

impl Error {
    /// Telegram rejects edits whose text and markup equal the current content.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Error::Api { description, .. } if description.contains("message is not modified"))
    }

    /// The message was already deleted or is too old to be touched.
    pub fn is_message_gone(&self) -> bool {
        matches!(
            self,
            Error::Api { description, .. }
                if description.contains("message to delete not found")
                    || description.contains("message to edit not found")
                    || description.contains("message can't be deleted")
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Telegram Bot HTTP API.
#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{BASE_URL}/bot{}/{method}", self.token)
    }

    async fn call<B, T>(&self, method: &'static str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.http.post(self.url(method)).json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let envelope: ApiResponse<T> = resp.json().await?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(Error::Api {
                method,
                status,
                description: description.unwrap_or_else(|| "no description".into()),
            }),
        }
    }

    // ── Updates ──────────────────────────────────────────────────────

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message", "callback_query"],
        };
        self.call(
            "getUpdates",
            &body,
            Some(Duration::from_secs(timeout_secs) + POLL_GRACE),
        )
        .await
    }

    pub async fn set_webhook(&self, req: &SetWebhookRequest) -> Result<()> {
        let _: bool = self.call("setWebhook", req, None).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({}), None)
            .await?;
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────

    pub async fn send_message(&self, req: &SendMessageRequest) -> Result<Message> {
        self.call("sendMessage", req, None).await
    }

    pub async fn edit_message_text(&self, req: &EditMessageTextRequest) -> Result<()> {
        // Returns the edited Message (or `true` for inline messages); neither is needed.
        let _: serde_json::Value = self.call("editMessageText", req, None).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &DeleteMessageRequest {
                    chat_id,
                    message_id,
                },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, req: &AnswerCallbackQueryRequest) -> Result<()> {
        let _: bool = self.call("answerCallbackQuery", req, None).await?;
        Ok(())
    }
}
