//! `/addbalance`: admins credit a user's balance by Telegram id.

use tracing::{info, warn};

use crate::error::Result;
use crate::router::Router;
use crate::session::{AdminSession, ChatId, UserId};
use crate::validate::parse_amount;
use crate::workflow::render;

const PROMPT: &str = "💳 <b>Add balance</b>\n\n\
    Send <code>user_id amount</code>, for example <code>123456789 50000</code>.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditParseError {
    #[error("Send exactly two values: the user id and the amount.")]
    Format,

    #[error("The user id must be a number.")]
    UserId,

    #[error("The amount must be a positive whole number.")]
    Amount,
}

pub fn parse_credit(text: &str) -> std::result::Result<(UserId, i64), CreditParseError> {
    let mut parts = text.split_whitespace();
    let (Some(user), Some(amount), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CreditParseError::Format);
    };
    let user = user.parse().map_err(|_| CreditParseError::UserId)?;
    let amount = parse_amount(amount).ok_or(CreditParseError::Amount)?;
    Ok((user, amount))
}

impl Router {
    /// `/addbalance` with inline arguments credits immediately; without them
    /// the admin is asked for the values.
    pub(crate) async fn begin_credit(&self, chat: ChatId, user: UserId, args: &str) -> Result<()> {
        if !self.is_admin(user) {
            warn!(chat_id = chat, user_id = user, "non-admin tried /addbalance");
            self.transport
                .send_message(chat, "⛔ This command is for admins only.", None)
                .await?;
            return Ok(());
        }

        if !args.is_empty() {
            return self.apply_credit(chat, args).await;
        }

        let prompt = self
            .transport
            .send_message(chat, PROMPT, Some(&render::menu_keyboard()))
            .await?;
        self.store().admin.set(chat, AdminSession { prompt });
        Ok(())
    }

    pub(crate) async fn admin_input(&self, chat: ChatId, user: UserId, text: &str) -> Result<()> {
        // Someone else in a group chat.
        if !self.is_admin(user) {
            return Ok(());
        }
        self.apply_credit(chat, text).await
    }

    async fn apply_credit(&self, chat: ChatId, text: &str) -> Result<()> {
        let (target, amount) = match parse_credit(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                let text = format!("⚠️ {e}\n\n{PROMPT}");
                self.transport
                    .send_message(chat, &text, Some(&render::menu_keyboard()))
                    .await?;
                return Ok(());
            }
        };

        let balance = self.ledger.credit(target, amount, "admin credit").await?;
        self.store().admin.clear(chat);
        info!(admin_chat = chat, user_id = target, amount, balance, "balance credited");

        let text = format!(
            "✅ Credited <b>{amount}</b> to <code>{target}</code>. New balance: <b>{balance}</b>."
        );
        self.transport
            .send_message(chat, &text, Some(&render::menu_keyboard()))
            .await?;

        // Private chats share the user's id.
        let notice = format!("💰 Your balance was topped up by <b>{amount}</b>. New balance: <b>{balance}</b>.");
        if let Err(e) = self.transport.send_message(target, &notice, None).await {
            warn!(user_id = target, error = %e, "could not notify credited user");
        }
        Ok(())
    }
}
