//! Top-up requests. The user names an amount, the request is recorded and
//! admins are told to credit it once payment arrives.

use tracing::{info, warn};

use crate::error::Result;
use crate::router::Router;
use crate::session::{ChatId, DepositSession, MessageRef, UserId};
use crate::validate::parse_amount;
use crate::workflow::render;

fn prompt(min_deposit: i64, error: Option<&str>) -> String {
    let error = error.map(|e| format!("❌ {e}\n\n")).unwrap_or_default();
    format!(
        "{error}💳 <b>Deposit</b>\n\n\
         Send the amount you want to add. Minimum: <b>{min_deposit}</b>."
    )
}

impl Router {
    pub(crate) async fn begin_deposit(&self, chat: ChatId, user: UserId, prompt_message: MessageRef) -> Result<()> {
        self.store().deposit.set(
            chat,
            DepositSession {
                user_id: user,
                prompt: prompt_message,
            },
        );
        self.transport
            .edit_message(
                prompt_message,
                &prompt(self.min_deposit, None),
                Some(&render::menu_keyboard()),
            )
            .await
    }

    pub(crate) async fn deposit_input(&self, chat: ChatId, text: &str) -> Result<()> {
        let Some(session) = self.store().deposit.get(chat) else {
            return Ok(());
        };

        let amount = match parse_amount(text) {
            Some(amount) if amount >= self.min_deposit => amount,
            _ => {
                let error = format!("Enter a whole number of at least {}.", self.min_deposit);
                return self
                    .transport
                    .edit_message(
                        session.prompt,
                        &prompt(self.min_deposit, Some(&error)),
                        Some(&render::menu_keyboard()),
                    )
                    .await;
            }
        };

        let request = self.ledger.request_deposit(session.user_id, amount).await?;
        self.store().deposit.clear(chat);
        info!(chat_id = chat, user_id = session.user_id, amount, %request, "deposit request recorded");

        let text = format!(
            "🧾 <b>Deposit request recorded</b>\n\n\
             Amount: <b>{amount}</b>\n\
             Reference: <code>{request}</code>\n\n\
             An admin will credit your balance once the payment is confirmed."
        );
        self.transport
            .edit_message(session.prompt, &text, Some(&render::menu_keyboard()))
            .await?;

        let notice = format!(
            "💳 <b>New deposit request</b>\n\n\
             User: <code>{user}</code>\n\
             Amount: <b>{amount}</b>\n\
             Reference: <code>{request}</code>\n\n\
             Credit with <code>/addbalance {user} {amount}</code>",
            user = session.user_id,
        );
        for admin in self.admins.iter() {
            if let Err(e) = self.transport.send_message(*admin, &notice, None).await {
                warn!(admin_id = admin, error = %e, "could not notify admin of deposit");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_shows_minimum_and_error() {
        assert!(prompt(10_000, None).contains("Minimum: <b>10000</b>"));
        assert!(prompt(10_000, Some("Too small.")).starts_with("❌ Too small."));
    }
}
