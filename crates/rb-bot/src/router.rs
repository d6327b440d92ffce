//! Turns Telegram updates into commands, button presses and step input.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use telegram_api::Update;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::probe::ProbeResult;
use crate::session::{ChatId, MessageRef, UserId};
use crate::store::SessionStore;
use crate::transport::ChatTransport;
use crate::workflow::{Input, Workflow, render};

/// An update the bot acts on. Everything else is dropped.
#[derive(Debug, Clone)]
pub enum Inbound {
    Text {
        chat: ChatId,
        user: UserId,
        message: MessageRef,
        text: String,
    },
    Button {
        chat: ChatId,
        user: UserId,
        callback_id: String,
        /// The message the button is attached to.
        message: MessageRef,
        data: String,
    },
}

impl Inbound {
    pub fn from_update(update: Update) -> Option<Self> {
        if let Some(query) = update.callback_query {
            let message = query.message?;
            return Some(Self::Button {
                chat: message.chat.id,
                user: query.from.id,
                callback_id: query.id,
                message: MessageRef {
                    chat_id: message.chat.id,
                    message_id: message.message_id,
                },
                data: query.data.unwrap_or_default(),
            });
        }

        let message = update.message?;
        let user = message.from.as_ref()?.id;
        let text = message.text?;
        Some(Self::Text {
            chat: message.chat.id,
            user,
            message: MessageRef {
                chat_id: message.chat.id,
                message_id: message.message_id,
            },
            text,
        })
    }

    pub fn chat(&self) -> ChatId {
        match self {
            Self::Text { chat, .. } | Self::Button { chat, .. } => *chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Balance,
    Status,
    Cancel,
    AddBalance,
}

impl Command {
    /// Parse a leading `/command`, accepting the `/command@BotName` form.
    /// Returns the command and whatever follows it.
    pub fn parse(text: &str) -> Option<(Self, &str)> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);

        let command = match name.to_ascii_lowercase().as_str() {
            "start" | "menu" => Self::Start,
            "balance" => Self::Balance,
            "status" => Self::Status,
            "cancel" => Self::Cancel,
            "addbalance" => Self::AddBalance,
            _ => return None,
        };
        Some((command, args.trim()))
    }
}

#[derive(Clone)]
pub struct Router {
    pub(crate) workflow: Workflow,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) admins: Arc<HashSet<UserId>>,
    pub(crate) min_deposit: i64,
    started: Instant,
}

impl Router {
    pub fn new(
        workflow: Workflow,
        transport: Arc<dyn ChatTransport>,
        ledger: Arc<dyn Ledger>,
        admins: Arc<HashSet<UserId>>,
        min_deposit: i64,
    ) -> Self {
        Self {
            workflow,
            transport,
            ledger,
            admins,
            min_deposit,
            started: Instant::now(),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub(crate) fn store(&self) -> &SessionStore {
        self.workflow.store()
    }

    pub(crate) fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Handle one update. Failures are logged, the chat's sessions are reset
    /// and the user gets an apology.
    pub async fn handle(&self, inbound: Inbound) {
        let chat = inbound.chat();
        if let Err(e) = self.dispatch(inbound).await {
            error!(chat_id = chat, error = %e, "update handling failed");
            self.store().clear_all(chat);
            if let Err(e) = self.transport.send_message(chat, render::apology(), None).await {
                warn!(chat_id = chat, error = %e, "could not send apology");
            }
        }
    }

    async fn dispatch(&self, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::Text {
                chat,
                user,
                message,
                text,
            } => self.on_text(chat, user, message, text).await,
            Inbound::Button {
                chat,
                user,
                callback_id,
                message,
                data,
            } => self.on_button(chat, user, &callback_id, message, &data).await,
        }
    }

    // ── Text ────────────────────────────────────────────────────────

    async fn on_text(&self, chat: ChatId, user: UserId, message: MessageRef, text: String) -> Result<()> {
        if let Some((command, args)) = Command::parse(&text) {
            debug!(chat_id = chat, user_id = user, ?command, "command");
            return self.on_command(chat, user, command, args).await;
        }

        if self.workflow.has_session(chat) {
            return self
                .workflow
                .handle_step_input(chat, Input::Text { message, text })
                .await;
        }
        if self.store().admin.contains(chat) {
            return self.admin_input(chat, user, &text).await;
        }
        if self.store().deposit.contains(chat) {
            return self.deposit_input(chat, &text).await;
        }

        self.transport
            .send_message(chat, "Use /start to open the menu.", None)
            .await?;
        Ok(())
    }

    async fn on_command(&self, chat: ChatId, user: UserId, command: Command, args: &str) -> Result<()> {
        match command {
            Command::Start => {
                self.store().admin.clear(chat);
                self.store().deposit.clear(chat);
                let (text, keyboard) = render::main_menu(self.ledger.balance(user).await?);
                self.transport.send_message(chat, &text, Some(&keyboard)).await?;
                Ok(())
            }
            Command::Balance => {
                let balance = self.ledger.balance(user).await?;
                let text = format!("💰 Your balance: <b>{balance}</b>");
                self.transport
                    .send_message(chat, &text, Some(&render::menu_keyboard()))
                    .await?;
                Ok(())
            }
            Command::Status => {
                let account = self.ledger.account(user).await?;
                let (text, keyboard) = render::account_status(user, &account, self.started.elapsed());
                self.transport.send_message(chat, &text, Some(&keyboard)).await?;
                Ok(())
            }
            Command::Cancel => {
                if self.workflow.has_session(chat) {
                    return self.workflow.cancel(chat).await;
                }
                let admin = self.store().admin.clear(chat).is_some();
                let deposit = self.store().deposit.clear(chat).is_some();
                if admin || deposit {
                    let (text, keyboard) = render::cancelled_input();
                    self.transport.send_message(chat, &text, Some(&keyboard)).await?;
                    return Ok(());
                }
                self.workflow.cancel(chat).await
            }
            Command::AddBalance => self.begin_credit(chat, user, args).await,
        }
    }

    // ── Buttons ─────────────────────────────────────────────────────

    async fn on_button(
        &self,
        chat: ChatId,
        user: UserId,
        callback_id: &str,
        message: MessageRef,
        data: &str,
    ) -> Result<()> {
        let action = match data.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                warn!(chat_id = chat, error = %e, "unknown button");
                self.answer(callback_id, Some("This button is no longer available."), false)
                    .await;
                return Ok(());
            }
        };
        debug!(chat_id = chat, user_id = user, %action, "button");

        match action {
            Action::TestRdp { host, port } => {
                let result = self.probe_rdp(host, port).await;
                info!(chat_id = chat, %host, port, reachable = result.reachable, "rdp test");
                self.answer(callback_id, Some(&rdp_test_text(host, port, &result)), true)
                    .await;
                return Ok(());
            }
            Action::ConnectionGuide => {
                self.answer(callback_id, Some(render::connection_guide()), true)
                    .await;
                return Ok(());
            }
            _ => self.answer(callback_id, None, false).await,
        }

        match action {
            Action::Install(kind) => {
                self.workflow
                    .start_workflow(chat, user, kind, message)
                    .await
            }
            Action::Catalog(_) | Action::BackToCatalog => {
                self.workflow
                    .handle_step_input(chat, Input::Button(action))
                    .await
            }
            Action::CancelInstallation => self.workflow.cancel(chat).await,
            Action::BackToMenu => {
                self.store().clear_all(chat);
                let (text, keyboard) = render::main_menu(self.ledger.balance(user).await?);
                self.transport.edit_message(message, &text, Some(&keyboard)).await
            }
            Action::Deposit => self.begin_deposit(chat, user, message).await,
            Action::Faq => {
                let (text, keyboard) = render::faq();
                self.transport.edit_message(message, &text, Some(&keyboard)).await
            }
            Action::Tutorial => {
                let settings = self.workflow.settings();
                let (text, keyboard) = render::tutorial(settings.templated_cost, settings.dedicated_cost);
                self.transport.edit_message(message, &text, Some(&keyboard)).await
            }
            Action::CheckRdp { host, port } => {
                self.transport
                    .edit_message(message, &render::checking_rdp(host, port), None)
                    .await?;
                let result = self.probe_rdp(host, port).await;
                info!(chat_id = chat, %host, port, reachable = result.reachable, "rdp re-check");
                let (text, keyboard) = render::rdp_status(host, port, &result);
                self.transport.edit_message(message, &text, Some(&keyboard)).await
            }
            Action::TestRdp { .. } | Action::ConnectionGuide => Ok(()),
        }
    }

    async fn probe_rdp(&self, host: Ipv4Addr, port: u16) -> ProbeResult {
        let monitor = self.workflow.monitor();
        monitor
            .probe()
            .probe(&host.to_string(), port, monitor.probe_timeout())
            .await
    }

    /// Button acknowledgements are best effort; the query may have expired.
    async fn answer(&self, callback_id: &str, text: Option<&str>, alert: bool) {
        if let Err(e) = self.transport.answer_button(callback_id, text, alert).await {
            debug!(error = %e, "could not answer button");
        }
    }
}

fn rdp_test_text(host: Ipv4Addr, port: u16, result: &ProbeResult) -> String {
    match (result.reachable, result.latency, result.error) {
        (true, Some(latency), _) => format!("✅ {host}:{port} is reachable ({} ms)", latency.as_millis()),
        (true, None, _) => format!("✅ {host}:{port} is reachable"),
        (false, _, Some(error)) => format!("❌ {host}:{port}: {error}"),
        (false, _, None) => format!("❌ {host}:{port} is not reachable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::probe::ProbeErrorKind;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start"), Some((Command::Start, "")));
        assert_eq!(Command::parse("/Balance"), Some((Command::Balance, "")));
        assert_eq!(Command::parse("/status"), Some((Command::Status, "")));
        assert_eq!(Command::parse("/cancel@RdpBot"), Some((Command::Cancel, "")));
        assert_eq!(
            Command::parse("/addbalance@RdpBot 42 5000 "),
            Some((Command::AddBalance, "42 5000"))
        );
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("203.0.113.5"), None);
    }

    #[test]
    fn updates_without_text_or_sender_are_dropped() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": { "message_id": 3, "chat": { "id": 10 }, "from": { "id": 7 } }
        }))
        .unwrap();
        assert!(Inbound::from_update(update).is_none());

        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "message": { "message_id": 4, "chat": { "id": 10 }, "from": { "id": 7 }, "text": "/start" }
        }))
        .unwrap();
        match Inbound::from_update(update) {
            Some(Inbound::Text { chat, user, message, text }) => {
                assert_eq!((chat, user, message.message_id), (10, 7, 4));
                assert_eq!(text, "/start");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn callback_queries_carry_their_message() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7 },
                "message": { "message_id": 9, "chat": { "id": 10 } },
                "data": "install_dedicated"
            }
        }))
        .unwrap();
        match Inbound::from_update(update) {
            Some(Inbound::Button { chat, callback_id, message, data, .. }) => {
                assert_eq!(chat, 10);
                assert_eq!(callback_id, "cb-1");
                assert_eq!(message.message_id, 9);
                assert_eq!(data, "install_dedicated");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rdp_test_answers() {
        let host = Ipv4Addr::new(203, 0, 113, 5);
        assert_eq!(
            rdp_test_text(host, 8765, &ProbeResult::reachable(Duration::from_millis(120))),
            "✅ 203.0.113.5:8765 is reachable (120 ms)"
        );
        assert_eq!(
            rdp_test_text(host, 3389, &ProbeResult::failed(ProbeErrorKind::Refused)),
            "❌ 203.0.113.5:3389: connection refused"
        );
    }
}
