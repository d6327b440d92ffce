use crate::config::ConfigError;

/// Failures the bot cannot answer in-conversation. The router logs them and
/// resets the chat.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("telegram error: {0}")]
    Telegram(#[from] telegram_api::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("infra error: {0}")]
    Infra(#[from] rb_infra::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BotError>;
