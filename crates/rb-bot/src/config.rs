use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::workflow::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub telegram_bot_token: String,
    pub listen_addr: SocketAddr,
    /// Enables webhook mode when set.
    pub public_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub admin_ids: HashSet<i64>,
    pub templated_install_cost: i64,
    pub dedicated_install_cost: i64,
    pub session_idle_secs: u64,
    pub session_sweep_secs: u64,
    pub monitor_poll_secs: u64,
    pub monitor_probe_timeout_secs: u64,
    pub monitor_deadline_secs: u64,
    pub monitor_start_delay_secs: u64,
    pub progress_interval_secs: u64,
    pub refund_on_failure: bool,
    pub min_deposit: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            listen_addr: parsed_or("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            public_url: optional("PUBLIC_URL"),
            webhook_secret: optional("WEBHOOK_SECRET"),
            admin_ids: parse_id_list("ADMIN_IDS", &env::var("ADMIN_IDS").unwrap_or_default())?,
            templated_install_cost: parsed_or("TEMPLATED_INSTALL_COST", 1000)?,
            dedicated_install_cost: parsed_or("DEDICATED_INSTALL_COST", 3000)?,
            session_idle_secs: parsed_or("SESSION_IDLE_SECS", 1800)?,
            session_sweep_secs: parsed_or("SESSION_SWEEP_SECS", 300)?,
            monitor_poll_secs: parsed_or("MONITOR_POLL_SECS", 30)?,
            monitor_probe_timeout_secs: parsed_or("MONITOR_PROBE_TIMEOUT_SECS", 5)?,
            monitor_deadline_secs: parsed_or("MONITOR_DEADLINE_SECS", 2700)?,
            monitor_start_delay_secs: parsed_or("MONITOR_START_DELAY_SECS", 120)?,
            progress_interval_secs: parsed_or("PROGRESS_INTERVAL_SECS", 15)?,
            refund_on_failure: parsed_or("REFUND_ON_FAILURE", false)?,
            min_deposit: parsed_or("MIN_DEPOSIT", 10_000)?,
        })
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn session_sweep(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs)
    }

    pub fn workflow_settings(&self) -> Settings {
        Settings {
            templated_cost: self.templated_install_cost,
            dedicated_cost: self.dedicated_install_cost,
            poll_interval: Duration::from_secs(self.monitor_poll_secs),
            probe_timeout: Duration::from_secs(self.monitor_probe_timeout_secs),
            monitor_deadline: Duration::from_secs(self.monitor_deadline_secs),
            monitor_start_delay: Duration::from_secs(self.monitor_start_delay_secs),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            refund_on_failure: self.refund_on_failure,
        }
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .map(|base| format!("{}/telegram/webhook", base.trim_end_matches('/')))
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        _ => Ok(default),
    }
}

fn parse_id_list(var: &'static str, raw: &str) -> Result<HashSet<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::Invalid {
                var,
                value: s.to_string(),
            })
        })
        .collect()
}
