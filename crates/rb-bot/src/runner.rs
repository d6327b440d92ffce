//! Update intake: long polling, or a webhook endpoint when a public URL is
//! configured. Each update is handled on its own task.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use telegram_api::{SetWebhookRequest, TelegramClient, Update};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::error::Result;
use crate::router::{Inbound, Router};

pub const WEBHOOK_PATH: &str = "/telegram/webhook";
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY: Duration = Duration::from_secs(5);

fn dispatch(router: &Router, tasks: &TaskTracker, update: Update) {
    let update_id = update.update_id;
    match Inbound::from_update(update) {
        Some(inbound) => {
            let router = router.clone();
            tasks.spawn(async move { router.handle(inbound).await });
        }
        None => tracing::debug!(update_id, "ignoring update"),
    }
}

// ── Polling ─────────────────────────────────────────────────────────

/// Long-poll `getUpdates` until `shutdown` fires.
pub async fn run_polling(
    client: TelegramClient,
    router: Router,
    tasks: TaskTracker,
    shutdown: CancellationToken,
) -> Result<()> {
    client.delete_webhook().await?;
    info!("polling for updates");

    let mut offset = None;
    loop {
        let updates = tokio::select! {
            _ = shutdown.cancelled() => break,
            updates = client.get_updates(offset, POLL_TIMEOUT_SECS) => updates,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    dispatch(&router, &tasks, update);
                }
            }
            Err(e) => {
                warn!(error = %e, "getUpdates failed, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(POLL_RETRY) => {}
                }
            }
        }
    }

    info!("polling stopped");
    Ok(())
}

// ── Webhook ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct WebhookState {
    router: Router,
    tasks: TaskTracker,
    secret: Option<Arc<str>>,
}

/// Register the webhook with Telegram.
pub async fn register_webhook(client: &TelegramClient, url: &str, secret: Option<&str>) -> Result<()> {
    client
        .set_webhook(&SetWebhookRequest {
            url: url.to_string(),
            secret_token: secret.map(str::to_string),
            allowed_updates: vec!["message".into(), "callback_query".into()],
        })
        .await?;
    info!(url, "webhook registered");
    Ok(())
}

pub fn webhook_router(router: Router, tasks: TaskTracker, secret: Option<String>) -> axum::Router {
    let state = WebhookState {
        router,
        tasks,
        secret: secret.map(Arc::from),
    };

    axum::Router::new()
        .route(WEBHOOK_PATH, post(receive_update))
        .route("/health", get(health))
        .with_state(state)
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(secret) = &state.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_ref()) {
            warn!("webhook call with a bad secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Acknowledge at once; Telegram retries slow deliveries.
    dispatch(&state.router, &state.tasks, update);
    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}
