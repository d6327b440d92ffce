use std::sync::Arc;
use std::time::Duration;

use rb_bot::catalog::Catalog;
use rb_bot::config::AppConfig;
use rb_bot::ledger::PgLedger;
use rb_bot::probe::TcpProbe;
use rb_bot::router::Router;
use rb_bot::runner;
use rb_bot::store::{SessionStore, spawn_sweeper};
use rb_bot::transport::TelegramTransport;
use rb_bot::workflow::{Collaborators, Workflow};
use rb_infra::ssh::SshBackend;
use telegram_api::TelegramClient;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for in-flight updates and installs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    // Database
    let db = rb_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");

    rb_db::run_migrations(&db)
        .await
        .expect("failed to run migrations");

    // Collaborators
    let ssh = Arc::new(SshBackend::from_env().expect("failed to configure ssh backend"));
    let admins = Arc::new(config.admin_ids.clone());
    let client = TelegramClient::new(config.telegram_bot_token.clone());
    let transport = Arc::new(TelegramTransport::new(client.clone()));
    let ledger = Arc::new(PgLedger::new(db, admins.clone()));

    // Sessions
    let store = SessionStore::new(config.session_idle());
    let sweeper = spawn_sweeper(store.clone(), config.session_sweep());

    let workflow = Workflow::new(
        Collaborators {
            transport: transport.clone(),
            ledger: ledger.clone(),
            detector: ssh.clone(),
            provisioner: ssh,
            probe: Arc::new(TcpProbe),
        },
        store,
        Catalog::builtin(),
        config.workflow_settings(),
    );
    let router = Router::new(workflow.clone(), transport, ledger, admins, config.min_deposit);

    let tasks = TaskTracker::new();
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    match config.webhook_url() {
        Some(url) => {
            runner::register_webhook(&client, &url, config.webhook_secret.as_deref())
                .await
                .expect("failed to register webhook");

            let app = runner::webhook_router(router, tasks.clone(), config.webhook_secret.clone())
                .layer(TraceLayer::new_for_http());

            let listener = tokio::net::TcpListener::bind(config.listen_addr)
                .await
                .expect("failed to bind listener");

            tracing::info!(addr = %config.listen_addr, "starting webhook server");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await
                .expect("server error");
        }
        None => {
            runner::run_polling(client, router, tasks.clone(), shutdown.clone())
                .await
                .expect("polling failed");
        }
    }

    sweeper.abort();
    tasks.close();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        tasks.wait().await;
        workflow.wait_idle().await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(in_flight = workflow.in_flight(), "shutdown grace expired with installs still running");
    }
}
