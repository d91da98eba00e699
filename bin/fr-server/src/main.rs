//! FormRelay server
//!
//! Wires the whole pipeline: config, SQLite store, rate limiter, composer,
//! dispatch channels, delivery queue and worker, then serves the HTTP API
//! until a shutdown signal arrives. The worker is stopped after the HTTP
//! server drains so in-flight submissions still get their jobs picked up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fr_admission::{FieldLimits, RateLimiter, RateLimiterConfig};
use fr_api::AppState;
use fr_compose::{Composer, ComposerConfig};
use fr_config::ConfigLoader;
use fr_dispatch::{ChannelRouter, Dispatcher, EmailChannel, SmtpSettings, WebhookChannel};
use fr_queue::{DeliveryQueue, DeliveryWorker, WorkerConfig};
use fr_store::{SqliteAuditSink, SqliteStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fr_common::logging::init_logging();

    info!("Starting FormRelay");

    let config = ConfigLoader::new().load()?;

    let store = SqliteStore::open(&config.store.database_path).await?;
    let audit: Arc<dyn fr_common::AuditSink> = Arc::new(SqliteAuditSink::new(store.clone()));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
        max_requests: config.rate_limit.max_requests,
        window: Duration::from_secs(config.rate_limit.window_seconds),
    }));

    let composer = Arc::new(Composer::new(
        ComposerConfig {
            endpoint: config.composer.endpoint.clone(),
            api_key: config.composer.api_key.clone(),
            model: config.composer.model.clone(),
            timeout: Duration::from_secs(config.composer.timeout_seconds),
        },
        audit.clone(),
    ));

    if config.smtp.host.is_none() {
        warn!("SMTP host not configured, emails will be emitted to the log");
    }
    let email = EmailChannel::new(SmtpSettings {
        host: config.smtp.host.clone(),
        port: config.smtp.port,
        username: config.smtp.username.clone(),
        password: config.smtp.password.clone(),
        use_tls: config.smtp.use_tls,
        mail_from: config.smtp.mail_from.clone(),
        allow_from_override: config.smtp.allow_from_override,
    });
    let dispatcher: Arc<dyn Dispatcher> =
        Arc::new(ChannelRouter::new(email, WebhookChannel::default()));

    let queue = DeliveryQueue::new();
    let receiver = queue
        .take_receiver()
        .ok_or_else(|| anyhow::anyhow!("Queue receiver already taken"))?;
    let worker = DeliveryWorker::new(
        dispatcher,
        audit,
        queue.handle(),
        WorkerConfig {
            max_retries: config.delivery.max_retries,
            base_backoff_seconds: config.delivery.base_backoff_seconds,
        },
    );
    let worker_handle = worker.start(receiver);

    if config.delivery.notify_recipients.is_empty() {
        warn!("No notification recipients configured, submissions will not be delivered");
    }

    let state = AppState {
        rate_limiter,
        composer,
        queue: queue.handle(),
        store,
        limits: FieldLimits {
            max_name_len: config.limits.max_name_len,
            max_email_len: config.limits.max_email_len,
            max_message_len: config.limits.max_message_len,
        },
        max_body_bytes: config.limits.max_body_bytes,
        notify_recipients: config.delivery.notify_recipients.clone(),
        trust_forwarded_for: config.http.trust_forwarded_for,
    };
    let app = fr_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    info!(?addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    worker_handle.stop().await;
    info!("FormRelay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C handler");
        return;
    }
    info!("Shutdown signal received");
}
