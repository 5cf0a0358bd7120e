use std::sync::Arc;
use std::time::Duration;

use checkout_rs::checks::{DatabaseCheck, KafkaCheck, RedisCheck};
use checkout_rs::{build_router, AppState, Config, OutboxWorker, PaymentsRepo};
use event_bus::{KafkaPublisher, Publisher, Topics};
use health::ReadinessState;
use idempotency::{IdempotencyStore, RedisIdempotencyStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Bounded drain window given to the HTTP server and the outbox worker once a shutdown signal
/// arrives, mirroring the source's `context.WithTimeout(..., 5*time.Second)` before `server.Close`.
const STOP_DEADLINE: Duration = Duration::from_secs(5);

/// Resolves on SIGINT or SIGTERM. Does not itself cancel anything — callers decide what to do
/// once the signal arrives.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting checkout service...");

    let config = Arc::new(Config::from_env().expect("failed to load configuration from environment"));

    tracing::info!(addr = %config.http.addr, "configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = checkout_rs::db::init_pool(&config.database.url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let brokers: Vec<String> = config.kafka.brokers.split(',').map(str::to_string).collect();
    let topics = Topics {
        payment_created: config.kafka.payment_created_topic.clone(),
        payment_processed: config.kafka.payments_processed_topic.clone(),
        payment_failed: config.kafka.payments_failed_topic.clone(),
    };

    tracing::info!(brokers = %config.kafka.brokers, "connecting to Kafka...");
    let kafka_publisher = KafkaPublisher::new(&brokers, &config.kafka.client_id, topics)
        .expect("failed to create Kafka producer");
    let publisher: Arc<dyn Publisher> = Arc::new(kafka_publisher.clone());

    tracing::info!(addr = %config.redis.addr, "connecting to Redis...");
    let idem_store = RedisIdempotencyStore::connect(&config.redis.addr, &config.redis.prefix)
        .await
        .expect("failed to connect to Redis");
    let idem_store_for_state: Arc<dyn IdempotencyStore> = Arc::new(idem_store.clone());

    let repo = PaymentsRepo::new(pool.clone());

    let app_state = AppState {
        repo: repo.clone(),
        idem_store: idem_store_for_state,
        publisher: publisher.clone(),
        config: config.clone(),
    };

    let readiness_checks: Vec<Arc<dyn health::ReadinessCheck>> = vec![
        Arc::new(DatabaseCheck::new(pool.clone())),
        Arc::new(RedisCheck::new(idem_store)),
        Arc::new(KafkaCheck::new(kafka_publisher)),
    ];
    let readiness = ReadinessState::new(readiness_checks);

    let shutdown = CancellationToken::new();
    let worker = OutboxWorker::new(repo, publisher, config.outbox.clone());
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move {
        tracing::info!("starting outbox worker...");
        worker.run(worker_shutdown).await;
    });

    let app = build_router(app_state, readiness);

    let listener = tokio::net::TcpListener::bind(&config.http.addr)
        .await
        .expect("failed to bind address");
    tracing::info!(addr = %config.http.addr, "checkout service listening");

    let server_shutdown = shutdown.clone();
    let serve_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining within {:?}...", STOP_DEADLINE);
    shutdown.cancel();

    if tokio::time::timeout(STOP_DEADLINE, serve_handle).await.is_err() {
        tracing::warn!("http server did not drain within the stop deadline");
    }
    if tokio::time::timeout(STOP_DEADLINE, worker_handle).await.is_err() {
        tracing::warn!("outbox worker did not shut down within the stop deadline");
    }

    tracing::info!("checkout service stopped");
}
