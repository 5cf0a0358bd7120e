use std::sync::Arc;
use std::time::Duration;

use event_bus::{KafkaConsumer, KafkaPublisher, Publisher};
use health::ReadinessState;
use provider_rs::checks::{DatabaseCheck, KafkaCheck};
use provider_rs::{build_router, Config, PaymentHandler, ProcessedEventsRepo, PspSimulator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Bounded drain window given to the HTTP server and each partition handler once a shutdown
/// signal arrives, mirroring the source's `context.WithTimeout(..., 5*time.Second)`.
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

    tracing::info!("Starting provider service...");

    let config = Config::from_env().expect("failed to load configuration from environment");

    tracing::info!("Connecting to database...");
    let pool = provider_rs::db::init_pool(&config.database.url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let repo = ProcessedEventsRepo::new(pool.clone());
    let psp = Arc::new(PspSimulator::new(config.psp.chance, config.psp.prefix.clone()));

    let brokers: Vec<String> = config.kafka.brokers.split(',').map(str::to_string).collect();
    let topics = event_bus::Topics {
        payment_created: config.kafka.payment_created_topic.clone(),
        payment_processed: config.kafka.payments_processed_topic.clone(),
        payment_failed: config.kafka.payments_failed_topic.clone(),
    };

    tracing::info!(brokers = %config.kafka.brokers, "connecting to Kafka...");
    let kafka_publisher = KafkaPublisher::new(&brokers, &config.kafka.client_id, topics)
        .expect("failed to create Kafka producer");

    let shutdown = CancellationToken::new();

    let mut handler_handles = Vec::with_capacity(config.kafka.partitions as usize);
    for partition in 0..config.kafka.partitions {
        let consumer = KafkaConsumer::new(
            &brokers,
            &config.kafka.group_id,
            &config.kafka.payment_created_topic,
            partition,
            "payment.created",
        )
        .expect("failed to create Kafka consumer");

        let publisher: Arc<dyn Publisher> = Arc::new(kafka_publisher.clone());
        let handler = PaymentHandler::new(consumer, publisher, repo.clone(), psp.clone(), format!("partition-{partition}"));
        let handler_shutdown = shutdown.clone();
        handler_handles.push(tokio::spawn(async move {
            tracing::info!(partition, "starting provider handler...");
            handler.run(handler_shutdown).await;
        }));
    }

    let readiness_checks: Vec<Arc<dyn health::ReadinessCheck>> = vec![
        Arc::new(DatabaseCheck::new(pool.clone())),
        Arc::new(KafkaCheck::new(kafka_publisher)),
    ];
    let readiness = ReadinessState::new(readiness_checks);

    let app = build_router(repo, readiness);

    let listener = tokio::net::TcpListener::bind(&config.http.addr)
        .await
        .expect("failed to bind address");
    tracing::info!(addr = %config.http.addr, "provider service listening");

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
    for handle in handler_handles {
        if tokio::time::timeout(STOP_DEADLINE, handle).await.is_err() {
            tracing::warn!("provider handler did not shut down within the stop deadline");
        }
    }

    tracing::info!("provider service stopped");
}
