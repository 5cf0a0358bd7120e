pub mod checks;
pub mod config;
pub mod db;
pub mod events;
pub mod handlers;
pub mod models;
pub mod outbox_worker;
pub mod repo;
pub mod routes;
pub mod validation;

pub use config::Config;
pub use handlers::AppState;
pub use outbox_worker::OutboxWorker;
pub use repo::PaymentsRepo;
pub use routes::build_router;
