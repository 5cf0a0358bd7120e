pub mod checks;
pub mod config;
pub mod consumer;
pub mod db;
pub mod events;
pub mod psp;
pub mod repo;
pub mod routes;

pub use config::Config;
pub use consumer::PaymentHandler;
pub use psp::PspSimulator;
pub use repo::ProcessedEventsRepo;
pub use routes::build_router;
