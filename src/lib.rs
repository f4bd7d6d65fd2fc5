//! Progression server library
//!
//! Client-facing loan application tracking: magic links issued by operators,
//! a rate-limited public status endpoint, and the webhooks that keep
//! application statuses current.

pub mod applications;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod magic_link;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod payments;
pub mod progress;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use routes::app_router;
pub use state::AppState;
