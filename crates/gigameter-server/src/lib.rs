pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use error::ApiError;
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use server::{AppState, GigameterServer, ServerBuilder, build_app, build_app_with, build_state};
pub use store::FileCategoryStore;
