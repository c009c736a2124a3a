pub mod backend;
pub mod config;
pub mod health;
pub mod observability;
pub mod server;
pub mod sweeper;

pub use backend::Backend;
pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageConfig};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with};
pub use server::{ServerBuilder, WardenServer, build_app};
pub use sweeper::AccessTokenSweeper;
