//! HTTP surface for the drive catalog and one-time links.

pub mod config;
pub mod error;
pub mod server;

pub use config::{load_or_create_config, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::Server;
