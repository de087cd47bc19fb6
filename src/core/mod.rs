pub mod debug_logger;
pub mod health;
pub mod http;
pub mod playlist;
pub mod service;
pub mod stream;
pub mod types;
pub mod vpn;

pub use service::{RelayServices, ServiceError};
