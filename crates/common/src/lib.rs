pub mod api;
pub mod config;
pub mod error;

mod log;

pub use api::{ApiClient, ApiResponse};
pub use config::Config;
pub use log::logging_stdout;
