mod auth;
mod client;
pub mod config;
mod error;
mod redact;
pub mod refresh;
mod request;
pub mod state;
pub mod types;

pub use auth::{LOGIN_PATH, PROFILE_PATH};
pub use client::{ApiClient, REFRESH_PATH};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, RefreshError};
pub use redact::{redact_jwt, redact_secrets};
pub use request::{resource_path, ApiRequest};
