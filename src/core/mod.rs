//! Plumbing every other module leans on: identity, configuration, the shared
//! error type and the application state handed to handlers.

pub mod auth;
pub mod config;
pub mod error;
pub mod state;

pub use auth::{Claims, Identity, authentication_middleware, decode_jwt, encode_jwt};
pub use config::Config;
pub use error::AppError;
pub use state::AppState;
