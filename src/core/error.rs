use crate::fanout::FanoutError;
use crate::presence::PresenceError;
use crate::ws::close_codes;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::fmt;

/// Error shared by the HTTP handlers and the WebSocket session.
///
/// Over HTTP it becomes a status plus a JSON body; inside a live session it becomes
/// an `{"error": ...}` frame, and on a room-scoped handshake a close code
/// (see [`AppError::close_code`]). `message` is always safe to show to the client,
/// `details` only goes to the logs and to validation responses.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: &'static str,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

macro_rules! constructors {
    ($($name:ident => $status:ident),* $(,)?) => {
        $(
            pub fn $name(message: &'static str) -> Self {
                Self::new(StatusCode::$status, message)
            }
        )*
    };
}

impl AppError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            message,
            details: None,
        }
    }

    constructors! {
        bad_request => BAD_REQUEST,
        unauthorized => UNAUTHORIZED,
        forbidden => FORBIDDEN,
        not_found => NOT_FOUND,
        conflict => CONFLICT,
        internal_server_error => INTERNAL_SERVER_ERROR,
        service_unavailable => SERVICE_UNAVAILABLE,
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// WebSocket close code for a refused room-scoped connection
    pub fn close_code(&self) -> u16 {
        match self.status {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => close_codes::NOT_FOUND,
            StatusCode::UNAUTHORIZED => close_codes::UNAUTHORIZED,
            StatusCode::FORBIDDEN => close_codes::FORBIDDEN,
            _ => close_codes::INTERNAL,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)?;
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Internal details stay in the logs
        let details = if self.status.is_server_error() {
            tracing::error!("{}", self);
            None
        } else {
            self.details.as_deref()
        };
        let body = Json(ErrorBody {
            error: self.message,
            details,
        });
        (self.status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::service_unavailable("Database unavailable")
            }
            other => Self::internal_server_error("Database error").with_details(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::bad_request("Validation error").with_details(err.to_string())
    }
}

impl From<FanoutError> for AppError {
    fn from(err: FanoutError) -> Self {
        Self::service_unavailable("Fanout bus unavailable").with_details(err.to_string())
    }
}

impl From<PresenceError> for AppError {
    fn from(err: PresenceError) -> Self {
        Self::service_unavailable("Presence store unavailable").with_details(err.to_string())
    }
}
