//! Query DTOs - Query string parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pagination of the message history
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct MessagesQuery {
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Browsers cannot set headers on a WebSocket upgrade, so the token may travel in the query
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}
