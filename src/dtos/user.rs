//! User DTOs - Data Transfer Objects for users

use crate::core::auth::Identity;
use crate::entities::User;
use serde::{Deserialize, Serialize};

/// Sender/member summary embedded in rendered events
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSummaryDTO {
    pub id: i32,
    pub full_name: String,
}

impl From<&User> for UserSummaryDTO {
    fn from(value: &User) -> Self {
        Self {
            id: value.user_id,
            full_name: value.full_name.clone(),
        }
    }
}

impl From<&Identity> for UserSummaryDTO {
    fn from(value: &Identity) -> Self {
        Self {
            id: value.user_id,
            full_name: value.full_name.clone(),
        }
    }
}
