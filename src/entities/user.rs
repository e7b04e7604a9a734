//! User entity - Mirror of the account owned by the identity provider

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub user_id: i32,
    pub username: String,
    // shown to other members in every rendered event
    pub full_name: String,
}
