//! Entities module - Rows persisted by the hub
//!
//! Every entity maps to one table in `migrations/`. Rooms, messages and notifications
//! use opaque UUID identifiers, users keep the integer id issued by the account service.

pub mod enums;
pub mod last_seen;
pub mod membership;
pub mod message;
pub mod notification;
pub mod room;
pub mod user;

pub use enums::{DeliveryStatus, MessageType, NotificationType, PresenceStatus};
pub use last_seen::LastSeen;
pub use membership::Membership;
pub use message::{Message, TOMBSTONE};
pub use notification::Notification;
pub use room::Room;
pub use user::User;
