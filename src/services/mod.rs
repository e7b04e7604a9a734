//! Services module - Domain operations shared by the WebSocket session and the HTTP routes
//!
//! Each service is a cheap `Clone` over the repositories and the fanout bus it needs.
//! Sessions and handlers compose them through `AppState` instead of owning logic.

pub mod message;
pub mod notification;
pub mod presence;
pub mod room;

pub use message::{MessageService, message_preview};
pub use notification::NotificationService;
pub use presence::PresenceService;
pub use room::RoomService;
