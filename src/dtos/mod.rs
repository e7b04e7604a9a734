//! DTOs module - Data Transfer Objects
//!
//! Wire representations used by the HTTP routes, the WebSocket protocol and the fanout
//! bus. DTOs keep the external shape separate from the persisted entities.

pub mod message;
pub mod notification;
pub mod query;
pub mod room;
pub mod user;
pub mod ws_event;

pub use message::{CreateMessageDTO, MessageDTO, UpdateMessageDTO};
pub use notification::{
    CreateNotificationDTO, MarkAllReadDTO, MarkReadDTO, NotificationDTO, NotificationUnreadCountDTO,
};
pub use query::{MessagesQuery, NotificationsQuery, WsAuthQuery};
pub use room::{
    AddMemberDTO, CreateDmRoomDTO, CreateMembershipDTO, CreateRoomDTO, RoomDTO, RoomSeenDTO,
    RoomUnreadDTO, UnreadMessagesDTO,
};
pub use user::UserSummaryDTO;
pub use ws_event::{ClientFrame, ErrorFrame, FrameError, ServerEvent};
