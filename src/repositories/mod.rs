//! Repositories module - Storage access for the hub
//!
//! Each repository owns a clone of the SQLite pool and exposes the queries of one entity.
//! Queries are checked at run time (`query_as::<_, T>` + `FromRow`) so the crate builds
//! without a live database; the schema lives in `migrations/`.
//!
//! Every call is async on the sqlx pool, so storage work never blocks the runtime
//! threads that service other connections.

pub mod last_seen;
pub mod membership;
pub mod message;
pub mod notification;
pub mod room;
pub mod traits;
pub mod user;

pub use traits::{Create, Delete, Read, ReadMany};

pub use last_seen::LastSeenRepository;
pub use membership::MembershipRepository;
pub use message::MessageRepository;
pub use notification::NotificationRepository;
pub use room::RoomRepository;
pub use user::UserRepository;
