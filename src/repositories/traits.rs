//! Generic CRUD shapes shared by the repositories
//!
//! Only the operations the hub performs through a primary key live here; every
//! domain-specific query (history pages, unread counters, DM lookups) stays an
//! inherent method on its repository.

/// Insert a row built from `CreateDTO`, returning the stored entity.
///
/// Uuid keys are generated on insert; composite keys come from the DTO itself.
pub trait Create<Entity, CreateDTO> {
    async fn create(&self, data: &CreateDTO) -> Result<Entity, sqlx::Error>;
}

/// Fetch one entity by key; `Ok(None)` when nothing matches.
pub trait Read<Entity, Id> {
    async fn read(&self, id: &Id) -> Result<Option<Entity>, sqlx::Error>;
}

/// Fetch every entity whose key is in `ids`, in no particular order.
/// Missing keys are skipped silently.
pub trait ReadMany<Entity, Id> {
    async fn read_many(&self, ids: &[Id]) -> Result<Vec<Entity>, sqlx::Error>;
}

/// Remove the row with the given key, reporting whether one was there.
pub trait Delete<Id> {
    async fn delete(&self, id: &Id) -> Result<bool, sqlx::Error>;
}
