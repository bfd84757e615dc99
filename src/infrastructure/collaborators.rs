// External collaborators - Stores the entity layer notifies but does not own

use async_trait::async_trait;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::database::Guid;

/// Metadata and annotation stores. Both are attached to entities and must be
/// cleared when the entity goes away.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn clear_for_entity(&self, guid: Guid) -> AppResult<u64>;

    fn name(&self) -> &str;
}

/// River-style activity index keyed by subject and object guids
#[async_trait]
pub trait ActivityIndex: Send + Sync {
    async fn remove_by_subject(&self, guid: Guid) -> AppResult<u64>;

    async fn remove_by_object(&self, guid: Guid) -> AppResult<u64>;

    /// Propagates a new access level to activity entries about the object
    async fn update_access_by_object(&self, guid: Guid, access_id: i64) -> AppResult<u64>;
}

/// Attachment store that holds nothing
pub struct NullAttachmentStore {
    name: &'static str,
}

impl NullAttachmentStore {
    pub fn metadata() -> Self {
        Self { name: "metadata" }
    }

    pub fn annotations() -> Self {
        Self { name: "annotations" }
    }
}

#[async_trait]
impl AttachmentStore for NullAttachmentStore {
    async fn clear_for_entity(&self, guid: Guid) -> AppResult<u64> {
        debug!("No {} stored for entity {}", self.name, guid);
        Ok(0)
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[derive(Default)]
pub struct NullActivityIndex;

#[async_trait]
impl ActivityIndex for NullActivityIndex {
    async fn remove_by_subject(&self, _guid: Guid) -> AppResult<u64> {
        Ok(0)
    }

    async fn remove_by_object(&self, _guid: Guid) -> AppResult<u64> {
        Ok(0)
    }

    async fn update_access_by_object(&self, _guid: Guid, _access_id: i64) -> AppResult<u64> {
        Ok(0)
    }
}
