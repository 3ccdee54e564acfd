//! Value types that flow between the change provider, the coordinator, and
//! the sink. An element travels as a [`ModifiedEntity`] inside a
//! [`StreamBatch`]; the sink answers every forwarded element through the
//! oneshot sender carried by its [`Delivery`], and the coordinator correlates
//! the [`StreamAck`] with the in-flight element by entity id.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

/// Identifier of a twin entity (`namespace:name`). Opaque to the sync layer
/// and cheap to clone.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        EntityId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::new(id)
    }
}

/// A changed entity as reported by the upstream journal: the entity id plus
/// the revision the journal assigned to the change. Revisions are monotonic
/// per entity, so redelivering an already-applied `(id, revision)` pair is a
/// no-op for an idempotent sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedEntity {
    pub id: EntityId,
    pub revision: u64,
}

impl ModifiedEntity {
    pub fn new(id: impl Into<EntityId>, revision: u64) -> Self {
        ModifiedEntity {
            id: id.into(),
            revision,
        }
    }
}

impl fmt::Display for ModifiedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.revision)
    }
}

/// One batch of modified entities, ordered as the journal reported them.
/// Batches may be empty; the end of a stream is signalled by the stream
/// closing, not by an empty batch.
pub type StreamBatch = Vec<ModifiedEntity>;

/// Outcome of delivering one modified entity downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Success,
    Failure,
}

/// Per-element acknowledgment from the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAck {
    pub entity_id: EntityId,
    pub outcome: AckOutcome,
}

impl StreamAck {
    pub fn success(entity_id: impl Into<EntityId>) -> Self {
        StreamAck {
            entity_id: entity_id.into(),
            outcome: AckOutcome::Success,
        }
    }

    pub fn failure(entity_id: impl Into<EntityId>) -> Self {
        StreamAck {
            entity_id: entity_id.into(),
            outcome: AckOutcome::Failure,
        }
    }
}

/// A single element handed to the sink together with the channel the sink
/// acknowledges through. Dropping the sender without answering counts as a
/// failed delivery.
#[derive(Debug)]
pub struct Delivery {
    pub entity: ModifiedEntity,
    pub ack: oneshot::Sender<StreamAck>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_constructors() {
        let ok = StreamAck::success("org.eclipse:thing-1");
        assert_eq!(ok.entity_id.as_str(), "org.eclipse:thing-1");
        assert_eq!(ok.outcome, AckOutcome::Success);

        let failed = StreamAck::failure("org.eclipse:thing-2");
        assert_eq!(failed.outcome, AckOutcome::Failure);
    }

    #[test]
    fn entity_display() {
        let entity = ModifiedEntity::new("org.eclipse:thing-1", 7);
        assert_eq!(entity.to_string(), "org.eclipse:thing-1@7");
    }
}
