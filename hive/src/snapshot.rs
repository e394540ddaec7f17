//! Serialization boundary between live actor trees and the store.
//!
//! An actor tree is encoded with postcard as a whole: bodies, contexts, rule
//! sets, hooks and children. Trait objects inside it are resolved through
//! the registries in [`crate::registry`], so decoding fails if a type id is
//! unknown to this binary. A failed snapshot is never retried.

use serde::{Deserialize, Serialize};

use crate::{actor::Actor, address::Address, context::Checkpoint, errors::SnapshotError};

/// A persisted root actor as exchanged with a [`crate::store::Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub address: Address,
    /// Optimistic concurrency token, see [`crate::store::Store::put_actor`]
    pub instance: u64,
    pub checkpoint: Option<Checkpoint>,
    pub data: Vec<u8>,
}

pub fn serialize(actor: &Actor) -> Result<Vec<u8>, SnapshotError> {
    postcard::to_stdvec(actor).map_err(|source| SnapshotError::Encode {
        address: actor.address().clone(),
        source,
    })
}

pub fn deserialize(bytes: &[u8]) -> Result<Actor, SnapshotError> {
    postcard::from_bytes(bytes).map_err(SnapshotError::Decode)
}

// Implementations

impl ActorSnapshot {
    /// Snapshot of a brand new root actor.
    pub fn fresh(actor: &Actor) -> Result<Self, SnapshotError> {
        Self::capture(actor, 0)
    }

    pub fn capture(actor: &Actor, instance: u64) -> Result<Self, SnapshotError> {
        Ok(Self {
            address: actor.address().clone(),
            instance,
            checkpoint: actor.checkpoint().cloned(),
            data: serialize(actor)?,
        })
    }

    pub fn restore(&self) -> Result<Actor, SnapshotError> {
        let actor = deserialize(&self.data)?;

        if actor.address() != &self.address {
            return Err(SnapshotError::Mismatch {
                expected: self.address.clone(),
                found: actor.address().clone(),
            });
        }

        Ok(actor)
    }
}
