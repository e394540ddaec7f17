//! Persistence and work queue contract for the runtime.

pub mod local_fs;
pub mod memory;

// Re-exports
pub use local_fs::LocalFs;
pub use memory::MemoryStore;

use std::time::Duration;

use crate::{address::Address, errors::StoreError, message::Envelope, snapshot::ActorSnapshot};

/// Number of leading segments naming a root actor: `<runtime prefix>:<id>`.
pub const ROOT_DEPTH: usize = 2;

/// One invocation opportunity: a message and the actor it targets.
#[derive(Debug)]
pub struct WorkItem {
    pub message: Envelope,
    pub snapshot: ActorSnapshot,
}

/// Pluggable persistence and queueing for root actors.
///
/// Implementations own all cross-worker coordination. In particular `take`
/// must never hand out a second item for an actor until the first one has
/// been answered with `put_actor` or `discard`.
pub trait Store: Send + Sync {
    /// Upsert a root actor. The write is accepted only when
    /// `snapshot.instance` equals the persisted instance (0 for an actor that
    /// does not exist yet). Refused writes are not errors; the return value
    /// tells whether the snapshot was stored.
    fn put_actor(&self, snapshot: ActorSnapshot) -> Result<bool, StoreError>;

    /// Enqueue messages for their destination root actors. Messages for
    /// unknown actors are dropped.
    fn put_messages(&self, messages: Vec<Envelope>) -> Result<(), StoreError>;

    /// Remove everything persisted for a root actor.
    fn discard(&self, address: &Address) -> Result<(), StoreError>;

    /// Wait up to `timeout` for work on an actor that is not in flight.
    fn take(&self, timeout: Duration) -> Result<Option<WorkItem>, StoreError>;
}

/// Root actor owning `address`, if the address is deep enough to name one.
pub fn root_of(address: &Address) -> Option<Address> {
    (address.len() >= ROOT_DEPTH).then(|| address.head(ROOT_DEPTH))
}
