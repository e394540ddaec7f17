use thiserror::Error;

use crate::address::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address segments must not be empty")]
    EmptySegment,
    #[error("dangling escape at end of {0:?}")]
    DanglingEscape(String),
    #[error("{prefix} is not a prefix of {address}")]
    NotPrefix { prefix: Address, address: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("source {source_address} is outside of {this}")]
    ForeignSource {
        this: Address,
        source_address: Address,
    },
    #[error("destination must not be empty")]
    EmptyDestination,
    #[error("child {0} already exists")]
    DuplicateChild(String),
    #[error("invalid spawn id {0:?}")]
    InvalidId(String),
    #[error("checkpoints are only available to root actors")]
    CheckpointOnChild,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode actor {address}: {source}")]
    Encode {
        address: Address,
        source: postcard::Error,
    },
    #[error("failed to decode actor snapshot: {0}")]
    Decode(#[source] postcard::Error),
    #[error("snapshot for {expected} holds actor {found}")]
    Mismatch { expected: Address, found: Address },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupted store record {path}: {source}")]
    Corrupted {
        path: String,
        source: postcard::Error,
    },
    #[error("failed to encode store record: {0}")]
    Encode(postcard::Error),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("root actor {0} already exists")]
    DuplicateRoot(Address),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}
