extern crate self as hive;

pub mod actor;
pub mod address;
pub mod base;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod message;
pub mod registry;
pub mod rules;
pub mod runtime;
pub mod shuttle;
pub mod snapshot;
pub mod store;

// Re-exports

pub use hive_macros::impl_id;

#[doc(hidden)]
pub mod __private {
    pub use erased_serde;
    pub use inventory;
    pub use postcard;
    pub use uuid;
}

pub mod prelude {
    pub use crate::actor::{Actor, Coroutine, Step};
    pub use crate::address::Address;
    pub use crate::base::{ImplId, TypeTag};
    pub use crate::context::{Context, Shortcircuit, ShortcircuitAction, SuspendMode};
    pub use crate::errors::{ContextError, RuntimeError};
    pub use crate::message::{Envelope, Message};
    pub use crate::rules::RuleSet;
    pub use crate::runtime::{FailListener, Runtime, RuntimeConfig};
    pub use crate::shuttle::{ChannelShuttle, Shuttle};
    pub use crate::store::{LocalFs, MemoryStore, Store};

    pub use hive_macros::impl_id;
}
