//! Global deserializer registries for trait objects.
//!
//! Every `#[impl_id("...")]` implementation submits a registration function
//! through `inventory`; the registries below collect them on first use.
//! Trait objects travel as `(ImplId, postcard bytes)`.

use std::{fmt, sync::Arc, sync::LazyLock};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

use crate::{actor::Coroutine, base::ImplId, context::Shortcircuit, error, message::Message};

pub type DeserializeFn<P> = fn(&[u8]) -> Result<P, postcard::Error>;

pub static MESSAGE_REGISTRY: LazyLock<Registry<Box<dyn Message>>> = LazyLock::new(|| {
    let mut registry = Registry::new("message");
    for register_fn in inventory::iter::<RegisterMessageFn> {
        (register_fn.0)(&mut registry);
    }
    registry
});

pub static COROUTINE_REGISTRY: LazyLock<Registry<Box<dyn Coroutine>>> = LazyLock::new(|| {
    let mut registry = Registry::new("coroutine");
    for register_fn in inventory::iter::<RegisterCoroutineFn> {
        (register_fn.0)(&mut registry);
    }
    registry
});

pub static SHORTCIRCUIT_REGISTRY: LazyLock<Registry<Arc<dyn Shortcircuit>>> =
    LazyLock::new(|| {
        let mut registry = Registry::new("shortcircuit");
        for register_fn in inventory::iter::<RegisterShortcircuitFn> {
            (register_fn.0)(&mut registry);
        }
        registry
    });

pub struct RegisterMessageFn(pub fn(&mut Registry<Box<dyn Message>>));
pub struct RegisterCoroutineFn(pub fn(&mut Registry<Box<dyn Coroutine>>));
pub struct RegisterShortcircuitFn(pub fn(&mut Registry<Arc<dyn Shortcircuit>>));

inventory::collect!(RegisterMessageFn);
inventory::collect!(RegisterCoroutineFn);
inventory::collect!(RegisterShortcircuitFn);

pub struct Registry<P> {
    kind: &'static str,
    entries: FxHashMap<ImplId, Entry<P>>,
}

pub struct Entry<P> {
    pub name: &'static str,
    pub deserialize_fn: DeserializeFn<P>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no {kind} registered for {id}")]
    Unregistered { kind: &'static str, id: ImplId },
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: &'static str,
        source: postcard::Error,
    },
}

struct Erased<'a>(&'a dyn erased_serde::Serialize);

// Implementations

impl<P> Registry<P> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, id: ImplId, name: &'static str, deserialize_fn: DeserializeFn<P>) {
        if let Some(existing) = self.entries.get(&id) {
            error!(
                "{} {id} registered by both {} and {name}, keeping {}",
                self.kind,
                existing.name,
                existing.name
            );
            return;
        }

        self.entries.insert(
            id,
            Entry {
                name,
                deserialize_fn,
            },
        );
    }

    pub fn name(&self, id: &ImplId) -> Option<&'static str> {
        self.entries.get(id).map(|e| e.name)
    }

    pub fn contains(&self, id: &ImplId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn decode(&self, id: &ImplId, bytes: &[u8]) -> Result<P, RegistryError> {
        let entry = self.entries.get(id).ok_or(RegistryError::Unregistered {
            kind: self.kind,
            id: *id,
        })?;

        (entry.deserialize_fn)(bytes).map_err(|source| RegistryError::Decode {
            name: entry.name,
            source,
        })
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl Serialize for Erased<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        erased_serde::serialize(self.0, serializer)
    }
}

pub(crate) fn serialize_tagged<S>(
    id: ImplId,
    value: &dyn erased_serde::Serialize,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let bytes = postcard::to_stdvec(&Erased(value)).map_err(ser::Error::custom)?;

    (id, bytes).serialize(serializer)
}

pub(crate) fn deserialize_tagged<'de, D, P>(
    registry: &Registry<P>,
    deserializer: D,
) -> Result<P, D::Error>
where
    D: Deserializer<'de>,
{
    let (id, bytes) = <(ImplId, Vec<u8>)>::deserialize(deserializer)?;

    registry.decode(&id, &bytes).map_err(de::Error::custom)
}
