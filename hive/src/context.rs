use std::{
    collections::{BTreeMap, VecDeque},
    fmt::Debug,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    actor::{Actor, Coroutine},
    address::Address,
    base::{ImplId, TypeTag},
    errors::ContextError,
    message::{Envelope, Message},
    registry::{SHORTCIRCUIT_REGISTRY, deserialize_tagged, serialize_tagged},
    rules::RuleSet,
};

/// What happens to an inbound message destined for a descendant after an
/// intercepting actor suspends. Reset to `Release` after every suspend point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendMode {
    /// Swallow the message
    #[default]
    Release,
    /// Pass the message on to the descendant
    ForwardAndRelease,
    /// Pass the message on, then resume this actor once the descendant is done
    ForwardAndReturn,
}

/// Decision of a [`Shortcircuit`] hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcircuitAction {
    /// Consume the message without running the actor body
    Pass,
    /// Run the actor body as usual
    Process,
    /// Finish the actor without running its body
    Terminate,
}

/// Pre-invocation hook bound to an exact message type.
///
/// Hooks are persisted with their actor, so they must be registered with
/// `#[impl_id("...")]` like actor bodies.
pub trait Shortcircuit: Debug + Send + Sync + erased_serde::Serialize + 'static {
    fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<ShortcircuitAction>;

    #[doc(hidden)]
    fn __impl_id(&self) -> ImplId;

    #[doc(hidden)]
    fn __erased(&self) -> &dyn erased_serde::Serialize;
}

#[derive(Debug, Clone)]
pub(crate) struct Hook(pub(crate) Arc<dyn Shortcircuit>);

/// Payload redelivered by the store when a root actor stays idle too long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub payload: Box<dyn Message>,
    pub timeout_ms: u64,
}

/// Persistent part of an actor's context, one per node of the spawn tree.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextState {
    pub(crate) address: Address,
    pub(crate) rules: RuleSet,
    pub(crate) shortcircuits: BTreeMap<ImplId, Hook>,
    pub(crate) intercept: bool,
    pub(crate) mode: SuspendMode,
    pub(crate) checkpoint: Option<Checkpoint>,
}

/// Side effects collected during one dispatch. Shared by every actor of the
/// tree the message passes through, so output order follows call order.
#[derive(Debug, Default)]
pub struct Batch {
    pub outgoing: Vec<Envelope>,
    pub children: VecDeque<SpawnChild>,
    pub roots: Vec<SpawnRoot>,
}

#[derive(Debug)]
pub struct SpawnChild {
    pub parent: Address,
    pub id: String,
    pub body: Box<dyn Coroutine>,
    pub priming: Vec<Box<dyn Message>>,
}

#[derive(Debug)]
pub struct SpawnRoot {
    pub address: Address,
    pub body: Box<dyn Coroutine>,
    pub priming: Vec<Box<dyn Message>>,
}

/// Handle given to an actor body (or hook) for the duration of one invocation.
pub struct Context<'a> {
    state: &'a mut ContextState,
    batch: &'a mut Batch,
    children: &'a BTreeMap<String, Actor>,
    is_root: bool,
    source: &'a Address,
    destination: &'a Address,
    time: DateTime<Utc>,
    message: &'a dyn Message,
}

// Implementations

impl SuspendMode {
    pub fn forwards(self) -> bool {
        !matches!(self, SuspendMode::Release)
    }
}

impl ContextState {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            rules: RuleSet::default(),
            shortcircuits: BTreeMap::new(),
            intercept: false,
            mode: SuspendMode::Release,
            checkpoint: None,
        }
    }
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.children.is_empty() && self.roots.is_empty()
    }
}

impl<'a> Context<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: &'a mut ContextState,
        batch: &'a mut Batch,
        children: &'a BTreeMap<String, Actor>,
        is_root: bool,
        source: &'a Address,
        destination: &'a Address,
        time: DateTime<Utc>,
        message: &'a dyn Message,
    ) -> Self {
        Self {
            state,
            batch,
            children,
            is_root,
            source,
            destination,
            time,
            message,
        }
    }

    pub fn address(&self) -> &Address {
        &self.state.address
    }

    pub fn source(&self) -> &Address {
        self.source
    }

    pub fn destination(&self) -> &Address {
        self.destination
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn message(&self) -> &dyn Message {
        self.message
    }

    /// The current message if it is exactly a `T`.
    pub fn message_as<T: Message>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Whether the current message was addressed to this actor rather than
    /// one of its descendants.
    pub fn is_addressed(&self) -> bool {
        self.state.address == *self.destination
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children.contains_key(id)
            || self
                .batch
                .children
                .iter()
                .any(|c| c.parent == self.state.address && c.id == id)
    }

    /// Queue `message` from this actor to `destination`.
    pub fn out(&mut self, destination: Address, message: impl Message) -> Result<(), ContextError> {
        let source = self.state.address.clone();
        self.out_boxed(source, destination, Box::new(message))
    }

    /// Queue `message` with a source inside this actor's subtree.
    pub fn out_from(
        &mut self,
        source: Address,
        destination: Address,
        message: impl Message,
    ) -> Result<(), ContextError> {
        self.out_boxed(source, destination, Box::new(message))
    }

    pub fn out_boxed(
        &mut self,
        source: Address,
        destination: Address,
        message: Box<dyn Message>,
    ) -> Result<(), ContextError> {
        if !self.state.address.is_prefix_of(&source) {
            return Err(ContextError::ForeignSource {
                this: self.state.address.clone(),
                source_address: source,
            });
        }

        if destination.is_empty() {
            return Err(ContextError::EmptyDestination);
        }

        self.batch
            .outgoing
            .push(Envelope::boxed(source, destination, message));

        Ok(())
    }

    /// Queue creation of a standalone actor next to the root of this tree.
    pub fn root(
        &mut self,
        id: impl Into<String>,
        body: impl Coroutine,
        priming: Vec<Box<dyn Message>>,
    ) -> Result<Address, ContextError> {
        let id = id.into();
        let address = self
            .state
            .address
            .head(1)
            .append_suffix(id.clone())
            .map_err(|_| ContextError::InvalidId(id))?;

        self.batch.roots.push(SpawnRoot {
            address: address.clone(),
            body: Box::new(body),
            priming,
        });

        Ok(address)
    }

    /// Queue creation of a child of this actor.
    pub fn child(
        &mut self,
        id: impl Into<String>,
        body: impl Coroutine,
        priming: Vec<Box<dyn Message>>,
    ) -> Result<Address, ContextError> {
        let id = id.into();
        let address = self
            .state
            .address
            .append_suffix(id.clone())
            .map_err(|_| ContextError::InvalidId(id.clone()))?;

        if self.has_child(&id) {
            return Err(ContextError::DuplicateChild(id));
        }

        self.batch.children.push_back(SpawnChild {
            parent: self.state.address.clone(),
            id,
            body: Box::new(body),
            priming,
        });

        Ok(address)
    }

    pub fn intercept(&mut self, flag: bool) {
        self.state.intercept = flag;
    }

    pub fn mode(&mut self, mode: SuspendMode) {
        self.state.mode = mode;
    }

    /// Install (or remove, with `None`) the hook for messages of exactly `type_id`.
    pub fn shortcircuit(&mut self, type_id: ImplId, hook: Option<Arc<dyn Shortcircuit>>) {
        match hook {
            Some(hook) => {
                self.state.shortcircuits.insert(type_id, Hook(hook));
            }
            None => {
                self.state.shortcircuits.remove(&type_id);
            }
        }
    }

    /// Typed shorthand for [`Context::shortcircuit`].
    pub fn shortcircuit_on<T: Message + TypeTag>(&mut self, hook: impl Shortcircuit) {
        self.shortcircuit(T::IMPL_ID, Some(Arc::new(hook)));
    }

    pub fn rules(&mut self) -> &mut RuleSet {
        &mut self.state.rules
    }

    /// Ask the store to redeliver `payload` if nothing arrives within `timeout`.
    pub fn checkpoint(
        &mut self,
        payload: impl Message,
        timeout: Duration,
    ) -> Result<(), ContextError> {
        if !self.is_root {
            return Err(ContextError::CheckpointOnChild);
        }

        self.state.checkpoint = Some(Checkpoint {
            payload: Box::new(payload),
            timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
        });

        Ok(())
    }

    pub fn clear_checkpoint(&mut self) {
        self.state.checkpoint = None;
    }
}

impl Serialize for Hook {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_tagged(self.0.__impl_id(), self.0.__erased(), serializer)
    }
}

impl<'de> Deserialize<'de> for Hook {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_tagged(&SHORTCIRCUIT_REGISTRY, deserializer).map(Hook)
    }
}
