use std::{collections::BTreeMap, fmt::Debug};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    address::Address,
    base::ImplId,
    context::{Checkpoint, Context, ContextState},
    registry::{COROUTINE_REGISTRY, deserialize_tagged, serialize_tagged},
    rules::RuleSet,
};

/// Outcome of advancing an actor body by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait for the next message
    Suspend,
    /// The actor is done and will be removed
    Complete,
}

/// Resumable body of an actor.
///
/// A body is a plain state machine: its fields are the locals that survive a
/// suspension, and each call to [`Coroutine::resume`] runs until the next
/// suspension point. Because the whole state is data, persisting an actor is
/// ordinary serialization.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Echo {
///     counter: u64,
/// }
///
/// #[impl_id("6c0a1f7e-5f0e-4c43-8a9e-3f0f2d7b1e10")]
/// impl Coroutine for Echo {
///     fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
///         if let Some(msg) = ctx.message_as::<String>() {
///             let reply = format!("echo {}:{msg}", self.counter);
///             ctx.out(ctx.source().clone(), reply)?;
///             self.counter += 1;
///         }
///         Ok(Step::Suspend)
///     }
/// }
/// ```
///
/// Errors and panics are fatal to the whole tree the actor belongs to.
pub trait Coroutine: Debug + Send + erased_serde::Serialize + 'static {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step>;

    #[doc(hidden)]
    fn __impl_id(&self) -> ImplId;

    #[doc(hidden)]
    fn __erased(&self) -> &dyn erased_serde::Serialize;
}

/// One node of an actor tree: a body, its context and owned children.
///
/// A root exclusively owns its subtree. Children only keep the address of
/// their parent.
#[derive(Debug, Serialize, Deserialize)]
pub struct Actor {
    pub(crate) state: ContextState,
    pub(crate) body: Box<dyn Coroutine>,
    pub(crate) parent: Option<Address>,
    pub(crate) children: BTreeMap<String, Actor>,
}

// Implementations

impl Actor {
    pub fn root(address: Address, body: impl Coroutine) -> Self {
        Self::root_boxed(address, Box::new(body))
    }

    pub fn root_boxed(address: Address, body: Box<dyn Coroutine>) -> Self {
        Self {
            state: ContextState::new(address),
            body,
            parent: None,
            children: BTreeMap::new(),
        }
    }

    pub(crate) fn child(address: Address, parent: Address, body: Box<dyn Coroutine>) -> Self {
        Self {
            state: ContextState::new(address),
            body,
            parent: Some(parent),
            children: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.state.address
    }

    pub fn parent(&self) -> Option<&Address> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn body(&self) -> &dyn Coroutine {
        self.body.as_ref()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.state.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.state.rules
    }

    pub fn is_intercepting(&self) -> bool {
        self.state.intercept
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.state.checkpoint.as_ref()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Actor)> {
        self.children.iter().map(|(id, c)| (id.as_str(), c))
    }

    pub fn get_child(&self, id: &str) -> Option<&Actor> {
        self.children.get(id)
    }

    /// Find the node at `address` in this subtree.
    pub fn find(&self, address: &Address) -> Option<&Actor> {
        let relative = address.remove_prefix(self.address()).ok()?;

        relative
            .elements()
            .try_fold(self, |node, id| node.children.get(id))
    }

    pub fn find_mut(&mut self, address: &Address) -> Option<&mut Actor> {
        let relative = address.remove_prefix(self.address()).ok()?;

        relative
            .elements()
            .try_fold(self, |node, id| node.children.get_mut(id))
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn tree_size(&self) -> usize {
        1 + self.children.values().map(Actor::tree_size).sum::<usize>()
    }
}

impl Serialize for dyn Coroutine {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_tagged(self.__impl_id(), self.__erased(), serializer)
    }
}

impl<'de> Deserialize<'de> for Box<dyn Coroutine> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_tagged(&COROUTINE_REGISTRY, deserializer)
    }
}
