//! Routing of one inbound message through an actor tree.
//!
//! [`fire`] walks from the root towards the destination, offering the
//! message to intercepting ancestors on the way, and advances the bodies it
//! reaches by one step. [`settle`] then attaches the children spawned during
//! that walk and feeds them their priming messages. Neither function fails:
//! actor errors are classified into an [`Outcome`] and logged.

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};

use crate::{
    actor::{Actor, Step},
    address::Address,
    base::panic_msg,
    context::{Batch, Context, ShortcircuitAction, SuspendMode},
    debug, error,
    message::Message,
    rules::Verdict,
    trace, warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The tree is still alive
    Running,
    /// The node finished normally
    Completed,
    /// A body failed; the whole root tree must be torn down
    Failed,
}

#[derive(Clone, Copy)]
struct Inbound<'a> {
    source: &'a Address,
    destination: &'a Address,
    time: DateTime<Utc>,
    message: &'a dyn Message,
}

// Implementations

impl Outcome {
    pub fn is_finished(self) -> bool {
        !matches!(self, Outcome::Running)
    }
}

/// Dispatch `message` from `source` to `destination` through the tree rooted at `root`.
pub fn fire(
    root: &mut Actor,
    batch: &mut Batch,
    source: &Address,
    destination: &Address,
    time: DateTime<Utc>,
    message: &dyn Message,
) -> Outcome {
    debug_assert!(root.is_root(), "fire must start at a root actor");

    let inbound = Inbound {
        source,
        destination,
        time,
        message,
    };

    fire_recurse(root, batch, inbound)
}

/// Attach children queued in `batch` and deliver their priming messages,
/// until no more children are pending.
pub fn settle(root: &mut Actor, batch: &mut Batch, time: DateTime<Utc>) -> Outcome {
    while let Some(spawn) = batch.children.pop_front() {
        let Some(parent) = root.find_mut(&spawn.parent) else {
            warn!(
                "dropping child {} of {}: parent no longer exists",
                spawn.id, spawn.parent
            );
            continue;
        };

        if parent.children.contains_key(&spawn.id) {
            error!("{} already has a child named {}", spawn.parent, spawn.id);
            return Outcome::Failed;
        }

        let address = match spawn.parent.append_suffix(spawn.id.clone()) {
            Ok(address) => address,
            Err(e) => {
                error!("invalid child id {:?} under {}: {e}", spawn.id, spawn.parent);
                return Outcome::Failed;
            }
        };

        debug!("attaching child {address}");
        parent.children.insert(
            spawn.id,
            Actor::child(address.clone(), spawn.parent, spawn.body),
        );

        for msg in spawn.priming {
            let inbound = Inbound {
                source: &address,
                destination: &address,
                time,
                message: msg.as_ref(),
            };

            match deliver(root, batch, inbound) {
                Outcome::Running => {}
                // Completed at root level can not happen for a child target
                Outcome::Completed | Outcome::Failed => return Outcome::Failed,
            }

            if root.find(&address).is_none() {
                debug!("{address} finished while priming");
                break;
            }
        }
    }

    Outcome::Running
}

fn fire_recurse(node: &mut Actor, batch: &mut Batch, inbound: Inbound<'_>) -> Outcome {
    if node.state.address == *inbound.destination {
        node.state.mode = SuspendMode::Release;
        return invoke(node, batch, inbound);
    }

    if !node.state.address.is_prefix_of(inbound.destination) {
        warn!(
            "{} can not route message for {}",
            node.state.address, inbound.destination
        );
        return Outcome::Running;
    }

    let intercepted = node.state.intercept;

    if intercepted {
        node.state.mode = SuspendMode::Release;

        match invoke(node, batch, inbound) {
            Outcome::Running => {}
            finished => return finished,
        }

        if !node.state.mode.forwards() {
            trace!("{} swallowed message for {}", node.state.address, inbound.destination);
            return Outcome::Running;
        }
    }

    let regain = intercepted && node.state.mode == SuspendMode::ForwardAndReturn;

    match inbound.destination.element(node.state.address.len()) {
        Some(id) => match node.children.get_mut(id) {
            Some(child) => match fire_recurse(child, batch, inbound) {
                Outcome::Running => {}
                Outcome::Completed => {
                    debug!("removing finished child {}:{id}", node.state.address);
                    node.children.remove(id);
                }
                Outcome::Failed => return Outcome::Failed,
            },
            None => debug!(
                "{} has no child {id}, dropping message for {}",
                node.state.address, inbound.destination
            ),
        },
        None => unreachable!("destination is strictly below this node"),
    }

    if regain {
        node.state.mode = SuspendMode::Release;

        match invoke(node, batch, inbound) {
            Outcome::Running => {}
            finished => return finished,
        }

        if node.state.mode.forwards() {
            error!(
                "{} requested another forward after regaining control, terminating",
                node.state.address
            );
            node.state.mode = SuspendMode::Release;
            return Outcome::Failed;
        }
    }

    node.state.mode = SuspendMode::Release;
    Outcome::Running
}

/// Invoke the node at `inbound.destination` directly, bypassing intercepting ancestors.
fn deliver(node: &mut Actor, batch: &mut Batch, inbound: Inbound<'_>) -> Outcome {
    if node.state.address == *inbound.destination {
        node.state.mode = SuspendMode::Release;
        return invoke(node, batch, inbound);
    }

    let Some(id) = inbound.destination.element(node.state.address.len()) else {
        return Outcome::Running;
    };

    let Some(child) = node.children.get_mut(id) else {
        return Outcome::Running;
    };

    match deliver(child, batch, inbound) {
        Outcome::Completed => {
            node.children.remove(id);
            Outcome::Running
        }
        outcome => outcome,
    }
}

fn invoke(node: &mut Actor, batch: &mut Batch, inbound: Inbound<'_>) -> Outcome {
    let type_id = inbound.message.impl_id();

    if node.state.rules.evaluate(inbound.source, type_id) == Verdict::Reject {
        warn!(
            "{} rejected {} from {}",
            node.state.address,
            inbound.message.type_name(),
            inbound.source
        );
        return Outcome::Running;
    }

    let hook = node.state.shortcircuits.get(&type_id).map(|h| h.0.clone());

    let Actor {
        state,
        body,
        parent,
        children,
    } = node;

    let address = state.address.clone();
    let mut ctx = Context::new(
        state,
        batch,
        children,
        parent.is_none(),
        inbound.source,
        inbound.destination,
        inbound.time,
        inbound.message,
    );

    let res = catch_unwind(AssertUnwindSafe(|| match hook {
        None => body.resume(&mut ctx),
        Some(hook) => match hook.call(&mut ctx)? {
            ShortcircuitAction::Pass => Ok(Step::Suspend),
            ShortcircuitAction::Process => body.resume(&mut ctx),
            ShortcircuitAction::Terminate => Ok(Step::Complete),
        },
    }));

    match res {
        Ok(Ok(Step::Suspend)) => Outcome::Running,
        Ok(Ok(Step::Complete)) => {
            debug!("{address} completed");
            Outcome::Completed
        }
        Ok(Err(e)) => {
            error!("{address} failed: {e:#}");
            Outcome::Failed
        }
        Err(payload) => {
            error!("{address} panicked: {}", panic_msg(payload));
            Outcome::Failed
        }
    }
}
