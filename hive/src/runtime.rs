//! Worker pool driving actors out of a [`Store`].
//!
//! Each worker repeatedly takes one work item, restores the root actor it
//! targets, fires the message through the tree and commits the collected
//! side effects: new roots go to the store, outgoing messages are routed by
//! their top-level segment, and the actor is either stored again or
//! discarded. Any error on that path is critical and stops the whole pool.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    actor::{Actor, Coroutine},
    address::Address,
    context::{Batch, SpawnRoot},
    debug,
    dispatch::{self, Outcome},
    error,
    errors::RuntimeError,
    info,
    message::{Envelope, Message},
    shuttle::{Shuttles, StoreShuttle},
    snapshot::ActorSnapshot,
    store::Store,
    trace,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Top-level routing segment owned by this runtime
    pub prefix: String,
    pub workers: usize,
    /// Upper bound on how long an idle worker waits before rechecking shutdown
    #[serde(with = "millis")]
    pub poll_interval: Duration,
}

type FailCallback = dyn Fn(&RuntimeError) + Send + Sync;

/// Pool-wide shutdown switch, flipped on request or by the first worker to
/// hit a critical error.
#[derive(Clone, Default)]
pub struct FailListener {
    shutdown: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    callback: Option<Arc<FailCallback>>,
}

pub struct Runtime {
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    shuttles: Arc<Shuttles>,
    listener: FailListener,
    workers: Vec<JoinHandle<()>>,
}

struct Worker {
    prefix: String,
    poll_interval: Duration,
    store: Arc<dyn Store>,
    shuttles: Arc<Shuttles>,
    listener: FailListener,
}

// Implementations

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prefix: "runner".to_string(),
            workers: 4,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl FailListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: impl Fn(&RuntimeError) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
            ..Self::default()
        }
    }

    /// Record a critical failure and stop every worker.
    pub fn fail(&self, err: &RuntimeError) {
        error!("critical failure, stopping worker pool: {err}");

        self.failed.store(true, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(callback) = &self.callback {
            callback(err);
        }
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FailListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailListener")
            .field("stopped", &self.is_stopped())
            .field("failed", &self.is_failed())
            .finish()
    }
}

impl Runtime {
    pub fn start(config: RuntimeConfig, store: Arc<dyn Store>) -> Result<Self, RuntimeError> {
        Self::start_with(config, store, FailListener::new())
    }

    /// Start the pool with a caller-provided listener, e.g. one carrying a
    /// callback for critical failures.
    pub fn start_with(
        config: RuntimeConfig,
        store: Arc<dyn Store>,
        listener: FailListener,
    ) -> Result<Self, RuntimeError> {
        let mut runtime = Self {
            config,
            store,
            shuttles: Arc::new(Shuttles::new()),
            listener,
            workers: Vec::new(),
        };

        for idx in 0..runtime.config.workers.max(1) {
            let worker = Worker {
                prefix: runtime.config.prefix.clone(),
                poll_interval: runtime.config.poll_interval,
                store: runtime.store.clone(),
                shuttles: runtime.shuttles.clone(),
                listener: runtime.listener.clone(),
            };

            let handle = thread::Builder::new()
                .name(format!("{}-worker-{idx}", runtime.config.prefix))
                .spawn(move || worker.run())
                .map_err(RuntimeError::Spawn)?;

            runtime.workers.push(handle);
        }

        info!(
            "runtime {} started with {} workers",
            runtime.config.prefix,
            runtime.workers.len()
        );

        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Outbound shuttles, consulted for every message leaving this runtime.
    pub fn shuttles(&self) -> &Arc<Shuttles> {
        &self.shuttles
    }

    /// Shuttle other runtimes can register to reach this one.
    pub fn inbound(&self) -> StoreShuttle {
        StoreShuttle::new(self.config.prefix.clone(), self.store.clone())
    }

    /// Create root actor `<prefix>:<id>` and queue its priming messages.
    pub fn spawn_root(
        &self,
        id: impl Into<String>,
        body: impl Coroutine,
        priming: Vec<Box<dyn Message>>,
    ) -> Result<Address, RuntimeError> {
        let address = Address::of([self.config.prefix.clone(), id.into()])?;

        let spawn = SpawnRoot {
            address: address.clone(),
            body: Box::new(body),
            priming,
        };

        if !seed(self.store.as_ref(), spawn)? {
            return Err(RuntimeError::DuplicateRoot(address));
        }

        Ok(address)
    }

    /// Enqueue messages addressed to actors of this runtime.
    pub fn send(&self, messages: Vec<Envelope>) -> Result<(), RuntimeError> {
        Ok(self.store.put_messages(messages)?)
    }

    pub fn is_failed(&self) -> bool {
        self.listener.is_failed()
    }

    /// Stop every worker and wait for the in-flight items to be committed.
    pub fn shutdown(&mut self) {
        self.listener.stop();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker of {} panicked", self.config.prefix);
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("shuttles", &self.shuttles)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Worker {
    fn run(self) {
        debug!("worker started");

        while !self.listener.is_stopped() {
            if let Err(e) = self.step() {
                self.listener.fail(&e);
            }
        }

        debug!("worker stopped");
    }

    fn step(&self) -> Result<(), RuntimeError> {
        let Some(work) = self.store.take(self.poll_interval)? else {
            return Ok(());
        };

        let mut root = work.snapshot.restore()?;
        let mut batch = Batch::default();
        let time = Utc::now();
        let inbound = work.message;

        trace!(
            "firing {} from {} to {}",
            inbound.message.type_name(),
            inbound.source,
            inbound.destination
        );

        let mut outcome = dispatch::fire(
            &mut root,
            &mut batch,
            &inbound.source,
            &inbound.destination,
            time,
            inbound.message.as_ref(),
        );

        if !outcome.is_finished() {
            outcome = dispatch::settle(&mut root, &mut batch, time);
        }

        let Batch {
            outgoing, roots, ..
        } = batch;

        for spawn in roots {
            let address = spawn.address.clone();

            if !seed(self.store.as_ref(), spawn)? {
                error!("{} spawned root {address} which already exists", root.address());
                outcome = Outcome::Failed;
                break;
            }
        }

        self.route(outgoing)?;

        match outcome {
            Outcome::Running => {
                let snapshot = ActorSnapshot::capture(&root, work.snapshot.instance)?;
                self.store.put_actor(snapshot)?;
            }
            Outcome::Completed | Outcome::Failed => {
                debug!("{} finished: {outcome:?}", root.address());
                self.store.discard(root.address())?;
            }
        }

        Ok(())
    }

    fn route(&self, outgoing: Vec<Envelope>) -> Result<(), RuntimeError> {
        let mut local = Vec::new();
        let mut remote: FxHashMap<String, Vec<Envelope>> = FxHashMap::default();

        for envelope in outgoing {
            match envelope.destination.element(0) {
                Some(prefix) if prefix == self.prefix => local.push(envelope),
                Some(prefix) => remote.entry(prefix.to_string()).or_default().push(envelope),
                None => debug!("dropping message from {} with empty destination", envelope.source),
            }
        }

        if !local.is_empty() {
            self.store.put_messages(local)?;
        }

        for (prefix, messages) in remote {
            self.shuttles.deliver(&prefix, messages);
        }

        Ok(())
    }
}

/// Store a new root actor, then queue its priming messages from itself.
///
/// Returns `false`, queueing nothing, when the address is already taken.
fn seed(store: &dyn Store, spawn: SpawnRoot) -> Result<bool, RuntimeError> {
    let SpawnRoot {
        address,
        body,
        priming,
    } = spawn;

    let actor = Actor::root_boxed(address.clone(), body);
    if !store.put_actor(ActorSnapshot::fresh(&actor)?)? {
        return Ok(false);
    }

    debug!("spawned root {address}");

    if !priming.is_empty() {
        let messages = priming
            .into_iter()
            .map(|msg| Envelope::boxed(address.clone(), address.clone(), msg))
            .collect();

        store.put_messages(messages)?;
    }

    Ok(true)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
