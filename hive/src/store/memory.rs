use std::{
    collections::{BTreeSet, VecDeque},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::{
    address::Address,
    debug, error,
    errors::StoreError,
    message::Envelope,
    snapshot::ActorSnapshot,
    store::{
        Store, WorkItem,
        local_fs::{LocalFs, SlotRecordRef},
        root_of,
    },
    trace,
};

/// In-process [`Store`], optionally written through to a [`LocalFs`].
///
/// Actors with pending messages wait in a FIFO ready queue; an actor handed
/// out by [`Store::take`] stays off that queue until it is stored or
/// discarded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    cond: Condvar,
    backing: Option<LocalFs>,
}

#[derive(Debug, Default)]
struct State {
    slots: FxHashMap<Address, Slot>,
    ready: VecDeque<Address>,
    /// Armed checkpoints, earliest first. Mirrors `Slot::deadline`.
    deadlines: BTreeSet<(Instant, Address)>,
}

#[derive(Debug)]
struct Slot {
    snapshot: ActorSnapshot,
    queue: VecDeque<Envelope>,
    in_flight: bool,
    queued: bool,
    deadline: Option<Instant>,
}

// Implementations

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload every actor persisted in `backing` and keep writing through to it.
    pub fn open(backing: LocalFs) -> Result<Self, StoreError> {
        let mut state = State::default();

        for record in backing.load_all()? {
            let address = record.snapshot.address.clone();
            let mut slot = Slot::new(record.snapshot);
            slot.queue = record.queue;

            state.slots.insert(address.clone(), slot);
            state.arm(&address);
            state.mark_ready(&address);
        }

        Ok(Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
            backing: Some(backing),
        })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.state.lock().slots.contains_key(address)
    }

    /// Number of messages waiting for `address`.
    pub fn pending(&self, address: &Address) -> usize {
        self.state
            .lock()
            .slots
            .get(address)
            .map_or(0, |s| s.queue.len())
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, slot: &Slot) -> Result<(), StoreError> {
        match &self.backing {
            Some(fs) => fs.write(SlotRecordRef {
                snapshot: &slot.snapshot,
                queue: &slot.queue,
            }),
            None => Ok(()),
        }
    }
}

impl Store for MemoryStore {
    fn put_actor(&self, mut snapshot: ActorSnapshot) -> Result<bool, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let address = snapshot.address.clone();

        match state.slots.get_mut(&address) {
            Some(slot) if slot.snapshot.instance == snapshot.instance => {
                snapshot.instance += 1;
                slot.snapshot = snapshot;
                slot.in_flight = false;

                self.persist(slot)?;
            }
            // Fresh actor over a live one; the caller decides how to report it
            Some(_) if snapshot.instance == 0 => return Ok(false),
            None if snapshot.instance == 0 => {
                snapshot.instance = 1;
                let slot = Slot::new(snapshot);

                self.persist(&slot)?;
                state.slots.insert(address.clone(), slot);
            }
            Some(slot) => {
                error!(
                    "ignoring stale write of {address}: instance {} persisted, {} offered",
                    slot.snapshot.instance,
                    snapshot.instance
                );
                return Ok(false);
            }
            None => {
                error!(
                    "ignoring write of {address} at instance {}: actor no longer exists",
                    snapshot.instance
                );
                return Ok(false);
            }
        }

        state.arm(&address);
        if state.mark_ready(&address) {
            self.cond.notify_one();
        }

        Ok(true)
    }

    fn put_messages(&self, messages: Vec<Envelope>) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let mut touched = Vec::new();

        for message in messages {
            let Some(root) = root_of(&message.destination) else {
                debug!("dropping message for {}: no root actor", message.destination);
                continue;
            };

            let Some(slot) = state.slots.get_mut(&root) else {
                debug!("dropping message for {}: unknown actor", message.destination);
                continue;
            };

            trace!("queued {} for {root}", message.message.type_name());
            slot.queue.push_back(message);

            if !touched.contains(&root) {
                touched.push(root);
            }
        }

        for root in touched {
            if let Some(slot) = state.slots.get(&root) {
                self.persist(slot)?;
            }

            if state.mark_ready(&root) {
                self.cond.notify_one();
            }
        }

        Ok(())
    }

    fn discard(&self, address: &Address) -> Result<(), StoreError> {
        let mut state = self.state.lock();

        state.disarm(address);
        if state.slots.remove(address).is_some() {
            debug!("discarded {address}");
        }
        state.ready.retain(|a| a != address);

        if let Some(fs) = &self.backing {
            fs.remove(address)?;
        }

        Ok(())
    }

    fn take(&self, timeout: Duration) -> Result<Option<WorkItem>, StoreError> {
        let until = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            let now = Instant::now();
            if state.fire_checkpoints(now) {
                self.cond.notify_all();
            }

            if let Some(work) = state.next_work() {
                return Ok(Some(work));
            }

            if now >= until {
                return Ok(None);
            }

            let wake = state
                .next_deadline()
                .map_or(until, |deadline| deadline.min(until));

            self.cond.wait_until(&mut state, wake);
        }
    }
}

impl State {
    /// Queue `address` for `take` if it is idle with pending messages.
    fn mark_ready(&mut self, address: &Address) -> bool {
        let Some(slot) = self.slots.get_mut(address) else {
            return false;
        };

        if slot.in_flight || slot.queued || slot.queue.is_empty() {
            return false;
        }

        slot.queued = true;
        self.ready.push_back(address.clone());
        true
    }

    /// Restart the checkpoint timer of `address` from now.
    fn arm(&mut self, address: &Address) {
        self.disarm(address);

        let Some(slot) = self.slots.get_mut(address) else {
            return;
        };

        slot.deadline = slot
            .snapshot
            .checkpoint
            .as_ref()
            .map(|c| Instant::now() + Duration::from_millis(c.timeout_ms));

        if let Some(deadline) = slot.deadline {
            self.deadlines.insert((deadline, address.clone()));
        }
    }

    fn disarm(&mut self, address: &Address) {
        if let Some(deadline) = self
            .slots
            .get_mut(address)
            .and_then(|slot| slot.deadline.take())
        {
            self.deadlines.remove(&(deadline, address.clone()));
        }
    }

    fn next_work(&mut self) -> Option<WorkItem> {
        while let Some(address) = self.ready.pop_front() {
            let Some(slot) = self.slots.get_mut(&address) else {
                continue;
            };
            slot.queued = false;

            if slot.in_flight {
                continue;
            }

            let Some(message) = slot.queue.pop_front() else {
                continue;
            };

            slot.in_flight = true;
            let snapshot = slot.snapshot.clone();
            self.disarm(&address);

            return Some(WorkItem { message, snapshot });
        }

        None
    }

    /// Enqueue checkpoint payloads of idle actors whose deadline passed.
    ///
    /// An expired deadline of an actor that already has work is dropped; the
    /// next `put_actor` arms it again.
    fn fire_checkpoints(&mut self, now: Instant) -> bool {
        let mut any = false;

        while let Some((deadline, address)) = self.deadlines.first().cloned() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();

            let Some(slot) = self.slots.get_mut(&address) else {
                continue;
            };
            slot.deadline = None;

            if slot.in_flight || !slot.queue.is_empty() {
                continue;
            }

            let Some(payload) = slot.snapshot.checkpoint.as_ref().map(|c| c.payload.clone()) else {
                continue;
            };

            debug!("checkpoint of {address} expired");
            slot.queue
                .push_back(Envelope::boxed(address.clone(), address.clone(), payload));
            any |= self.mark_ready(&address);
        }

        any
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }
}

impl Slot {
    fn new(snapshot: ActorSnapshot) -> Self {
        Self {
            snapshot,
            queue: VecDeque::new(),
            in_flight: false,
            queued: false,
            deadline: None,
        }
    }
}
