use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::{Uuid, uuid};

use crate::{
    address::Address, base::PROJECT_DIRS, debug, errors::StoreError, message::Envelope,
    snapshot::ActorSnapshot,
};

/// Directory of per-actor records backing a [`crate::store::MemoryStore`].
///
/// Each root actor is one postcard file holding its snapshot and pending
/// messages, replaced atomically on every change.
#[derive(Debug, Clone)]
pub struct LocalFs {
    dir: PathBuf,
}

#[derive(Serialize)]
pub(crate) struct SlotRecordRef<'a> {
    pub(crate) snapshot: &'a ActorSnapshot,
    pub(crate) queue: &'a VecDeque<Envelope>,
}

#[derive(Deserialize)]
pub(crate) struct SlotRecord {
    pub(crate) snapshot: ActorSnapshot,
    pub(crate) queue: VecDeque<Envelope>,
}

const EXTENSION: &str = "bin";

/// Namespace of the name-based uuids naming record files.
const RECORD_NAMESPACE: Uuid = uuid!("3e9d0c5a-6b1f-4f27-8c84-0d2a7b5e9f31");

// Implementation

impl LocalFs {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    /// Per-user data directory of this application.
    pub fn project_default() -> Result<Self, StoreError> {
        let dirs = PROJECT_DIRS.as_ref().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory to place actor data in",
            )
        })?;

        Self::new(dirs.data_dir().join("actors"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn write(&self, record: SlotRecordRef<'_>) -> Result<(), StoreError> {
        let bytes = postcard::to_stdvec(&record).map_err(StoreError::Encode)?;

        let path = self.path(&record.snapshot.address);
        let tmp = path.with_extension("tmp");

        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    pub(crate) fn remove(&self, address: &Address) -> Result<(), StoreError> {
        match fs::remove_file(self.path(address)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn load_all(&self) -> Result<Vec<SlotRecord>, StoreError> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }

            let bytes = fs::read(&path)?;
            let record: SlotRecord =
                postcard::from_bytes(&bytes).map_err(|source| StoreError::Corrupted {
                    path: path.display().to_string(),
                    source,
                })?;

            debug!(
                "loaded {} with {} pending messages",
                record.snapshot.address,
                record.queue.len()
            );
            records.push(record);
        }

        Ok(records)
    }

    /// Record file of `address`. Names have a fixed width whatever the
    /// address length; the address itself is stored inside the record.
    fn path(&self, address: &Address) -> PathBuf {
        let id = Uuid::new_v5(&RECORD_NAMESPACE, address.to_string().as_bytes());

        self.dir
            .join(format!("{}.{EXTENSION}", id.as_simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actor::{Actor, Coroutine, Step},
        context::Context,
    };
    use hive_macros::impl_id;

    #[derive(Debug, Serialize, Deserialize)]
    struct Inert;

    #[impl_id("3e9d0c5a-6b1f-4f27-8c84-0d2a7b5e9f32")]
    impl Coroutine for Inert {
        fn resume(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<Step> {
            Ok(Step::Suspend)
        }
    }

    fn snapshot(address: &Address) -> ActorSnapshot {
        ActorSnapshot::fresh(&Actor::root(address.clone(), Inert)).unwrap()
    }

    #[test]
    fn test_long_addresses_fit_in_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();

        let long = Address::of(["runner".to_string(), "x".repeat(300)]).unwrap();
        let longer = long.append_suffix("y".repeat(300)).unwrap();
        let queue = VecDeque::new();

        for address in [&long, &longer] {
            fs.write(SlotRecordRef {
                snapshot: &snapshot(address),
                queue: &queue,
            })
            .unwrap();
        }

        let names = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.len() <= 36));

        let mut loaded = fs
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| r.snapshot.address)
            .collect::<Vec<_>>();
        loaded.sort();
        assert_eq!(loaded, [long.clone(), longer]);

        fs.remove(&long).unwrap();
        assert_eq!(fs.load_all().unwrap().len(), 1);
    }
}
