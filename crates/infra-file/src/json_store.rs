// JSON File QueueStore Implementation
//
// Durable representation: `{ "queue_name": [message, ...], ... }`.
// Every operation reloads the whole snapshot, validates, mutates and writes it
// back. In-process callers are serialized by a mutex; cooperating processes are
// serialized by an exclusive advisory lock on `<storage_path>.lock`.

use async_trait::async_trait;
use fs2::FileExt;
use scoreq_core::domain::{validate_queue_name, Message, QueueError, QueueInfo, StoreConfig};
use scoreq_core::port::{QueueStore, StoreResult, TimeProvider};
use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

type Snapshot = BTreeMap<String, VecDeque<Message>>;

fn storage_error(context: &str, err: io::Error) -> QueueError {
    QueueError::Storage(format!("{}: {}", context, err))
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub struct JsonFileQueueStore {
    inner: Arc<SnapshotFile>,
}

impl JsonFileQueueStore {
    pub fn new(config: &StoreConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        let path = config.storage_path.clone();
        Self {
            inner: Arc::new(SnapshotFile {
                lock_path: sibling_path(&path, ".lock"),
                tmp_path: sibling_path(&path, ".tmp"),
                path,
                capacity: config.max_messages_per_queue,
                guard: Mutex::new(()),
                time_provider,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run one reload-mutate-persist unit on the blocking pool.
    /// The closure returns `(value, dirty)`; only dirty snapshots are written.
    async fn transact<R, F>(&self, op: F) -> StoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Snapshot, &SnapshotFile) -> StoreResult<(R, bool)> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.transact(op))
            .await
            .map_err(|e| QueueError::Storage(format!("store task failed: {}", e)))?
    }
}

struct SnapshotFile {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
    capacity: usize,
    guard: Mutex<()>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SnapshotFile {
    fn transact<R, F>(&self, op: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Snapshot, &SnapshotFile) -> StoreResult<(R, bool)>,
    {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| QueueError::Storage("store mutex poisoned".to_string()))?;

        let lock_file = self.open_lock_file()?;
        lock_file
            .lock_exclusive()
            .map_err(|e| storage_error("failed to lock queue store", e))?;

        let result = self.load_mutate_save(op);

        if let Err(e) = lock_file.unlock() {
            warn!(path = %self.lock_path.display(), error = %e, "Failed to release store lock");
        }
        result
    }

    fn load_mutate_save<R, F>(&self, op: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Snapshot, &SnapshotFile) -> StoreResult<(R, bool)>,
    {
        let mut snapshot = self.load();
        let (value, dirty) = op(&mut snapshot, self)?;
        if dirty {
            self.save(&snapshot)?;
        }
        Ok(value)
    }

    fn open_lock_file(&self) -> StoreResult<File> {
        self.ensure_parent_dir()?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| storage_error("failed to open lock file", e))
    }

    fn ensure_parent_dir(&self) -> StoreResult<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
                .map_err(|e| storage_error("failed to create storage directory", e)),
            _ => Ok(()),
        }
    }

    /// Missing or unreadable snapshot means "no queues"
    fn load(&self) -> Snapshot {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No queue snapshot yet, starting fresh");
                return Snapshot::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Queue snapshot unreadable, starting fresh");
                return Snapshot::new();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Queue snapshot corrupt, starting fresh");
            Snapshot::new()
        })
    }

    /// Write to a temp file, then rename over the snapshot
    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| QueueError::Storage(format!("failed to serialize snapshot: {}", e)))?;

        let mut tmp = File::create(&self.tmp_path)
            .map_err(|e| storage_error("failed to create snapshot temp file", e))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.sync_all())
            .map_err(|e| storage_error("failed to write snapshot", e))?;
        fs::rename(&self.tmp_path, &self.path)
            .map_err(|e| storage_error("failed to replace snapshot", e))
    }

    fn queue_mut<'a>(snapshot: &'a mut Snapshot, name: &str) -> StoreResult<&'a mut VecDeque<Message>> {
        snapshot
            .get_mut(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn create(&self, name: &str) -> StoreResult<()> {
        validate_queue_name(name)?;
        let name = name.to_string();
        self.transact(move |snapshot, _| {
            if snapshot.contains_key(&name) {
                return Err(QueueError::AlreadyExists(name));
            }
            snapshot.insert(name, VecDeque::new());
            Ok(((), true))
        })
        .await
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.transact(move |snapshot, _| match snapshot.remove(&name) {
            Some(_) => Ok(((), true)),
            None => Err(QueueError::NotFound(name)),
        })
        .await
    }

    async fn push(&self, name: &str, message: Message) -> StoreResult<()> {
        let name = name.to_string();
        self.transact(move |snapshot, file| {
            let capacity = file.capacity;
            let queue = SnapshotFile::queue_mut(snapshot, &name)?;
            if queue.len() >= capacity {
                return Err(QueueError::Full {
                    queue: name,
                    capacity,
                });
            }
            queue.push_back(message.stamped(file.time_provider.now_rfc3339()));
            Ok(((), true))
        })
        .await
    }

    async fn pull(&self, name: &str) -> StoreResult<Message> {
        let name = name.to_string();
        self.transact(move |snapshot, _| {
            let queue = SnapshotFile::queue_mut(snapshot, &name)?;
            match queue.pop_front() {
                Some(msg) => Ok((msg, true)),
                None => Err(QueueError::Empty(name)),
            }
        })
        .await
    }

    async fn len(&self, name: &str) -> StoreResult<usize> {
        let name = name.to_string();
        self.transact(move |snapshot, _| {
            let len = SnapshotFile::queue_mut(snapshot, &name)?.len();
            Ok((len, false))
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<QueueInfo>> {
        self.transact(|snapshot, _| {
            let infos = snapshot
                .iter()
                .map(|(name, queue)| QueueInfo {
                    name: name.clone(),
                    len: queue.len(),
                })
                .collect();
            Ok((infos, false))
        })
        .await
    }

    fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
