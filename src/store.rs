//! Store Facade (C10): binds the WAL, memtable, buffer pool, level manager
//! and compactor behind the public put/get/delete/scan surface.

use crate::buffer_pool::BufferPool;
use crate::compaction;
use crate::config::StoreConfig;
use crate::consts::WAL_FILE;
use crate::error::Result;
use crate::level::LevelManager;
use crate::lock::{self, LockGuard};
use crate::memtable::Memtable;
use crate::metrics::{CompactionStats, StoreStats, StoreStatsSnapshot};
use crate::run::Lookup;
use crate::wal::{LogEntry, Wal};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

enum WorkerMsg {
    /// Run compaction rounds until the level manager has nothing left to
    /// compact. Coalesced: a pending `Wake` absorbs further wakes.
    Wake,
    /// Same as `Wake`, but acknowledges completion on the given channel so
    /// the caller can block until the worker has drained.
    WakeAndAck(SyncSender<()>),
    Shutdown,
}

/// Runs compaction on a dedicated background thread so `put`/`delete` never
/// block on a k-way merge, only on the brief level-manager critical
/// sections `select_compaction`/`install_compaction` take internally.
struct CompactionWorker {
    tx: SyncSender<WorkerMsg>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    fn spawn(root: PathBuf, levels: Arc<Mutex<LevelManager>>, pool: Arc<BufferPool>, stats: Arc<CompactionStats>) -> Self {
        let (tx, rx) = sync_channel::<WorkerMsg>(1);
        let handle = std::thread::Builder::new()
            .name("ridgedb-compaction".into())
            .spawn(move || {
                for msg in rx.iter() {
                    let ack = match msg {
                        WorkerMsg::Wake => None,
                        WorkerMsg::WakeAndAck(ack) => Some(ack),
                        WorkerMsg::Shutdown => break,
                    };
                    if let Err(e) = run_compaction_round(&root, &levels, &pool, &stats) {
                        log::error!("background compaction failed: {e}");
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
            })
            .expect("failed to spawn compaction worker thread");
        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Request a compaction pass without blocking the caller. Coalesced: if
    /// a wake is already queued, this one is dropped.
    fn wake(&self) {
        let _ = self.tx.try_send(WorkerMsg::Wake);
    }

    /// Request a compaction pass and block until the worker has finished
    /// it (or the one already in flight). Used by `close()`.
    fn drain_sync(&self) {
        let (ack_tx, ack_rx) = sync_channel(0);
        if self.tx.send(WorkerMsg::WakeAndAck(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One compaction sweep: repeatedly pick and run the next compaction task
/// until the level manager reports none remain.
fn run_compaction_round(
    root: &Path,
    levels: &Mutex<LevelManager>,
    pool: &Arc<BufferPool>,
    stats: &CompactionStats,
) -> Result<()> {
    loop {
        let task = { levels.lock().unwrap().select_compaction() };
        let Some(task) = task else { break };

        log::info!(
            "compacting level {} -> {} ({} inputs, terminal={})",
            task.source_level,
            task.target_level,
            task.inputs.len(),
            task.is_terminal
        );

        let tag = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let tmp_out = root.join(format!(
            "compact-{}-{}-{}.sst.tmp",
            task.source_level, task.target_level, tag
        ));
        compaction::compact(pool, &task.inputs, &tmp_out, task.is_terminal, stats)?;

        let mut levels = levels.lock().unwrap();
        levels.install_compaction(&task, vec![tmp_out])?;
    }
    Ok(())
}

pub struct Store {
    // Dropped first (declaration order): stops the background thread
    // before the lock file and shared state it touches go away.
    worker: CompactionWorker,
    root: PathBuf,
    config: StoreConfig,
    _lock: LockGuard,
    wal: Mutex<Wal>,
    memtable: Mutex<Memtable>,
    levels: Arc<Mutex<LevelManager>>,
    pool: Arc<BufferPool>,
    stats: StoreStats,
    compaction_stats: Arc<CompactionStats>,
}

impl Store {
    pub fn open_default(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(root, StoreConfig::default())
    }

    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let lock = lock::acquire_exclusive_lock(&root)?;

        let pool = Arc::new(BufferPool::new(&config));
        let levels = Arc::new(Mutex::new(LevelManager::open(&root, &config)?));
        let wal = Wal::open(root.join(WAL_FILE))?;
        let replayed = wal.replay()?;
        log::info!("replaying {} wal records from {}", replayed.len(), root.display());

        let compaction_stats = Arc::new(CompactionStats::default());
        let worker = CompactionWorker::spawn(root.clone(), levels.clone(), pool.clone(), compaction_stats.clone());

        let memtable = Memtable::new(config.memtable_byte_budget);
        let store = Self {
            root,
            config,
            _lock: lock,
            wal: Mutex::new(wal),
            memtable: Mutex::new(memtable),
            levels,
            pool,
            stats: StoreStats::default(),
            compaction_stats,
            worker,
        };

        for entry in replayed {
            let still_fits = {
                let mut mt = store.memtable.lock().unwrap();
                match entry {
                    LogEntry::Put { key, value } => mt.put(key, value),
                    LogEntry::Delete { key } => mt.delete(key),
                }
            };
            if !still_fits {
                store.flush_locked()?;
            }
        }
        store.worker.wake();
        Ok(store)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.wal.lock().unwrap().append_put(key, value)?;
        self.stats.wal_appends.fetch_add(1, Ordering::Relaxed);
        self.stats.puts.fetch_add(1, Ordering::Relaxed);

        let still_fits = self.memtable.lock().unwrap().put(key.to_vec(), value.to_vec());
        if !still_fits {
            self.flush_locked()?;
        }
        Ok(true)
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.wal.lock().unwrap().append_delete(key)?;
        self.stats.wal_appends.fetch_add(1, Ordering::Relaxed);
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);

        let still_fits = self.memtable.lock().unwrap().delete(key.to_vec());
        if !still_fits {
            self.flush_locked()?;
        }
        Ok(true)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);

        {
            let mt = self.memtable.lock().unwrap();
            if let Some(v) = mt.get(key) {
                return Ok(Some(v.to_vec()));
            }
            if mt.is_deleted(key) {
                return Ok(None);
            }
        }

        let candidates = self.levels.lock().unwrap().find_candidates_point(key);
        for (_level, run) in candidates {
            match run.get(&self.pool, key)? {
                Lookup::Value(v) => return Ok(Some(v)),
                Lookup::Deleted => return Ok(None),
                Lookup::Absent => continue,
            }
        }
        Ok(None)
    }

    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if start > end {
            return Ok(Vec::new());
        }

        // newest-wins merge keyed by key; memtable entries are freshest.
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        let candidates = self.levels.lock().unwrap().find_candidates_range(start, end);
        // Oldest level first so later inserts (memtable, then newer levels)
        // overwrite in the map.
        let mut ordered = candidates;
        ordered.sort_by_key(|(level, _)| std::cmp::Reverse(*level));
        for (_level, run) in ordered {
            for item in run.scan(&self.pool, start, end) {
                let (key, lookup) = item?;
                match lookup {
                    Lookup::Value(v) => {
                        merged.insert(key, Some(v));
                    }
                    Lookup::Deleted => {
                        merged.insert(key, None);
                    }
                    Lookup::Absent => {}
                }
            }
        }

        {
            let mt = self.memtable.lock().unwrap();
            for (key, entry) in mt.scan(start, end) {
                if entry.is_deleted {
                    merged.insert(key.to_vec(), None);
                } else {
                    merged.insert(key.to_vec(), Some(entry.value.clone()));
                }
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    pub fn flush(&self) -> Result<()> {
        self.flush_locked()
    }

    fn flush_locked(&self) -> Result<()> {
        let entries = {
            let mut mt = self.memtable.lock().unwrap();
            if mt.is_empty() {
                return Ok(());
            }
            mt.drain()
        };

        let tmp_path = self.root.join(format!("flush-{}.sst.tmp", self.tmp_tag()));
        crate::run::write_run(&tmp_path, &entries)?;

        {
            let mut levels = self.levels.lock().unwrap();
            levels.ingest_level0(&tmp_path)?;
        }

        self.wal.lock().unwrap().truncate()?;
        self.stats.wal_truncations.fetch_add(1, Ordering::Relaxed);
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        log::info!("flushed memtable to level 0 ({} entries)", entries.len());

        // Hand off to the background worker; foreground callers only pay
        // for the level-manager critical sections above, not the merge.
        self.worker.wake();
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.flush_locked()?;
        self.worker.drain_sync();
        self.pool.flush_all()
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot(&self.pool.stats, &self.compaction_stats)
    }

    fn tmp_tag(&self) -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }
}
