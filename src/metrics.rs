//! Instance-scoped statistics for the store's subsystems.
//!
//! Counters are atomic because the background compactor and foreground
//! callers both touch them; readers take a relaxed snapshot via `load()`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct BufferPoolStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub disk_reads: AtomicU64,
    pub disk_writes: AtomicU64,
    pub splits: AtomicU64,
    pub directory_expansions: AtomicU64,
}

impl BufferPoolStats {
    pub fn snapshot(&self) -> BufferPoolStatsSnapshot {
        BufferPoolStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            directory_expansions: self.directory_expansions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferPoolStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub splits: u64,
    pub directory_expansions: u64,
}

#[derive(Default)]
pub struct CompactionStats {
    pub entries_read: AtomicU64,
    pub entries_written: AtomicU64,
    pub tombstones_removed: AtomicU64,
    pub duplicates_removed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub compactions_performed: AtomicU64,
}

impl CompactionStats {
    pub fn snapshot(&self) -> CompactionStatsSnapshot {
        CompactionStatsSnapshot {
            entries_read: self.entries_read.load(Ordering::Relaxed),
            entries_written: self.entries_written.load(Ordering::Relaxed),
            tombstones_removed: self.tombstones_removed.load(Ordering::Relaxed),
            duplicates_removed: self.duplicates_removed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            compactions_performed: self.compactions_performed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStatsSnapshot {
    pub entries_read: u64,
    pub entries_written: u64,
    pub tombstones_removed: u64,
    pub duplicates_removed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub compactions_performed: u64,
}

#[derive(Default)]
pub struct StoreStats {
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
    pub gets: AtomicU64,
    pub flushes: AtomicU64,
    pub wal_appends: AtomicU64,
    pub wal_truncations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStatsSnapshot {
    pub puts: u64,
    pub deletes: u64,
    pub gets: u64,
    pub flushes: u64,
    pub wal_appends: u64,
    pub wal_truncations: u64,
    pub buffer_pool: BufferPoolStatsSnapshot,
    pub compaction: CompactionStatsSnapshot,
}

impl StoreStats {
    pub fn snapshot(
        &self,
        pool: &BufferPoolStats,
        compaction: &CompactionStats,
    ) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            wal_appends: self.wal_appends.load(Ordering::Relaxed),
            wal_truncations: self.wal_truncations.load(Ordering::Relaxed),
            buffer_pool: pool.snapshot(),
            compaction: compaction.snapshot(),
        }
    }
}
