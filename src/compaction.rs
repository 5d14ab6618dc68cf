//! Compactor (C9): k-way merge of input runs by (key ascending, recency
//! descending), newest-wins duplicate resolution, tombstone suppression
//! only at the terminal level.

use crate::buffer_pool::BufferPool;
use crate::error::Result;
use crate::memtable::Entry;
use crate::metrics::CompactionStats;
use crate::run::{parse_sequence, Lookup, RunReader};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

struct MergeItem {
    key: Vec<u8>,
    lookup: Lookup,
    recency: u64,
    run_idx: usize,
}

impl PartialEq for MergeItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.recency == other.recency
    }
}
impl Eq for MergeItem {}

impl Ord for MergeItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse key order so the smallest key
        // surfaces first, and break ties by largest recency first (newest
        // wins).
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.recency.cmp(&other.recency))
    }
}
impl PartialOrd for MergeItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn recency_of(run: &RunReader) -> u64 {
    run.path()
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_sequence)
        .unwrap_or(0)
}

/// Merge `inputs` (oldest to newest order does not matter; recency is
/// derived from each run's parsed sequence number) into a single output
/// run at `output_path`. Tombstones are dropped when `is_terminal` is set.
///
/// Each input run is read through one lazy iterator (`RunReader::iter_all`);
/// only the item currently at the front of the heap for a given run is ever
/// held in memory, so the merge does not cache input run contents outside
/// the buffer pool.
pub fn compact(
    pool: &Arc<BufferPool>,
    inputs: &[Arc<RunReader>],
    output_path: &std::path::Path,
    is_terminal: bool,
    stats: &CompactionStats,
) -> Result<PathBuf> {
    let recencies: Vec<u64> = inputs.iter().map(|r| recency_of(r)).collect();
    let mut iters: Vec<_> = inputs.iter().map(|run| run.iter_all(pool)).collect();

    let mut heap = BinaryHeap::new();
    for run_idx in 0..iters.len() {
        advance(&mut iters, &recencies, &mut heap, run_idx, stats)?;
    }

    let mut output: Vec<(Vec<u8>, Entry)> = Vec::new();

    while let Some(top) = heap.pop() {
        let mut winner = top;

        // Drain and discard every other entry sharing this key (older
        // versions); keep advancing their source iterators.
        let mut same_key = vec![];
        while let Some(next) = heap.peek() {
            if next.key == winner.key {
                same_key.push(heap.pop().unwrap());
            } else {
                break;
            }
        }
        if !same_key.is_empty() {
            stats
                .duplicates_removed
                .fetch_add(same_key.len() as u64, AtomicOrdering::Relaxed);
            for item in &same_key {
                if item.recency > winner.recency {
                    winner = MergeItem {
                        key: item.key.clone(),
                        lookup: item.lookup.clone(),
                        recency: item.recency,
                        run_idx: item.run_idx,
                    };
                }
            }
            for item in same_key {
                advance(&mut iters, &recencies, &mut heap, item.run_idx, stats)?;
            }
        }

        let keep = !(is_terminal && matches!(winner.lookup, Lookup::Deleted));
        if keep {
            let entry = match winner.lookup {
                Lookup::Value(v) => Entry {
                    value: v,
                    is_deleted: false,
                },
                Lookup::Deleted => Entry {
                    value: Vec::new(),
                    is_deleted: true,
                },
                Lookup::Absent => unreachable!("iter_all never yields Absent"),
            };
            stats.entries_written.fetch_add(1, AtomicOrdering::Relaxed);
            stats.bytes_written.fetch_add(entry.value.len() as u64, AtomicOrdering::Relaxed);
            output.push((winner.key.clone(), entry));
        } else {
            stats.tombstones_removed.fetch_add(1, AtomicOrdering::Relaxed);
        }

        advance(&mut iters, &recencies, &mut heap, winner.run_idx, stats)?;
    }

    crate::run::write_run(output_path, &output)?;
    stats.compactions_performed.fetch_add(1, AtomicOrdering::Relaxed);
    Ok(output_path.to_path_buf())
}

/// Pull the next item from run `run_idx`'s iterator, if any, and push it
/// onto the heap.
fn advance<I>(
    iters: &mut [I],
    recencies: &[u64],
    heap: &mut BinaryHeap<MergeItem>,
    run_idx: usize,
    stats: &CompactionStats,
) -> Result<()>
where
    I: Iterator<Item = Result<(Vec<u8>, Lookup)>>,
{
    if let Some(item) = iters[run_idx].next() {
        let (key, lookup) = item?;
        stats.entries_read.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(MergeItem {
            key,
            lookup,
            recency: recencies[run_idx],
            run_idx,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memtable::Entry as MEntry;

    fn tmp_root(name: &str) -> std::path::PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ridgedb-compact-{pid}-{nanos}-{name}"))
    }

    #[test]
    fn newest_wins_merge() {
        let root = tmp_root("merge");
        std::fs::create_dir_all(&root).unwrap();

        let r1_path = root.join("run_1.sst");
        crate::run::write_run(
            &r1_path,
            &[
                (b"a".to_vec(), MEntry { value: b"1".to_vec(), is_deleted: false }),
                (b"b".to_vec(), MEntry { value: b"2".to_vec(), is_deleted: false }),
                (b"c".to_vec(), MEntry { value: b"3".to_vec(), is_deleted: false }),
            ],
        )
        .unwrap();

        let r2_path = root.join("run_2.sst");
        crate::run::write_run(
            &r2_path,
            &[
                (b"b".to_vec(), MEntry { value: b"22".to_vec(), is_deleted: false }),
                (b"d".to_vec(), MEntry { value: b"4".to_vec(), is_deleted: false }),
            ],
        )
        .unwrap();

        let r1 = Arc::new(RunReader::open(&r1_path).unwrap());
        let r2 = Arc::new(RunReader::open(&r2_path).unwrap());
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));
        let stats = CompactionStats::default();

        let out_path = root.join("run_3.sst");
        compact(&pool, &[r1, r2], &out_path, false, &stats).unwrap();

        let out = RunReader::open(&out_path).unwrap();
        assert_eq!(out.get(&pool, b"a").unwrap(), Lookup::Value(b"1".to_vec()));
        assert_eq!(out.get(&pool, b"b").unwrap(), Lookup::Value(b"22".to_vec()));
        assert_eq!(out.get(&pool, b"c").unwrap(), Lookup::Value(b"3".to_vec()));
        assert_eq!(out.get(&pool, b"d").unwrap(), Lookup::Value(b"4".to_vec()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn tombstone_dropped_at_terminal_level() {
        let root = tmp_root("tombstone");
        std::fs::create_dir_all(&root).unwrap();

        let r_path = root.join("run_1.sst");
        crate::run::write_run(
            &r_path,
            &[
                (b"k1".to_vec(), MEntry { value: b"v".to_vec(), is_deleted: false }),
                (b"k2".to_vec(), MEntry { value: Vec::new(), is_deleted: true }),
                (b"k3".to_vec(), MEntry { value: b"v".to_vec(), is_deleted: false }),
            ],
        )
        .unwrap();

        let r = Arc::new(RunReader::open(&r_path).unwrap());
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));
        let stats = CompactionStats::default();
        let out_path = root.join("run_2.sst");
        compact(&pool, &[r], &out_path, true, &stats).unwrap();

        let out = RunReader::open(&out_path).unwrap();
        assert_eq!(out.entry_count(), 2);
        assert_eq!(out.get(&pool, b"k2").unwrap(), Lookup::Absent);

        let _ = std::fs::remove_dir_all(&root);
    }
}
