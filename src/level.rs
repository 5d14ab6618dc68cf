//! Level Manager (C8): organizes runs into numbered levels with per-level
//! capacity, selects compaction victims, and swaps run sets atomically.

use crate::config::StoreConfig;
use crate::consts::{level_dir_name, run_file_name};
use crate::error::Result;
use crate::run::{parse_sequence, RunReader};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Level {
    runs: Vec<Arc<RunReader>>,
    next_seq: u64,
}

pub struct CompactionTask {
    pub source_level: usize,
    pub target_level: usize,
    pub is_terminal: bool,
    pub inputs: Vec<Arc<RunReader>>,
}

pub struct LevelManager {
    root: PathBuf,
    levels: Vec<Level>,
    level0_max_runs: usize,
    size_ratio: usize,
}

impl LevelManager {
    pub fn open(root: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut levels = Vec::with_capacity(config.max_levels);

        for level_idx in 0..config.max_levels {
            let dir = root.join(level_dir_name(level_idx));
            fs::create_dir_all(&dir)?;

            let mut runs_with_seq = Vec::new();
            let mut max_seq = 0u64;
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let Some(seq) = parse_sequence(&name) else {
                    log::warn!("skipping unrecognized file {name} in {}", dir.display());
                    continue;
                };
                match RunReader::open(entry.path()) {
                    Ok(reader) => {
                        max_seq = max_seq.max(seq);
                        runs_with_seq.push((seq, Arc::new(reader)));
                    }
                    Err(e) => {
                        log::warn!("skipping unreadable run {}: {e}", entry.path().display());
                    }
                }
            }

            if level_idx == 0 {
                runs_with_seq.sort_by_key(|(seq, _)| *seq);
            } else {
                runs_with_seq.sort_by(|a, b| {
                    a.1.min_key().cmp(&b.1.min_key())
                });
            }

            levels.push(Level {
                runs: runs_with_seq.into_iter().map(|(_, r)| r).collect(),
                next_seq: max_seq + 1,
            });
        }

        Ok(Self {
            root,
            levels,
            level0_max_runs: config.level0_max_runs,
            size_ratio: config.size_ratio,
        })
    }

    fn level_capacity(&self, level_idx: usize) -> usize {
        if level_idx == 0 {
            self.level0_max_runs
        } else {
            self.level0_max_runs * self.size_ratio.pow(level_idx as u32)
        }
    }

    /// Flush a freshly written run into level 0 under its canonical name.
    pub fn ingest_level0(&mut self, tmp_path: &Path) -> Result<()> {
        let level = &mut self.levels[0];
        let seq = level.next_seq;
        level.next_seq += 1;
        let dest = self.root.join(level_dir_name(0)).join(run_file_name(seq));
        fs::rename(tmp_path, &dest)?;
        let reader = RunReader::open(&dest)?;
        level.runs.push(Arc::new(reader));
        Ok(())
    }

    /// Return a compaction task if any level violates its trigger. Level 0
    /// is checked first; among levels >= 1 the lowest violating level wins.
    pub fn select_compaction(&self) -> Option<CompactionTask> {
        if self.levels[0].runs.len() >= self.level0_max_runs {
            let target_level = 1.min(self.levels.len() - 1);
            return Some(CompactionTask {
                source_level: 0,
                target_level,
                is_terminal: target_level == self.levels.len() - 1,
                inputs: self.levels[0].runs.clone(),
            });
        }

        for level_idx in 1..self.levels.len() {
            if self.levels[level_idx].runs.len() > self.level_capacity(level_idx) {
                let target_level = (level_idx + 1).min(self.levels.len() - 1);
                return Some(CompactionTask {
                    source_level: level_idx,
                    target_level,
                    is_terminal: target_level == self.levels.len() - 1,
                    inputs: self.levels[level_idx].runs.clone(),
                });
            }
        }
        None
    }

    /// Atomically swap `task`'s inputs for `outputs` in the target level,
    /// then remove the input files. Readers never observe a mixed state
    /// because the level's run vector is replaced in one assignment.
    pub fn install_compaction(
        &mut self,
        task: &CompactionTask,
        outputs: Vec<PathBuf>,
    ) -> Result<()> {
        let target = task.target_level;
        let seq_start = self.levels[target].next_seq;
        let mut new_readers = Vec::with_capacity(outputs.len());
        for (i, tmp_path) in outputs.into_iter().enumerate() {
            let seq = seq_start + i as u64;
            let dest = self.root.join(level_dir_name(target)).join(run_file_name(seq));
            fs::rename(&tmp_path, &dest)?;
            new_readers.push(Arc::new(RunReader::open(&dest)?));
        }
        self.levels[target].next_seq = seq_start + new_readers.len() as u64;

        if task.source_level == target {
            self.levels[target].runs = new_readers;
        } else {
            self.levels[target].runs.extend(new_readers);
            if target != 0 {
                self.levels[target].runs.sort_by(|a, b| a.min_key().cmp(&b.min_key()));
            }
            self.levels[task.source_level].runs.clear();
        }

        for input in &task.inputs {
            let _ = fs::remove_file(input.path());
        }
        Ok(())
    }

    pub fn is_terminal_level(&self, level_idx: usize) -> bool {
        level_idx == self.levels.len() - 1
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Point-lookup candidates: level 0 returns every overlapping run
    /// (newest first), deeper levels at most one run.
    pub fn find_candidates_point(&self, key: &[u8]) -> Vec<(usize, Arc<RunReader>)> {
        let mut out = Vec::new();
        for run in self.levels[0].runs.iter().rev() {
            if run.min_key().map(|m| m <= key).unwrap_or(false)
                && run.max_key().map(|m| m >= key).unwrap_or(false)
            {
                out.push((0, run.clone()));
            }
        }
        for level_idx in 1..self.levels.len() {
            if let Some(run) = self.levels[level_idx]
                .runs
                .iter()
                .find(|r| r.max_key().map(|m| m >= key).unwrap_or(false) && r.min_key().map(|m| m <= key).unwrap_or(false))
            {
                out.push((level_idx, run.clone()));
            }
        }
        out
    }

    pub fn find_candidates_range(&self, start: &[u8], end: &[u8]) -> Vec<(usize, Arc<RunReader>)> {
        let mut out = Vec::new();
        for (level_idx, level) in self.levels.iter().enumerate() {
            for run in &level.runs {
                if run.overlaps(start, end) {
                    out.push((level_idx, run.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root(name: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ridgedb-level-{pid}-{nanos}-{name}"))
    }

    #[test]
    fn level0_trigger_fires_at_threshold() {
        let root = tmp_root("trigger");
        let config = StoreConfig::default().with_level0_max_runs(2).with_max_levels(3);
        let mut mgr = LevelManager::open(&root, &config).unwrap();
        assert!(mgr.select_compaction().is_none());

        for i in 0..2u64 {
            let entries = vec![(
                format!("k{i}").into_bytes(),
                crate::memtable::Entry {
                    value: b"v".to_vec(),
                    is_deleted: false,
                },
            )];
            let tmp = root.join(format!("stage_{i}.sst"));
            crate::run::write_run(&tmp, &entries).unwrap();
            mgr.ingest_level0(&tmp).unwrap();
        }
        assert!(mgr.select_compaction().is_some());
        let _ = fs::remove_dir_all(&root);
    }
}
