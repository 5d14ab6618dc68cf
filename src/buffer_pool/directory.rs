//! Extendible-hash directory mapping page identities to buffer-pool frame
//! slots (C3, spec step sequence for insertion with splits).

use crate::error::{Error, Result};
use crate::hash::{directory_index, hash_page_id};
use crate::page::PageId;

struct Bucket {
    entries: Vec<(PageId, usize)>,
    local_depth: u32,
}

impl Bucket {
    fn new(local_depth: u32) -> Self {
        Self {
            entries: Vec::new(),
            local_depth,
        }
    }

    fn is_full(&self, capacity: usize) -> bool {
        self.entries.len() >= capacity
    }
}

pub struct Directory {
    buckets: Vec<Bucket>,
    /// directory[i] is an index into `buckets`.
    slots: Vec<usize>,
    global_depth: u32,
    bucket_capacity: usize,
    max_global_depth: u32,
    splits: u64,
    expansions: u64,
}

pub enum InsertOutcome {
    Inserted,
    /// Directory is at max depth and the target bucket is still full; the
    /// caller must evict a page and retry.
    NeedsEviction,
}

impl Directory {
    pub fn new(initial_global_depth: u32, bucket_capacity: usize, max_global_depth: u32) -> Self {
        let global_depth = initial_global_depth.min(max_global_depth);
        let bucket_count = 1usize << global_depth;
        let buckets = (0..bucket_count).map(|_| Bucket::new(global_depth)).collect();
        let slots = (0..bucket_count).collect();
        Self {
            buckets,
            slots,
            global_depth,
            bucket_capacity,
            max_global_depth,
            splits: 0,
            expansions: 0,
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Cumulative count of bucket splits performed since construction.
    pub fn splits(&self) -> u64 {
        self.splits
    }

    /// Cumulative count of directory doublings performed since construction.
    pub fn expansions(&self) -> u64 {
        self.expansions
    }

    pub fn directory_len(&self) -> usize {
        self.slots.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn slot_for(&self, page_id: &PageId) -> usize {
        directory_index(hash_page_id(page_id), self.global_depth)
    }

    pub fn find(&self, page_id: &PageId) -> Option<usize> {
        let slot = self.slot_for(page_id);
        let bucket = &self.buckets[self.slots[slot]];
        bucket
            .entries
            .iter()
            .find(|(id, _)| id == page_id)
            .map(|(_, frame)| *frame)
    }

    pub fn remove(&mut self, page_id: &PageId) {
        let slot = self.slot_for(page_id);
        let bucket = &mut self.buckets[self.slots[slot]];
        bucket.entries.retain(|(id, _)| id != page_id);
    }

    /// Insert `(page_id, frame)`. Splits the target bucket (and expands the
    /// directory first if necessary) when full, per spec step sequence:
    /// 1. locate bucket 2. append if room 3. split if local<global
    /// 4. expand directory then split if local==global 5. give up if at
    /// max depth and still full (signal eviction).
    pub fn insert(&mut self, page_id: PageId, frame: usize) -> Result<InsertOutcome> {
        loop {
            let slot = self.slot_for(&page_id);
            let bucket_idx = self.slots[slot];

            if !self.buckets[bucket_idx].is_full(self.bucket_capacity) {
                self.buckets[bucket_idx].entries.push((page_id, frame));
                return Ok(InsertOutcome::Inserted);
            }

            let local_depth = self.buckets[bucket_idx].local_depth;
            if local_depth < self.global_depth {
                self.split_bucket(bucket_idx);
                continue;
            }

            if self.global_depth < self.max_global_depth {
                self.expand_directory();
                continue;
            }

            return Ok(InsertOutcome::NeedsEviction);
        }
    }

    fn expand_directory(&mut self) {
        let old_len = self.slots.len();
        self.slots.extend_from_within(0..old_len);
        self.global_depth += 1;
        self.expansions += 1;
    }

    fn split_bucket(&mut self, bucket_idx: usize) {
        self.splits += 1;
        let new_depth = self.buckets[bucket_idx].local_depth + 1;
        self.buckets[bucket_idx].local_depth = new_depth;
        let new_bucket_idx = self.buckets.len();
        self.buckets.push(Bucket::new(new_depth));

        let old_entries = std::mem::take(&mut self.buckets[bucket_idx].entries);
        let bit = 1u64 << (new_depth - 1);
        let (keep, moved): (Vec<_>, Vec<_>) = old_entries
            .into_iter()
            .partition(|(id, _)| hash_page_id(id) & bit == 0);
        self.buckets[bucket_idx].entries = keep;
        self.buckets[new_bucket_idx].entries = moved;

        for (slot_idx, bucket_ref) in self.slots.iter_mut().enumerate() {
            if *bucket_ref != bucket_idx {
                continue;
            }
            if (slot_idx as u64) & bit != 0 {
                *bucket_ref = new_bucket_idx;
            }
        }
    }

    pub fn check_invariants(&self) -> Result<()> {
        if self.slots.len() != 1usize << self.global_depth {
            return Err(Error::invariant("directory size does not match 2^global_depth"));
        }
        for bucket in &self.buckets {
            if bucket.local_depth > self.global_depth {
                return Err(Error::invariant("bucket local_depth exceeds global_depth"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u64) -> PageId {
        PageId::new("f", n * crate::consts::PAGE_SIZE).unwrap()
    }

    #[test]
    fn insert_find_remove() {
        let mut dir = Directory::new(1, 2, 4);
        dir.insert(pid(0), 100).unwrap();
        assert_eq!(dir.find(&pid(0)), Some(100));
        dir.remove(&pid(0));
        assert_eq!(dir.find(&pid(0)), None);
    }

    #[test]
    fn grows_under_pressure() {
        let mut dir = Directory::new(1, 2, 6);
        for i in 0..64u64 {
            match dir.insert(pid(i), i as usize) {
                Ok(InsertOutcome::Inserted) => {}
                Ok(InsertOutcome::NeedsEviction) => break,
                Err(e) => panic!("{e}"),
            }
        }
        dir.check_invariants().unwrap();
        assert!(dir.global_depth() >= 1);
    }
}
