//! Buffer pool (C3): bounded cache of pages keyed by `PageId`, backed by an
//! extendible-hash directory for residency lookup and an LRU list for
//! eviction among unpinned pages.

mod directory;
mod lru;

use crate::block_io::BlockFile;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::metrics::BufferPoolStats;
use crate::page::{Page, PageId};
use directory::{Directory, InsertOutcome};
use lru::Lru;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Frame {
    page: Page,
}

struct Inner {
    frames: Vec<Option<Frame>>,
    free_slots: Vec<usize>,
    directory: Directory,
    lru: Lru,
    open_files: HashMap<PathBuf, BlockFile>,
    use_aligned_io: bool,
    max_pages: usize,
    resident: usize,
}

pub struct BufferPool {
    inner: Mutex<Inner>,
    pub stats: BufferPoolStats,
}

/// A pinned handle to a resident page. Must be released via
/// `BufferPool::release` exactly once.
#[derive(Debug)]
pub struct PageRef {
    pub id: PageId,
    frame: usize,
}

impl BufferPool {
    pub fn new(config: &StoreConfig) -> Self {
        let directory = Directory::new(
            config.initial_global_depth,
            config.bucket_capacity,
            config.max_global_depth,
        );
        Self {
            inner: Mutex::new(Inner {
                frames: Vec::new(),
                free_slots: Vec::new(),
                directory,
                lru: Lru::new(),
                open_files: HashMap::new(),
                use_aligned_io: config.use_aligned_io,
                max_pages: config.buffer_pool_max_pages,
                resident: 0,
            }),
            stats: BufferPoolStats::default(),
        }
    }

    /// Load (or fetch resident) page and return a pinned reference.
    pub fn get_page(&self, page_id: &PageId) -> Result<PageRef> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(frame) = inner.directory.find(page_id) {
            self.stats.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            inner.lru.touch(frame);
            inner.frames[frame].as_mut().unwrap().page.pin();
            return Ok(PageRef {
                id: page_id.clone(),
                frame,
            });
        }

        self.stats.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if inner.resident >= inner.max_pages {
            Self::evict_one(&mut inner, &self.stats)?;
        }

        let mut page = Page::new(page_id.clone());
        Self::read_page_from_disk(&mut inner, page_id, &mut page)?;
        self.stats.disk_reads.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        page.pin();

        let frame = Self::insert_frame(&mut inner, page_id.clone(), page, &self.stats)?;
        Ok(PageRef {
            id: page_id.clone(),
            frame,
        })
    }

    fn insert_frame(
        inner: &mut Inner,
        page_id: PageId,
        page: Page,
        stats: &BufferPoolStats,
    ) -> Result<usize> {
        let frame = if let Some(slot) = inner.free_slots.pop() {
            inner.frames[slot] = Some(Frame { page });
            slot
        } else {
            inner.frames.push(Some(Frame { page }));
            inner.frames.len() - 1
        };
        inner.resident += 1;

        let splits_before = inner.directory.splits();
        let expansions_before = inner.directory.expansions();

        loop {
            match inner.directory.insert(page_id.clone(), frame)? {
                InsertOutcome::Inserted => break,
                InsertOutcome::NeedsEviction => {
                    Self::evict_one(inner, stats)?;
                }
            }
        }

        let splits_delta = inner.directory.splits() - splits_before;
        if splits_delta > 0 {
            stats.splits.fetch_add(splits_delta, std::sync::atomic::Ordering::Relaxed);
        }
        let expansions_delta = inner.directory.expansions() - expansions_before;
        if expansions_delta > 0 {
            stats
                .directory_expansions
                .fetch_add(expansions_delta, std::sync::atomic::Ordering::Relaxed);
        }

        inner.lru.touch(frame);
        Ok(frame)
    }

    fn evict_one(inner: &mut Inner, stats: &BufferPoolStats) -> Result<()> {
        let victim = inner
            .lru
            .iter_lru_first()
            .find(|&f| {
                inner.frames[f]
                    .as_ref()
                    .map(|fr| !fr.page.is_pinned())
                    .unwrap_or(false)
            });

        let victim = match victim {
            Some(v) => v,
            None => {
                return Err(Error::PoolExhausted {
                    pinned: inner.resident,
                })
            }
        };

        let frame = inner.frames[victim].take().unwrap();
        if frame.page.is_dirty() {
            Self::write_page_to_disk(inner, frame.page.id(), frame.page.bytes())?;
            stats.disk_writes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        inner.directory.remove(frame.page.id());
        inner.lru.remove(victim);
        inner.free_slots.push(victim);
        inner.resident -= 1;
        stats.evictions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    pub fn release(&self, page_ref: PageRef) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(frame) = inner.frames[page_ref.frame].as_mut() {
            frame.page.unpin();
        }
    }

    pub fn mark_dirty(&self, page_ref: &PageRef) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(frame) = inner.frames[page_ref.frame].as_mut() {
            frame.page.mark_dirty();
        }
    }

    pub fn copy_in(&self, page_ref: &PageRef, offset: usize, src: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.frames[page_ref.frame]
            .as_mut()
            .unwrap()
            .page
            .copy_in(offset, src)
    }

    pub fn copy_out(&self, page_ref: &PageRef, offset: usize, dst: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        inner.frames[page_ref.frame]
            .as_ref()
            .unwrap()
            .page
            .copy_out(offset, dst)
    }

    pub fn flush(&self, page_ref: &PageRef) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let frame = inner.frames[page_ref.frame].as_mut().unwrap();
        if frame.page.is_dirty() {
            let id = frame.page.id().clone();
            let bytes = frame.page.bytes().to_vec();
            Self::write_page_to_disk(&mut inner, &id, &bytes)?;
            inner.frames[page_ref.frame]
                .as_mut()
                .unwrap()
                .page
                .clear_dirty();
        }
        Ok(())
    }

    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let dirty: Vec<usize> = inner
            .frames
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().filter(|fr| fr.page.is_dirty()).map(|_| i))
            .collect();
        for frame_idx in dirty {
            let (id, bytes) = {
                let frame = inner.frames[frame_idx].as_ref().unwrap();
                (frame.page.id().clone(), frame.page.bytes().to_vec())
            };
            Self::write_page_to_disk(&mut inner, &id, &bytes)?;
            inner.frames[frame_idx].as_mut().unwrap().page.clear_dirty();
        }
        Ok(())
    }

    pub fn resize(&self, new_max: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.max_pages = new_max;
        while inner.resident > inner.max_pages {
            Self::evict_one(&mut inner, &self.stats)?;
        }
        Ok(())
    }

    fn file_handle<'a>(inner: &'a mut Inner, path: &Path) -> Result<&'a mut BlockFile> {
        if !inner.open_files.contains_key(path) {
            let handle = BlockFile::open(path, false, inner.use_aligned_io)?;
            inner.open_files.insert(path.to_path_buf(), handle);
        }
        Ok(inner.open_files.get_mut(path).unwrap())
    }

    fn read_page_from_disk(inner: &mut Inner, page_id: &PageId, page: &mut Page) -> Result<()> {
        let use_aligned = inner.use_aligned_io;
        let handle = Self::file_handle(inner, &page_id.file)?;
        let size = handle.file_size()?;
        if page_id.offset >= size {
            // Newly allocated page beyond EOF: leave zeroed.
            return Ok(());
        }
        match handle.read_exact_at(page_id.offset, page.bytes_mut()) {
            Ok(()) => Ok(()),
            Err(e) if e.is_alignment() && use_aligned => {
                // Fall back: reopen this file in buffered mode for subsequent access.
                let fallback = BlockFile::open(&page_id.file, false, false)?;
                inner.open_files.insert(page_id.file.clone(), fallback);
                let handle = inner.open_files.get_mut(&page_id.file).unwrap();
                handle.read_exact_at(page_id.offset, page.bytes_mut())
            }
            Err(e) => Err(e),
        }
    }

    fn write_page_to_disk(inner: &mut Inner, page_id: &PageId, bytes: &[u8]) -> Result<()> {
        let handle = Self::file_handle(inner, &page_id.file)?;
        handle.write_at(page_id.offset, bytes)?;
        handle.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PAGE_SIZE;

    fn tmp_path(name: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ridgedb-bufferpool-{pid}-{nanos}-{name}"))
    }

    #[test]
    fn write_then_read_through_pool() {
        let path = tmp_path("a");
        {
            std::fs::File::create(&path).unwrap();
        }
        let config = StoreConfig::default().with_buffer_pool_max_pages(4);
        let pool = BufferPool::new(&config);
        let id = PageId::new(path.clone(), 0).unwrap();
        let r = pool.get_page(&id).unwrap();
        pool.copy_in(&r, 0, b"hi").unwrap();
        pool.flush(&r).unwrap();
        pool.release(r);

        let r2 = pool.get_page(&id).unwrap();
        let mut out = [0u8; 2];
        pool.copy_out(&r2, 0, &mut out).unwrap();
        assert_eq!(&out, b"hi");
        pool.release(r2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn eviction_respects_pins() {
        let path = tmp_path("b");
        std::fs::File::create(&path).unwrap();
        let config = StoreConfig::default()
            .with_buffer_pool_max_pages(1)
            .with_bucket_capacity(8)
            .with_initial_global_depth(1)
            .with_max_global_depth(1);
        let pool = BufferPool::new(&config);
        let id0 = PageId::new(path.clone(), 0).unwrap();
        let pinned = pool.get_page(&id0).unwrap();

        let id1 = PageId::new(path.clone(), PAGE_SIZE).unwrap();
        let err = pool.get_page(&id1).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
        pool.release(pinned);
        let _ = std::fs::remove_file(&path);
    }
}
