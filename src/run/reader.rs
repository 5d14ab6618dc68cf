//! Run Reader (C7): loads a run's key directory into memory; serves point
//! lookups via binary search and ordered range scans. Value bytes are
//! always read through the buffer pool, including values that straddle a
//! page boundary.

use super::{DirEntry, Lookup};
use crate::buffer_pool::BufferPool;
use crate::consts::{PAGE_SIZE, RUN_MAGIC, RUN_VERSION};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RunReader {
    path: PathBuf,
    directory: Vec<DirEntry>,
    value_region_offset: u64,
}

impl RunReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).open(&path)?;

        let magic = file.read_u64::<LittleEndian>()?;
        if magic != RUN_MAGIC {
            return Err(Error::corruption(path, "bad run magic"));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != RUN_VERSION {
            return Err(Error::corruption(path, format!("unsupported run version {version}")));
        }
        let entry_count = file.read_u32::<LittleEndian>()?;
        let value_region_offset = file.read_u64::<LittleEndian>()?;

        let file_size = file.metadata()?.len();
        if value_region_offset > file_size {
            return Err(Error::corruption(
                path,
                format!("value_region_offset {value_region_offset} exceeds file size {file_size}"),
            ));
        }

        let mut directory = Vec::with_capacity(entry_count as usize);
        let mut last_key: Option<Vec<u8>> = None;
        for _ in 0..entry_count {
            let key_len = file.read_u32::<LittleEndian>()? as usize;
            let mut key = vec![0u8; key_len];
            file.read_exact(&mut key)?;
            let value_offset = file.read_u64::<LittleEndian>()?;
            let value_len = file.read_u32::<LittleEndian>()?;
            let tombstone = file.read_u8()? != 0;

            if let Some(prev) = &last_key {
                if &key <= prev {
                    return Err(Error::corruption(
                        path,
                        "run directory keys are not strictly ascending",
                    ));
                }
            }
            last_key = Some(key.clone());

            let value_end = value_region_offset
                .checked_add(value_offset)
                .and_then(|v| v.checked_add(value_len as u64))
                .ok_or_else(|| Error::corruption(path.clone(), "value offset overflow"))?;
            if value_end > file_size {
                return Err(Error::corruption(
                    path,
                    format!(
                        "value range [{value_offset}, +{value_len}) for key escapes file size {file_size}"
                    ),
                ));
            }

            directory.push(DirEntry {
                key,
                value_offset,
                value_len,
                tombstone,
            });
        }

        Ok(Self {
            path,
            directory,
            value_region_offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.directory.len()
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        self.directory.first().map(|e| e.key.as_slice())
    }

    pub fn max_key(&self) -> Option<&[u8]> {
        self.directory.last().map(|e| e.key.as_slice())
    }

    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => min <= end && max >= start,
            _ => false,
        }
    }

    fn binary_search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.directory.binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    pub fn is_deleted(&self, key: &[u8]) -> bool {
        matches!(self.binary_search(key), Ok(idx) if self.directory[idx].tombstone)
    }

    /// Point lookup. Reads the value through the buffer pool when present
    /// and live.
    pub fn get(&self, pool: &Arc<BufferPool>, key: &[u8]) -> Result<Lookup> {
        let idx = match self.binary_search(key) {
            Ok(idx) => idx,
            Err(_) => return Ok(Lookup::Absent),
        };
        let entry = &self.directory[idx];
        if entry.tombstone {
            return Ok(Lookup::Deleted);
        }
        let value = self.read_value(pool, entry)?;
        Ok(Lookup::Value(value))
    }

    /// Ordered scan over `[start, end]` inclusive. Tombstones are yielded
    /// as `Lookup::Deleted` entries; the caller (store facade / compactor)
    /// is responsible for suppressing them as appropriate.
    ///
    /// Streaming: the directory (keys and offsets) is already resident, but
    /// each value is read through the buffer pool lazily as the iterator is
    /// advanced, not materialized up front.
    pub fn scan<'a>(
        &'a self,
        pool: &Arc<BufferPool>,
        start: &'a [u8],
        end: &'a [u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Lookup)>> + 'a {
        let pool = pool.clone();
        let begin = if start > end {
            self.directory.len()
        } else {
            self.directory.partition_point(|e| e.key.as_slice() < start)
        };
        self.directory[begin..]
            .iter()
            .take_while(move |entry| entry.key.as_slice() <= end)
            .map(move |entry| self.read_entry(&pool, entry))
    }

    /// Every entry in the run in key order, values read lazily one at a
    /// time. Used by the compactor, which merges whole runs.
    pub fn iter_all<'a>(
        &'a self,
        pool: &Arc<BufferPool>,
    ) -> impl Iterator<Item = Result<(Vec<u8>, Lookup)>> + 'a {
        let pool = pool.clone();
        self.directory.iter().map(move |entry| self.read_entry(&pool, entry))
    }

    fn read_entry(&self, pool: &Arc<BufferPool>, entry: &DirEntry) -> Result<(Vec<u8>, Lookup)> {
        if entry.tombstone {
            Ok((entry.key.clone(), Lookup::Deleted))
        } else {
            let value = self.read_value(pool, entry)?;
            Ok((entry.key.clone(), Lookup::Value(value)))
        }
    }

    fn read_value(&self, pool: &Arc<BufferPool>, entry: &DirEntry) -> Result<Vec<u8>> {
        let absolute_start = self.value_region_offset + entry.value_offset;
        let len = entry.value_len as usize;
        let mut out = vec![0u8; len];
        let mut remaining = len;
        let mut cursor = absolute_start;
        let mut written = 0usize;

        while remaining > 0 {
            let page_offset = (cursor / PAGE_SIZE) * PAGE_SIZE;
            let in_page = (cursor - page_offset) as usize;
            let take = remaining.min(PAGE_SIZE as usize - in_page);

            let page_id = crate::page::PageId::new(self.path.clone(), page_offset)?;
            let page_ref = pool.get_page(&page_id)?;
            let result = pool.copy_out(&page_ref, in_page, &mut out[written..written + take]);
            pool.release(page_ref);
            result?;

            written += take;
            remaining -= take;
            cursor += take as u64;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memtable::Entry;
    use crate::run::write_run;

    fn tmp_path(name: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ridgedb-run-{pid}-{nanos}-{name}"))
    }

    #[test]
    fn write_read_roundtrip_with_tombstone() {
        let path = tmp_path("basic");
        let entries = vec![
            (
                b"a".to_vec(),
                Entry {
                    value: b"1".to_vec(),
                    is_deleted: false,
                },
            ),
            (
                b"b".to_vec(),
                Entry {
                    value: Vec::new(),
                    is_deleted: true,
                },
            ),
            (
                b"c".to_vec(),
                Entry {
                    value: b"33".to_vec(),
                    is_deleted: false,
                },
            ),
        ];
        write_run(&path, &entries).unwrap();

        let reader = RunReader::open(&path).unwrap();
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));

        assert_eq!(reader.get(&pool, b"a").unwrap(), Lookup::Value(b"1".to_vec()));
        assert_eq!(reader.get(&pool, b"b").unwrap(), Lookup::Deleted);
        assert_eq!(reader.get(&pool, b"c").unwrap(), Lookup::Value(b"33".to_vec()));
        assert_eq!(reader.get(&pool, b"z").unwrap(), Lookup::Absent);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn value_spanning_two_pages_reads_back_whole() {
        let path = tmp_path("crosspage");
        let big_value = vec![7u8; PAGE_SIZE as usize + 500];
        let entries = vec![(
            b"k".to_vec(),
            Entry {
                value: big_value.clone(),
                is_deleted: false,
            },
        )];
        write_run(&path, &entries).unwrap();

        let reader = RunReader::open(&path).unwrap();
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));
        match reader.get(&pool, b"k").unwrap() {
            Lookup::Value(v) => assert_eq!(v, big_value),
            other => panic!("unexpected {other:?}"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn scan_range_bounds() {
        let path = tmp_path("scan");
        let entries = vec![
            (b"a".to_vec(), Entry { value: b"1".to_vec(), is_deleted: false }),
            (b"b".to_vec(), Entry { value: b"2".to_vec(), is_deleted: false }),
            (b"c".to_vec(), Entry { value: b"3".to_vec(), is_deleted: false }),
        ];
        write_run(&path, &entries).unwrap();
        let reader = RunReader::open(&path).unwrap();
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));

        let result: Vec<_> = reader
            .scan(&pool, b"b", b"c")
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, b"b");

        let empty: Vec<_> = reader
            .scan(&pool, b"z", b"a")
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(empty.is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn iter_all_yields_every_entry_in_order() {
        let path = tmp_path("iterall");
        let entries = vec![
            (b"a".to_vec(), Entry { value: b"1".to_vec(), is_deleted: false }),
            (b"b".to_vec(), Entry { value: Vec::new(), is_deleted: true }),
        ];
        write_run(&path, &entries).unwrap();
        let reader = RunReader::open(&path).unwrap();
        let pool = Arc::new(BufferPool::new(&StoreConfig::default()));

        let all: Vec<_> = reader.iter_all(&pool).collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(all, vec![
            (b"a".to_vec(), Lookup::Value(b"1".to_vec())),
            (b"b".to_vec(), Lookup::Deleted),
        ]);
        let _ = std::fs::remove_file(&path);
    }
}
