//! Run Writer (C6): serializes a sorted, already-deduplicated batch of
//! entries into an immutable on-disk run. Stream-forward only, no random
//! I/O.

use crate::consts::{RUN_HDR_SIZE, RUN_MAGIC, RUN_VERSION};
use crate::error::Result;
use crate::memtable::Entry;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `entries` (ascending, unique keys) to `path` as a run file.
pub fn write_run(path: impl AsRef<Path>, entries: &[(Vec<u8>, Entry)]) -> Result<()> {
    let entry_count = entries.len() as u32;

    let mut directory_bytes = Vec::new();
    let mut value_region = Vec::new();
    let mut value_cursor = 0u64;

    for (key, entry) in entries {
        directory_bytes.write_u32::<LittleEndian>(key.len() as u32)?;
        directory_bytes.extend_from_slice(key);
        directory_bytes.write_u64::<LittleEndian>(value_cursor)?;
        let value_len = if entry.is_deleted {
            0
        } else {
            entry.value.len() as u32
        };
        directory_bytes.write_u32::<LittleEndian>(value_len)?;
        directory_bytes.write_u8(entry.is_deleted as u8)?;

        if !entry.is_deleted {
            value_region.extend_from_slice(&entry.value);
            value_cursor += entry.value.len() as u64;
        }
    }

    let value_region_offset = RUN_HDR_SIZE + directory_bytes.len() as u64;

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path.as_ref())?;
    let mut w = BufWriter::new(file);

    w.write_u64::<LittleEndian>(RUN_MAGIC)?;
    w.write_u32::<LittleEndian>(RUN_VERSION)?;
    w.write_u32::<LittleEndian>(entry_count)?;
    w.write_u64::<LittleEndian>(value_region_offset)?;
    w.write_all(&directory_bytes)?;
    w.write_all(&value_region)?;

    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
