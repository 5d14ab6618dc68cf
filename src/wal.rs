//! Write-ahead log (C4): append-only typed PUT/DELETE record stream used
//! for crash recovery.

use crate::consts::{WAL_HDR_SIZE, WAL_MAGIC, WAL_OP_DELETE, WAL_OP_PUT, WAL_VERSION};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

pub struct Wal {
    path: PathBuf,
    record_count: u32,
}

impl Wal {
    /// Open an existing log or create a fresh one. A log with a bad magic
    /// or version is treated as corrupt and reinitialized empty, matching
    /// the recoverable-at-boundary policy for WAL issues.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            Self::write_header(&path, 0)?;
            return Ok(Self {
                path,
                record_count: 0,
            });
        }

        let mut file = OpenOptions::new().read(true).open(&path)?;
        let mut header = [0u8; WAL_HDR_SIZE as usize];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(_) => {
                log::warn!("wal {} has a short header, reinitializing", path.display());
                Self::write_header(&path, 0)?;
                return Ok(Self {
                    path,
                    record_count: 0,
                });
            }
        }
        let mut cursor = &header[..];
        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let record_count = cursor.read_u32::<LittleEndian>()?;

        if magic != WAL_MAGIC || version != WAL_VERSION {
            log::warn!("wal {} has bad magic/version, reinitializing", path.display());
            Self::write_header(&path, 0)?;
            return Ok(Self {
                path,
                record_count: 0,
            });
        }

        Ok(Self { path, record_count })
    }

    fn write_header(path: &Path, record_count: u32) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_u64::<LittleEndian>(WAL_MAGIC)?;
        file.write_u32::<LittleEndian>(WAL_VERSION)?;
        file.write_u32::<LittleEndian>(record_count)?;
        file.sync_all()?;
        Ok(())
    }

    fn append_record(&mut self, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        file.sync_all()?;

        self.record_count += 1;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(8 + 4))?;
        file.write_u32::<LittleEndian>(self.record_count)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn append_put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len());
        buf.write_u8(WAL_OP_PUT)?;
        buf.write_u32::<LittleEndian>(key.len() as u32)?;
        buf.extend_from_slice(key);
        buf.write_u32::<LittleEndian>(value.len() as u32)?;
        buf.extend_from_slice(value);
        self.append_record(&buf)
    }

    pub fn append_delete(&mut self, key: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(1 + 4 + key.len());
        buf.write_u8(WAL_OP_DELETE)?;
        buf.write_u32::<LittleEndian>(key.len() as u32)?;
        buf.extend_from_slice(key);
        self.append_record(&buf)
    }

    /// Replay all well-formed records in order. A truncated final record is
    /// silently discarded rather than treated as an error.
    pub fn replay(&self) -> Result<Vec<LogEntry>> {
        let mut file = BufReader::new(OpenOptions::new().read(true).open(&self.path)?);
        let mut header = [0u8; WAL_HDR_SIZE as usize];
        if file.read_exact(&mut header).is_err() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        loop {
            let op = match file.read_u8() {
                Ok(op) => op,
                Err(_) => break,
            };
            let key_len = match file.read_u32::<LittleEndian>() {
                Ok(n) => n as usize,
                Err(_) => break,
            };
            let mut key = vec![0u8; key_len];
            if file.read_exact(&mut key).is_err() {
                break;
            }

            match op {
                WAL_OP_PUT => {
                    let value_len = match file.read_u32::<LittleEndian>() {
                        Ok(n) => n as usize,
                        Err(_) => break,
                    };
                    let mut value = vec![0u8; value_len];
                    if file.read_exact(&mut value).is_err() {
                        break;
                    }
                    entries.push(LogEntry::Put { key, value });
                }
                WAL_OP_DELETE => {
                    entries.push(LogEntry::Delete { key });
                }
                other => {
                    return Err(Error::corruption(
                        self.path.clone(),
                        format!("unknown wal op byte {other}"),
                    ));
                }
            }
        }
        Ok(entries)
    }

    /// Empty the log and rewrite the header. Called after a successful
    /// flush of the memtable that the log was protecting.
    pub fn truncate(&mut self) -> Result<()> {
        Self::write_header(&self.path, 0)?;
        self.record_count = 0;
        Ok(())
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ridgedb-wal-{pid}-{nanos}-{name}"))
    }

    #[test]
    fn append_and_replay_roundtrip() {
        let path = tmp_path("roundtrip");
        let mut wal = Wal::open(&path).unwrap();
        wal.append_put(b"a", b"1").unwrap();
        wal.append_delete(b"b").unwrap();
        wal.append_put(b"c", b"3").unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(
            entries,
            vec![
                LogEntry::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                LogEntry::Delete { key: b"b".to_vec() },
                LogEntry::Put {
                    key: b"c".to_vec(),
                    value: b"3".to_vec()
                },
            ]
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn truncate_empties_log() {
        let path = tmp_path("truncate");
        let mut wal = Wal::open(&path).unwrap();
        wal.append_put(b"a", b"1").unwrap();
        wal.truncate().unwrap();
        assert_eq!(wal.replay().unwrap(), Vec::new());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn tolerates_truncated_tail() {
        let path = tmp_path("tail");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_put(b"a", b"1").unwrap();
            wal.append_put(b"b", b"2").unwrap();
        }
        // Truncate the file mid-record to simulate a crash during append.
        let len = std::fs::metadata(&path).unwrap().len();
        let f = OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(len - 2).unwrap();

        let wal = Wal::open(&path).unwrap();
        let entries = wal.replay().unwrap();
        assert_eq!(
            entries,
            vec![LogEntry::Put {
                key: b"a".to_vec(),
                value: b"1".to_vec()
            }]
        );
        let _ = std::fs::remove_file(&path);
    }
}
