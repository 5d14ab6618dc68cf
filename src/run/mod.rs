//! Immutable sorted on-disk run (C6 writer, C7 reader).

mod reader;
mod writer;

pub use reader::RunReader;
pub use writer::write_run;

/// In-memory directory entry, loaded fully into RAM on `RunReader::open`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub key: Vec<u8>,
    pub value_offset: u64,
    pub value_len: u32,
    pub tombstone: bool,
}

/// Lookup result distinguishing "not present in this run" from "present and
/// tombstoned" from "present with a value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Absent,
    Deleted,
    Value(Vec<u8>),
}

/// Parse the monotonic sequence number out of a canonical `run_<seq>.sst`
/// file name.
pub fn parse_sequence(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("run_")?
        .strip_suffix(".sst")?
        .parse()
        .ok()
}
