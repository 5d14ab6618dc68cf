//! Stable hashing for the buffer pool's extendible-hash directory.
//!
//! Uses an explicit stable hash (not `std::DefaultHasher`, which is not
//! guaranteed stable across toolchains) so that directory-slot placement of
//! a given page id is reproducible.

use crate::page::PageId;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// 64-bit stable hash of a page identity (file name + offset).
pub fn hash_page_id(page_id: &PageId) -> u64 {
    let mut h = XxHash64::with_seed(0);
    page_id.hash(&mut h);
    h.finish()
}

/// Directory index for a hash under the given global depth: the low
/// `depth` bits of the hash.
#[inline]
pub fn directory_index(hash: u64, depth: u32) -> usize {
    if depth == 0 {
        0
    } else {
        (hash & ((1u64 << depth) - 1)) as usize
    }
}
