//! Page identity and buffer (C1).
//!
//! A page is a 4096-byte aligned unit of disk addressing. `PageId` pairs a
//! file name with a byte offset that must be a multiple of `PAGE_SIZE`.

use crate::consts::PAGE_SIZE;
use crate::error::{Error, Result};
use std::hash::Hash;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub file: PathBuf,
    pub offset: u64,
}

impl PageId {
    pub fn new(file: impl Into<PathBuf>, offset: u64) -> Result<Self> {
        let file = file.into();
        if offset % PAGE_SIZE != 0 {
            return Err(Error::alignment(
                file,
                format!("page offset {offset} is not a multiple of {PAGE_SIZE}"),
            ));
        }
        Ok(Self { file, offset })
    }
}

pub struct Page {
    id: PageId,
    buf: Box<[u8; PAGE_SIZE as usize]>,
    pins: u32,
    dirty: bool,
}

impl Page {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            buf: Box::new([0u8; PAGE_SIZE as usize]),
            pins: 0,
            dirty: false,
        }
    }

    pub fn id(&self) -> &PageId {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn pin_count(&self) -> u32 {
        self.pins
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins = self.pins.saturating_sub(1);
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// Copy `src` into the page at `offset`. Sets the dirty flag.
    pub fn copy_in(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .ok_or_else(|| Error::invariant("page copy_in offset overflow"))?;
        if end > self.buf.len() {
            return Err(Error::invariant(format!(
                "page copy_in out of bounds: offset={offset} len={} page_size={}",
                src.len(),
                self.buf.len()
            )));
        }
        self.buf[offset..end].copy_from_slice(src);
        self.dirty = true;
        Ok(())
    }

    /// Copy `len` bytes from the page at `offset` into `dst`.
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(dst.len())
            .ok_or_else(|| Error::invariant("page copy_out offset overflow"))?;
        if end > self.buf.len() {
            return Err(Error::invariant(format!(
                "page copy_out out of bounds: offset={offset} len={} page_size={}",
                dst.len(),
                self.buf.len()
            )));
        }
        dst.copy_from_slice(&self.buf[offset..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_misaligned_offset() {
        assert!(PageId::new("f", 1).is_err());
        assert!(PageId::new("f", PAGE_SIZE).is_ok());
    }

    #[test]
    fn copy_roundtrip() {
        let id = PageId::new("f", 0).unwrap();
        let mut page = Page::new(id);
        page.copy_in(10, b"hello").unwrap();
        assert!(page.is_dirty());
        let mut out = [0u8; 5];
        page.copy_out(10, &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn pin_unpin_never_negative() {
        let id = PageId::new("f", 0).unwrap();
        let mut page = Page::new(id);
        page.unpin();
        assert_eq!(page.pin_count(), 0);
        page.pin();
        page.pin();
        page.unpin();
        assert_eq!(page.pin_count(), 1);
    }
}
