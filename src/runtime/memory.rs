//! WebAssembly linear memory implementation
//!
//! All access is bounds-checked before touching the underlying data.
//! Effective addresses are computed in 64 bits, so `addr + offset` can never
//! wrap around into an in-bounds address.
//!
//! - Page size: 64KB (65,536 bytes)
//! - Address space: 32-bit (max 4GB)
//! - Out-of-bounds access: `RuntimeError::MemoryOutOfBounds`

use byteorder::{ByteOrder, LittleEndian};

use super::RuntimeError;

/// A zero-filled buffer of `bytes`, or None when the host cannot provide it.
///
/// `vec!` takes already-zeroed pages from the allocator but aborts on
/// failure, so the size is reserved once first.
fn zeroed(bytes: usize) -> Option<Vec<u8>> {
    Vec::<u8>::new().try_reserve_exact(bytes).ok()?;
    Some(vec![0u8; bytes])
}

/// WebAssembly page size in bytes (64KB)
pub const PAGE_SIZE: usize = 65536;

/// Maximum number of pages (2^16 = 64K pages = 4GB total)
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,

    /// Current size in pages
    current_pages: u32,

    /// Maximum size in pages (None = default max)
    max_pages: Option<u32>,
}

impl Memory {
    /// Create a zeroed memory of `initial_pages`.
    pub fn new(initial_pages: u32, max_pages: Option<u32>) -> Result<Self, RuntimeError> {
        if initial_pages > MAX_PAGES {
            return Err(RuntimeError::Misuse(format!(
                "initial memory size {initial_pages} pages exceeds maximum {MAX_PAGES} pages"
            )));
        }
        if let Some(max) = max_pages {
            if initial_pages > max || max > MAX_PAGES {
                return Err(RuntimeError::Misuse(format!(
                    "invalid memory limits {initial_pages}..{max}"
                )));
            }
        }

        let initial_bytes = initial_pages as usize * PAGE_SIZE;
        let data = zeroed(initial_bytes).ok_or(RuntimeError::OutOfMemory(initial_bytes))?;

        Ok(Memory {
            data,
            current_pages: initial_pages,
            max_pages,
        })
    }

    /// Current size in pages
    pub fn size(&self) -> u32 {
        self.current_pages
    }

    /// Current size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grow memory by `delta_pages`.
    ///
    /// Returns the previous size in pages, or -1 with memory untouched when
    /// the maximum would be exceeded or the host cannot allocate.
    pub fn grow(&mut self, delta_pages: u32) -> i32 {
        let current = self.current_pages;

        let Some(new_pages) = current.checked_add(delta_pages) else {
            return -1;
        };
        if new_pages > self.max_pages.unwrap_or(MAX_PAGES) {
            return -1;
        }

        let new_bytes = new_pages as usize * PAGE_SIZE;
        match self.data.try_reserve_exact(new_bytes - self.data.len()) {
            Ok(()) => {
                self.data.resize(new_bytes, 0);
                self.current_pages = new_pages;
                current as i32
            }
            Err(_) => -1,
        }
    }

    /// Check `[addr + offset, addr + offset + size)` and return its start.
    #[inline]
    fn check_bounds(&self, addr: u32, offset: u32, size: usize) -> Result<usize, RuntimeError> {
        let start = addr as u64 + offset as u64;
        if start + size as u64 > self.data.len() as u64 {
            return Err(RuntimeError::MemoryOutOfBounds);
        }
        Ok(start as usize)
    }

    #[inline]
    fn slice(&self, addr: u32, offset: u32, size: usize) -> Result<&[u8], RuntimeError> {
        let start = self.check_bounds(addr, offset, size)?;
        Ok(&self.data[start..start + size])
    }

    #[inline]
    fn slice_mut(&mut self, addr: u32, offset: u32, size: usize) -> Result<&mut [u8], RuntimeError> {
        let start = self.check_bounds(addr, offset, size)?;
        Ok(&mut self.data[start..start + size])
    }

    #[inline]
    pub fn read_u8(&self, addr: u32, offset: u32) -> Result<u8, RuntimeError> {
        Ok(self.slice(addr, offset, 1)?[0])
    }

    #[inline]
    pub fn read_u16(&self, addr: u32, offset: u32) -> Result<u16, RuntimeError> {
        Ok(LittleEndian::read_u16(self.slice(addr, offset, 2)?))
    }

    #[inline]
    pub fn read_u32(&self, addr: u32, offset: u32) -> Result<u32, RuntimeError> {
        Ok(LittleEndian::read_u32(self.slice(addr, offset, 4)?))
    }

    #[inline]
    pub fn read_u64(&self, addr: u32, offset: u32) -> Result<u64, RuntimeError> {
        Ok(LittleEndian::read_u64(self.slice(addr, offset, 8)?))
    }

    #[inline]
    pub fn write_u8(&mut self, addr: u32, offset: u32, value: u8) -> Result<(), RuntimeError> {
        self.slice_mut(addr, offset, 1)?[0] = value;
        Ok(())
    }

    #[inline]
    pub fn write_u16(&mut self, addr: u32, offset: u32, value: u16) -> Result<(), RuntimeError> {
        LittleEndian::write_u16(self.slice_mut(addr, offset, 2)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_u32(&mut self, addr: u32, offset: u32, value: u32) -> Result<(), RuntimeError> {
        LittleEndian::write_u32(self.slice_mut(addr, offset, 4)?, value);
        Ok(())
    }

    #[inline]
    pub fn write_u64(&mut self, addr: u32, offset: u32, value: u64) -> Result<(), RuntimeError> {
        LittleEndian::write_u64(self.slice_mut(addr, offset, 8)?, value);
        Ok(())
    }

    /// Read a range of bytes
    pub fn read_bytes(&self, addr: u32, len: usize) -> Result<&[u8], RuntimeError> {
        self.slice(addr, 0, len)
    }

    /// Write a slice of bytes
    pub fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.slice_mut(addr, 0, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// `memory.fill`
    pub fn fill(&mut self, dst: u32, value: u8, len: u32) -> Result<(), RuntimeError> {
        self.slice_mut(dst, 0, len as usize)?.fill(value);
        Ok(())
    }

    /// `memory.copy`; the ranges may overlap.
    pub fn copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), RuntimeError> {
        let len = len as usize;
        let src = self.check_bounds(src, 0, len)?;
        let dst = self.check_bounds(dst, 0, len)?;
        self.data.copy_within(src..src + len, dst);
        Ok(())
    }

    /// `memory.init` from a data segment's bytes.
    pub fn init(&mut self, dst: u32, segment: &[u8], src: u32, len: u32) -> Result<(), RuntimeError> {
        let end = src as u64 + len as u64;
        if end > segment.len() as u64 {
            return Err(RuntimeError::MemoryOutOfBounds);
        }
        let bytes = &segment[src as usize..end as usize];
        self.slice_mut(dst, 0, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }
}
