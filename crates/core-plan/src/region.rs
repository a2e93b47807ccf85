//! Shared access to a mapped plan
//!
//! The mapping is only ever touched through the base pointer captured at
//! construction. Immutable ranges are handed out as byte slices; the status
//! and completion-time words are handed out as atomics. The two never overlap
//! (see `layout`), so no slice aliases a word another thread stores to.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64};

pub(crate) struct PlanRegion {
    base: NonNull<u8>,
    len: usize,
    map: MmapMut,
}

impl PlanRegion {
    pub(crate) fn new(mut map: MmapMut) -> Result<Self> {
        let len = map.len();
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| Error::memory_map_failed("mapping returned a null pointer"))?;
        if base.as_ptr() as usize % 8 != 0 {
            return Err(Error::memory_map_failed("mapping is not 8-byte aligned"));
        }
        Ok(Self { base, len, map })
    }

    /// Anonymous mapping holding a copy of `bytes`
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut map = MmapMut::map_anon(bytes.len())
            .map_err(|e| Error::memory_map_failed(e.to_string()))?;
        map.copy_from_slice(bytes);
        Self::new(map)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Read-only bytes; callers only pass ranges that hold no mutable word
    pub(crate) fn bytes(&self, start: usize, len: usize) -> &[u8] {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "range past end of plan region"
        );
        // SAFETY: in bounds, and the range is never written after the plan
        // is exposed to workers.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(start), len) }
    }

    pub(crate) fn atomic_u32(&self, offset: usize) -> &AtomicU32 {
        assert!(
            offset.checked_add(4).is_some_and(|end| end <= self.len) && offset % 4 == 0
        );
        // SAFETY: in bounds, 4-aligned (base is 8-aligned), lives as long as
        // `self`, and only ever accessed atomically.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU32>() }
    }

    pub(crate) fn atomic_u64(&self, offset: usize) -> &AtomicU64 {
        assert!(
            offset.checked_add(8).is_some_and(|end| end <= self.len) && offset % 8 == 0
        );
        // SAFETY: as for `atomic_u32`, with 8-byte alignment.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU64>() }
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

// The region is shared across worker threads; all mutation goes through atomics
unsafe impl Send for PlanRegion {}
unsafe impl Sync for PlanRegion {}
