//! Append-only executable memory for generated routines.
//!
//! Routines are carved out of large anonymous mappings with a bump pointer.
//! A caller reserves the worst-case size, writes its code and then commits the
//! bytes it actually used; the unused tail goes back to the arena. Blocks are
//! only unmapped when the arena is dropped, so every committed routine stays
//! valid and executable for the arena's lifetime.
//!
//! Only unix targets can map executable memory; elsewhere every reservation
//! fails with [`CodeBufferError::Unsupported`].

use std::io;
use std::ptr::NonNull;
use std::slice;

use thiserror::Error;
use tracing::debug;

/// Default size of each mapping backing an [`ExecutableArena`].
pub const DEFAULT_BLOCK_SIZE: usize = 4 << 20;

/// Alignment of every routine start.
pub const ROUTINE_ALIGN: usize = 16;

/// Worst-case reservations a freshly mapped block can hold back to back.
pub const MIN_RESERVATIONS_PER_BLOCK: usize = 4;

#[derive(Debug, Error)]
pub enum CodeBufferError {
    #[error("failed to map {size} bytes of executable memory: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: io::Error,
    },
    #[error("cannot reserve an empty code region")]
    EmptyReservation,
    #[error("commit of {used} bytes without a pending reservation")]
    NoReservation { used: usize },
    #[error("commit of {used} bytes exceeds the {reserved} byte reservation")]
    CommitTooLarge { used: usize, reserved: usize },
    #[error("executable code buffers are not supported on this platform")]
    Unsupported,
}

/// Bump allocator handing out writable, executable code regions.
pub trait CodeBuffer {
    /// Reserve a region of at least `capacity` bytes.
    ///
    /// The region stays reserved until the next [`CodeBuffer::commit`].
    fn reserve(&mut self, capacity: usize) -> Result<&mut [u8], CodeBufferError>;

    /// Keep the first `used` bytes of the pending reservation and release the rest.
    fn commit(&mut self, used: usize) -> Result<(), CodeBufferError>;
}

/// [`CodeBuffer`] backed by read-write-execute anonymous mappings
pub struct ExecutableArena {
    block_size: usize,
    blocks: Vec<Block>,
    cursor: usize,
    pending: Option<usize>,
    committed: usize,
}

impl ExecutableArena {
    /// Create an arena mapping `block_size` bytes at a time.
    ///
    /// Nothing is mapped until the first reservation. A block is never smaller
    /// than [`MIN_RESERVATIONS_PER_BLOCK`] times the reservation that maps it.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Vec::new(),
            cursor: 0,
            pending: None,
            committed: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes kept by commits so far, excluding alignment padding.
    pub fn committed_bytes(&self) -> usize {
        self.committed
    }
}

impl Default for ExecutableArena {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl CodeBuffer for ExecutableArena {
    fn reserve(&mut self, capacity: usize) -> Result<&mut [u8], CodeBufferError> {
        if capacity == 0 {
            return Err(CodeBufferError::EmptyReservation);
        }

        let start = self.cursor.next_multiple_of(ROUTINE_ALIGN);
        let current = self.blocks.last().map(|block| (block.ptr, block.len));
        let (base, start) = match current {
            Some((ptr, len)) if len >= start && len - start >= capacity => (ptr, start),
            _ => {
                let len = capacity
                    .checked_mul(MIN_RESERVATIONS_PER_BLOCK)
                    .map_or(capacity, |len| len.max(self.block_size));
                let block = Block::map(len)?;
                debug!(
                    size = block.len,
                    blocks = self.blocks.len() + 1,
                    "mapped executable arena block"
                );
                let base = block.ptr;
                self.blocks.push(block);
                (base, 0)
            }
        };

        self.cursor = start;
        self.pending = Some(capacity);

        // SAFETY: `start + capacity` lies inside the block, which stays mapped
        // until the arena is dropped. Earlier regions end at or before
        // `start`, and the returned borrow of `self` prevents a second
        // reservation from overlapping this one while it is alive.
        Ok(unsafe { slice::from_raw_parts_mut(base.as_ptr().add(start), capacity) })
    }

    fn commit(&mut self, used: usize) -> Result<(), CodeBufferError> {
        let reserved = self
            .pending
            .take()
            .ok_or(CodeBufferError::NoReservation { used })?;

        if used > reserved {
            return Err(CodeBufferError::CommitTooLarge { used, reserved });
        }

        self.cursor += used;
        self.committed += used;
        Ok(())
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
struct Block {
    ptr: NonNull<u8>,
    len: usize,
}

impl Block {
    #[cfg(unix)]
    fn map(len: usize) -> Result<Self, CodeBufferError> {
        // SAFETY: a fresh private anonymous mapping aliases no existing memory;
        // the result is checked against MAP_FAILED before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(CodeBufferError::MapFailed {
                size: len,
                source: io::Error::last_os_error(),
            });
        }

        NonNull::new(ptr.cast::<u8>())
            .map(|ptr| Self { ptr, len })
            .ok_or_else(|| CodeBufferError::MapFailed {
                size: len,
                source: io::Error::other("mmap returned a null mapping"),
            })
    }

    #[cfg(not(unix))]
    fn map(_len: usize) -> Result<Self, CodeBufferError> {
        Err(CodeBufferError::Unsupported)
    }
}

#[cfg(unix)]
impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: `ptr` and `len` describe exactly the mapping created in `map`.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn reservations_start_aligned_after_commit() {
        let mut arena = ExecutableArena::new(4096);

        let first = arena.reserve(64).expect("first reservation");
        first[..3].copy_from_slice(&[0x90, 0x90, 0xc3]);
        let first_ptr = first.as_ptr() as usize;
        arena.commit(3).expect("commit first");

        let second_ptr = arena.reserve(64).expect("second reservation").as_ptr() as usize;
        arena.commit(0).expect("commit second");

        assert_eq!(second_ptr - first_ptr, ROUTINE_ALIGN);
        assert_eq!(second_ptr % ROUTINE_ALIGN, 0);
        assert_eq!(arena.committed_bytes(), 3);
        assert_eq!(arena.block_count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn full_block_maps_another() {
        let mut arena = ExecutableArena::new(256);

        for _ in 0..4 {
            arena.reserve(64).expect("reserve in first block");
            arena.commit(64).expect("commit in first block");
        }
        assert_eq!(arena.block_count(), 1);

        arena.reserve(64).expect("reserve in second block");
        arena.commit(10).expect("commit second block");

        assert_eq!(arena.block_count(), 2);
        assert_eq!(arena.committed_bytes(), 266);
    }

    #[cfg(unix)]
    #[test]
    fn oversized_reservation_maps_room_for_more() {
        let mut arena = ExecutableArena::new(64);
        let region = arena.reserve(1000).expect("large reservation");
        assert_eq!(region.len(), 1000);
        arena.commit(1000).expect("commit");

        arena.reserve(1000).expect("second large reservation");
        arena.commit(20).expect("commit second");
        assert_eq!(arena.block_count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn small_blocks_still_pack_many_routines() {
        let mut arena = ExecutableArena::new(4096);

        for _ in 0..100 {
            arena.reserve(8192).expect("reserve routine");
            arena.commit(11).expect("commit routine");
        }

        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.committed_bytes(), 1100);
    }

    #[cfg(not(unix))]
    #[test]
    fn reservations_are_unsupported() {
        let mut arena = ExecutableArena::default();
        assert!(matches!(
            arena.reserve(32),
            Err(CodeBufferError::Unsupported)
        ));
        assert_eq!(arena.block_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn commit_requires_a_reservation() {
        let mut arena = ExecutableArena::default();
        assert!(matches!(
            arena.commit(1),
            Err(CodeBufferError::NoReservation { used: 1 })
        ));

        arena.reserve(32).expect("reserve");
        assert!(matches!(
            arena.commit(33),
            Err(CodeBufferError::CommitTooLarge {
                used: 33,
                reserved: 32
            })
        ));
    }

    #[test]
    fn empty_reservation_is_rejected() {
        let mut arena = ExecutableArena::default();
        assert!(matches!(
            arena.reserve(0),
            Err(CodeBufferError::EmptyReservation)
        ));
    }
}
