use std::mem::size_of;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::{ShmError, ShmErrorKind, ShmResult};
use crate::segment::{align_up, Segment};

/// Free blocks are threaded through the arena itself.
#[repr(C)]
#[derive(Clone, Copy)]
struct FreeBlock {
    size: u32,
    next: u32,
}

const MIN_BLOCK: u32 = size_of::<FreeBlock>() as u32;

impl Segment {
    /// Allocate `size` bytes inside the arena. Returns the byte offset of
    /// the block, aligned to the segment allocation granularity.
    pub fn alloc(&self, size: u32) -> ShmResult<u32> {
        let size = align_up(size.max(1));
        self.with_alloc_lock(|| self.alloc_locked(size))
    }

    /// Return a block to the free list. `size` must be the size passed to
    /// the matching [`Segment::alloc`].
    pub fn dealloc(&self, offset: u32, size: u32) {
        if offset == 0 {
            return;
        }
        let size = align_up(size.max(1));
        self.with_alloc_lock(|| {
            let head = self.header().free_head.load(Ordering::Relaxed);
            self.write_free(offset, FreeBlock { size, next: head });
            self.header().free_head.store(offset, Ordering::Relaxed);
        });
    }

    fn alloc_locked(&self, size: u32) -> ShmResult<u32> {
        let header = self.header();

        // First fit through the free list.
        let mut prev: u32 = 0;
        let mut cur = header.free_head.load(Ordering::Relaxed);
        while cur != 0 {
            let block = self.read_free(cur);
            if block.size >= size {
                let remainder = block.size - size;
                let successor = if remainder >= MIN_BLOCK {
                    let tail = cur + size;
                    self.write_free(
                        tail,
                        FreeBlock {
                            size: remainder,
                            next: block.next,
                        },
                    );
                    tail
                } else {
                    block.next
                };
                if prev == 0 {
                    header.free_head.store(successor, Ordering::Relaxed);
                } else {
                    let mut prev_block = self.read_free(prev);
                    prev_block.next = successor;
                    self.write_free(prev, prev_block);
                }
                return Ok(cur);
            }
            prev = cur;
            cur = block.next;
        }

        // Fall back to the bump cursor.
        let bump = header.bump.load(Ordering::Relaxed);
        let end = bump
            .checked_add(size)
            .ok_or(ShmError::new(ShmErrorKind::OutOfSegmentMemory, "alloc.bump"))?;
        if end as usize > self.len() {
            return Err(ShmError::new(ShmErrorKind::OutOfSegmentMemory, "alloc.bump"));
        }
        header.bump.store(end, Ordering::Relaxed);
        Ok(bump)
    }

    fn read_free(&self, offset: u32) -> FreeBlock {
        let bytes = self.bytes(offset, size_of::<FreeBlock>());
        let mut size = [0u8; 4];
        let mut next = [0u8; 4];
        size.copy_from_slice(&bytes[0..4]);
        next.copy_from_slice(&bytes[4..8]);
        FreeBlock {
            size: u32::from_ne_bytes(size),
            next: u32::from_ne_bytes(next),
        }
    }

    fn write_free(&self, offset: u32, block: FreeBlock) {
        self.write_bytes(offset, &block.size.to_ne_bytes());
        self.write_bytes(offset + 4, &block.next.to_ne_bytes());
    }

    /// Run `f` with the allocator words locked. The lock is advisory like
    /// everything else in the segment; a dead holder must not wedge every
    /// attached process, so after a generous timeout we proceed anyway.
    pub(crate) fn with_alloc_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let word = &self.header().alloc_lock;
        let deadline = Instant::now() + Duration::from_secs(2);
        let acquired = loop {
            if word
                .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            std::hint::spin_loop();
            std::thread::sleep(Duration::from_micros(20));
        };
        let result = f();
        if acquired {
            word.store(0, Ordering::Release);
        }
        result
    }
}
