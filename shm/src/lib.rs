//! Named shared-memory segments and the offset discipline on top of them.
//!
//! A segment maps at a different base address in every attached process,
//! so nothing inside it may hold a pointer: all intra-segment references
//! are [`Offset`] values resolved against the mapping. The segment carries
//! its own allocator (first-fit free list plus a bump cursor), a
//! named-object directory for well-known constructs, and an advisory
//! content lock shared by every attached process.

mod alloc;
mod error;
mod lock;
mod names;
mod offset;
mod segment;

pub use error::{ShmError, ShmErrorKind, ShmResult};
pub use lock::{ContentLockToken, CONTENT_LOCK_TIMEOUT};
pub use offset::{Offset, ShmSafe};
pub use segment::Segment;

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "uvfs-test-{}-{}-{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn create_then_attach() {
        let name = unique("attach");
        let first = Segment::open_or_create(&name, 16 * 1024).unwrap();
        assert!(first.created());

        let second = Segment::open_or_create(&name, 16 * 1024).unwrap();
        assert!(!second.created());
        assert_eq!(second.len(), 16 * 1024);

        drop(second);
        drop(first);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn attach_smaller_is_rejected() {
        let name = unique("size");
        let _seg = Segment::open_or_create(&name, 8 * 1024).unwrap();
        let err = Segment::open_or_create(&name, 64 * 1024).unwrap_err();
        assert_eq!(err.kind(), ShmErrorKind::SizeMismatch);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn alloc_and_reuse() {
        let name = unique("alloc");
        let seg = Segment::open_or_create(&name, 8 * 1024).unwrap();

        let a = seg.alloc(100).unwrap();
        let b = seg.alloc(100).unwrap();
        assert_ne!(a, b);

        seg.dealloc(a, 100);
        let c = seg.alloc(64).unwrap();
        // The freed block satisfies the smaller request.
        assert_eq!(c, a);

        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn alloc_exhaustion_reports_oom() {
        let name = unique("oom");
        let seg = Segment::open_or_create(&name, 4 * 1024).unwrap();
        let err = loop {
            match seg.alloc(512) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), ShmErrorKind::OutOfSegmentMemory);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn named_construct_roundtrip() {
        let name = unique("names");
        let seg = Segment::open_or_create(&name, 8 * 1024).unwrap();

        assert!(seg.find::<u64>("counter").is_none());
        let slot = seg.construct::<u64>("counter", 7).unwrap();
        assert_eq!(seg.read(slot), 7);

        let found = seg.find::<u64>("counter").unwrap();
        assert_eq!(found, slot);

        let (again, created) = seg.find_or_construct::<u64>("counter", || 99).unwrap();
        assert_eq!(again, slot);
        assert!(!created);
        assert_eq!(seg.read(again), 7);

        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn named_constructs_visible_across_mappings() {
        let name = unique("cross");
        let writer = Segment::open_or_create(&name, 8 * 1024).unwrap();
        let slot = writer.construct::<u32>("value", 41).unwrap();
        writer.write(slot, 42);

        let reader = Segment::open_or_create(&name, 8 * 1024).unwrap();
        let seen = reader.find::<u32>("value").unwrap();
        assert_eq!(reader.read(seen), 42);

        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn content_lock_times_out_and_proceeds() {
        let name = unique("lock");
        let seg = Segment::open_or_create(&name, 8 * 1024).unwrap();

        let held = seg.lock_content(std::time::Duration::from_millis(10));
        assert!(held.owned());

        // Second acquisition on the same word cannot own the lock but must
        // still return: the lock is advisory.
        let degraded = seg.lock_content(std::time::Duration::from_millis(20));
        assert!(!degraded.owned());

        drop(degraded);
        drop(held);

        let again = seg.lock_content(std::time::Duration::from_millis(10));
        assert!(again.owned());

        Segment::unlink(&name).unwrap();
    }
}
