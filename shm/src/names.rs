use std::mem::size_of;
use std::sync::atomic::Ordering;

use crate::error::ShmResult;
use crate::offset::{Offset, ShmSafe};
use crate::segment::Segment;

/// One entry of the named-object directory: a singly linked list rooted in
/// the segment header.
#[repr(C)]
#[derive(Clone, Copy)]
struct NamedRecord {
    name_off: u32,
    name_len: u32,
    value_off: u32,
    next: u32,
}

unsafe impl ShmSafe for NamedRecord {}

impl Segment {
    /// Locate a named construct. Returns its offset, or `None` when absent.
    pub fn find<T: ShmSafe>(&self, name: &str) -> Option<Offset<T>> {
        let mut cur = self.header().names_head.load(Ordering::Acquire);
        while cur != 0 {
            let record: NamedRecord = self.read(Offset::new(cur));
            if self.bytes(record.name_off, record.name_len as usize) == name.as_bytes() {
                return Some(Offset::new(record.value_off));
            }
            cur = record.next;
        }
        None
    }

    /// Allocate and in-place construct a named object.
    ///
    /// If another process constructs the same name concurrently, the loser
    /// frees its allocations and returns the winner's object, so the call
    /// behaves as find-or-construct under contention.
    pub fn construct<T: ShmSafe>(&self, name: &str, value: T) -> ShmResult<Offset<T>> {
        self.construct_inner(name, value).map(|(offset, _)| offset)
    }

    /// Like [`Segment::construct`], but reports whether this call created
    /// the object. On a lost race the passed `value` slot is reclaimed;
    /// any segment storage its fields own stays the caller's to release.
    pub fn construct_with<T: ShmSafe>(
        &self,
        name: &str,
        value: T,
    ) -> ShmResult<(Offset<T>, bool)> {
        self.construct_inner(name, value)
    }

    /// Find a named object or construct it from `init` when absent. The
    /// boolean reports whether this call created it.
    pub fn find_or_construct<T: ShmSafe>(
        &self,
        name: &str,
        init: impl FnOnce() -> T,
    ) -> ShmResult<(Offset<T>, bool)> {
        if let Some(found) = self.find::<T>(name) {
            return Ok((found, false));
        }
        self.construct_inner(name, init())
    }

    fn construct_inner<T: ShmSafe>(&self, name: &str, value: T) -> ShmResult<(Offset<T>, bool)> {
        let value_off = self.alloc(size_of::<T>() as u32)?;
        let name_off = match self.alloc(name.len() as u32) {
            Ok(off) => off,
            Err(err) => {
                self.dealloc(value_off, size_of::<T>() as u32);
                return Err(err);
            }
        };
        let record_off = match self.alloc(size_of::<NamedRecord>() as u32) {
            Ok(off) => off,
            Err(err) => {
                self.dealloc(name_off, name.len() as u32);
                self.dealloc(value_off, size_of::<T>() as u32);
                return Err(err);
            }
        };

        let value_slot = Offset::new(value_off);
        self.write(value_slot, value);
        self.write_bytes(name_off, name.as_bytes());
        self.write(
            Offset::new(record_off),
            NamedRecord {
                name_off,
                name_len: name.len() as u32,
                value_off,
                next: 0,
            },
        );

        // Linking re-checks for a racing construct of the same name.
        let existing = self.with_alloc_lock(|| {
            if let Some(found) = self.find::<T>(name) {
                return Some(found);
            }
            let head = self.header().names_head.load(Ordering::Relaxed);
            let mut record: NamedRecord = self.read(Offset::new(record_off));
            record.next = head;
            self.write(Offset::new(record_off), record);
            self.header().names_head.store(record_off, Ordering::Release);
            None
        });

        if let Some(found) = existing {
            self.dealloc(record_off, size_of::<NamedRecord>() as u32);
            self.dealloc(name_off, name.len() as u32);
            self.dealloc(value_off, size_of::<T>() as u32);
            return Ok((found, false));
        }
        Ok((value_slot, true))
    }
}
