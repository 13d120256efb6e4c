use std::mem::size_of;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rustix::fs::{fstat, ftruncate, Mode};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm;

use crate::error::{ShmError, ShmErrorKind, ShmResult};
use crate::offset::{Offset, ShmSafe};

const HEADER_MAGIC: u32 = 0x5556_4653; // "UVFS"
const LAYOUT_VERSION: u32 = 1;

/// Allocation granularity; every type stored in a segment has alignment
/// of at most this value.
pub(crate) const ALLOC_ALIGN: u32 = 8;

/// Fixed header at offset zero of every segment.
///
/// Non-atomic fields are written once by the creator before the magic is
/// published; the atomics are the only words mutated after that.
#[repr(C)]
pub(crate) struct SegmentHeader {
    magic: AtomicU32,
    version: u32,
    size: u64,
    /// Advisory content lock (see [`Segment::lock_content`]).
    pub(crate) content_lock: AtomicU32,
    /// Short-lived lock over the allocator words below.
    pub(crate) alloc_lock: AtomicU32,
    pub(crate) free_head: AtomicU32,
    pub(crate) bump: AtomicU32,
    pub(crate) names_head: AtomicU32,
}

pub(crate) fn align_up(value: u32) -> u32 {
    (value + (ALLOC_ALIGN - 1)) & !(ALLOC_ALIGN - 1)
}

pub(crate) fn arena_start() -> u32 {
    align_up(size_of::<SegmentHeader>() as u32)
}

/// A named shared-memory segment mapped into this process.
///
/// The mapping lives until drop; the OS-level name is removed only through
/// [`Segment::unlink`], and the object itself only once every process has
/// unmapped it.
pub struct Segment {
    name: String,
    base: *mut u8,
    len: usize,
    created: bool,
}

// The raw base pointer refers to a shared mapping that is valid for the
// lifetime of the struct and only ever dereferenced through the checked
// accessors below.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

fn os_object_name(name: &str) -> ShmResult<String> {
    if name.is_empty() || name.len() > 250 || name.as_bytes().contains(&0) {
        return Err(ShmError::new(ShmErrorKind::InvalidName, "segment.name"));
    }
    Ok(format!("/{}", name.replace('/', "_")))
}

impl Segment {
    /// Attach an existing named segment or create one of exactly `size`
    /// bytes. Creation zero-initializes the object; on attach the existing
    /// size is honored but must be at least `size`.
    pub fn open_or_create(name: &str, size: u64) -> ShmResult<Self> {
        let os_name = os_object_name(name)?;
        if size < (arena_start() as u64) + 256 {
            return Err(ShmError::new(ShmErrorKind::SizeMismatch, "segment.min_size"));
        }

        let mut created = false;
        let fd = match shm::open(
            os_name.as_str(),
            shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        ) {
            Ok(fd) => {
                created = true;
                fd
            }
            Err(errno) if errno == rustix::io::Errno::EXIST => {
                shm::open(os_name.as_str(), shm::OFlags::RDWR, Mode::empty()).map_err(|errno| {
                    ShmError::with_errno(ShmErrorKind::SegmentUnavailable, "segment.open", errno)
                })?
            }
            Err(errno) => {
                return Err(ShmError::with_errno(
                    ShmErrorKind::SegmentUnavailable,
                    "segment.create",
                    errno,
                ))
            }
        };

        let map_len = if created {
            ftruncate(&fd, size).map_err(|errno| {
                let _ = shm::unlink(os_name.as_str());
                ShmError::with_errno(ShmErrorKind::SegmentUnavailable, "segment.resize", errno)
            })?;
            size
        } else {
            let stat = fstat(&fd).map_err(|errno| {
                ShmError::with_errno(ShmErrorKind::SegmentUnavailable, "segment.stat", errno)
            })?;
            let existing = stat.st_size as u64;
            if existing < size {
                return Err(ShmError::new(ShmErrorKind::SizeMismatch, "segment.attach"));
            }
            existing
        };

        let len = map_len as usize;
        let base = unsafe {
            mmap(
                null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        }
        .map_err(|errno| {
            ShmError::with_errno(ShmErrorKind::SegmentUnavailable, "segment.map", errno)
        })? as *mut u8;

        let segment = Segment {
            name: name.to_owned(),
            base,
            len,
            created,
        };

        if created {
            segment.init_header(map_len);
        } else {
            segment.wait_ready()?;
        }
        Ok(segment)
    }

    /// Request OS-level removal of a named segment. Attached processes keep
    /// their mappings; the object disappears after the last unmap.
    pub fn unlink(name: &str) -> ShmResult<()> {
        let os_name = os_object_name(name)?;
        match shm::unlink(os_name.as_str()) {
            Ok(()) => Ok(()),
            Err(errno) if errno == rustix::io::Errno::NOENT => Ok(()),
            Err(errno) => Err(ShmError::with_errno(
                ShmErrorKind::SegmentUnavailable,
                "segment.unlink",
                errno,
            )),
        }
    }

    fn init_header(&self, size: u64) {
        // Plain stores first, magic last: openers spin on the magic before
        // trusting anything else in the header.
        unsafe {
            let raw = self.base as *mut SegmentHeader;
            std::ptr::addr_of_mut!((*raw).version).write(LAYOUT_VERSION);
            std::ptr::addr_of_mut!((*raw).size).write(size);
        }
        let header = self.header();
        header.content_lock.store(0, Ordering::Relaxed);
        header.alloc_lock.store(0, Ordering::Relaxed);
        header.free_head.store(0, Ordering::Relaxed);
        header.bump.store(arena_start(), Ordering::Relaxed);
        header.names_head.store(0, Ordering::Relaxed);
        header.magic.store(HEADER_MAGIC, Ordering::Release);
    }

    fn wait_ready(&self) -> ShmResult<()> {
        let header = self.header();
        let deadline = Instant::now() + Duration::from_secs(2);
        while header.magic.load(Ordering::Acquire) != HEADER_MAGIC {
            if Instant::now() >= deadline {
                return Err(ShmError::new(ShmErrorKind::InvalidSegment, "segment.ready"));
            }
            std::thread::sleep(Duration::from_micros(100));
        }
        if self.header_version() != LAYOUT_VERSION {
            return Err(ShmError::new(
                ShmErrorKind::InvalidSegment,
                "segment.version",
            ));
        }
        Ok(())
    }

    fn header_version(&self) -> u32 {
        unsafe { std::ptr::addr_of!((*(self.base as *const SegmentHeader)).version).read() }
    }

    pub(crate) fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.base as *const SegmentHeader) }
    }

    /// Logical segment name (without the OS-specific prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this process created the segment (as opposed to attaching).
    pub fn created(&self) -> bool {
        self.created
    }

    fn check_range(&self, offset: u32, size: usize, context: &'static str) {
        let end = offset as usize + size;
        assert!(
            offset as usize >= size_of::<SegmentHeader>() && end <= self.len,
            "offset out of segment bounds ({context})"
        );
    }

    /// Copy a value out of the segment.
    pub fn read<T: ShmSafe>(&self, offset: Offset<T>) -> T {
        self.check_range(offset.get(), size_of::<T>(), "segment.read");
        unsafe { (self.base.add(offset.get() as usize) as *const T).read() }
    }

    /// Copy a value into the segment.
    pub fn write<T: ShmSafe>(&self, offset: Offset<T>, value: T) {
        self.check_range(offset.get(), size_of::<T>(), "segment.write");
        unsafe { (self.base.add(offset.get() as usize) as *mut T).write(value) }
    }

    /// Borrow raw bytes from the segment arena.
    pub fn bytes(&self, offset: u32, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }
        self.check_range(offset, len, "segment.bytes");
        unsafe { std::slice::from_raw_parts(self.base.add(offset as usize), len) }
    }

    pub fn write_bytes(&self, offset: u32, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.check_range(offset, data.len(), "segment.write_bytes");
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.base.add(offset as usize),
                data.len(),
            );
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.base as *mut _, self.len);
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("created", &self.created)
            .finish()
    }
}
