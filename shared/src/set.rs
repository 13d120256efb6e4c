use uvfs_shm::{Segment, ShmResult, ShmSafe};

use crate::map::CaseMode;
use crate::string::ShmString;
use crate::vec::ShmVec;

/// Ordered string set stored as a sorted vector.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ShmSet {
    items: ShmVec<ShmString>,
    case_mode: u8,
    _pad: [u8; 3],
}

unsafe impl ShmSafe for ShmSet {}

impl ShmSet {
    pub const fn new(mode: CaseMode) -> Self {
        ShmSet {
            items: ShmVec::new(),
            case_mode: match mode {
                CaseMode::Sensitive => 0,
                CaseMode::Folded => 1,
            },
            _pad: [0; 3],
        }
    }

    fn mode(&self) -> CaseMode {
        if self.case_mode == 0 {
            CaseMode::Sensitive
        } else {
            CaseMode::Folded
        }
    }

    fn search(&self, seg: &Segment, value: &str) -> Result<usize, usize> {
        let mode = self.mode();
        self.items
            .binary_search_by(seg, |item| mode.compare(item.as_str(seg), value))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a value. Returns `false` when an equal value was present.
    pub fn insert(&mut self, seg: &Segment, value: &str) -> ShmResult<bool> {
        match self.search(seg, value) {
            Ok(_) => Ok(false),
            Err(index) => {
                let mut stored = ShmString::from_str(seg, value)?;
                if let Err(err) = self.items.insert(seg, index, stored) {
                    stored.free(seg);
                    return Err(err);
                }
                Ok(true)
            }
        }
    }

    pub fn contains(&self, seg: &Segment, value: &str) -> bool {
        self.search(seg, value).is_ok()
    }

    pub fn remove(&mut self, seg: &Segment, value: &str) -> bool {
        match self.search(seg, value) {
            Ok(index) => {
                let mut removed = self.items.remove(seg, index);
                removed.free(seg);
                true
            }
            Err(_) => false,
        }
    }

    pub fn iter<'s>(&'s self, seg: &'s Segment) -> impl Iterator<Item = &'s str> + 's {
        self.items.iter(seg).map(move |item| item.as_str(seg))
    }

    pub fn clear(&mut self, seg: &Segment) {
        for i in 0..self.items.len() {
            if let Some(mut item) = self.items.get(seg, i) {
                item.free(seg);
            }
        }
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tag: &str) -> Segment {
        let name = format!("uvfs-set-{}-{}", tag, std::process::id());
        let _ = Segment::unlink(&name);
        Segment::open_or_create(&name, 16 * 1024).unwrap()
    }

    #[test]
    fn insert_is_deduplicating() {
        let seg = segment("dedup");
        let mut set = ShmSet::new(CaseMode::Folded);
        assert!(set.insert(&seg, "Launcher.exe").unwrap());
        assert!(!set.insert(&seg, "LAUNCHER.EXE").unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.contains(&seg, "launcher.exe"));
        Segment::unlink(seg.name()).unwrap();
    }

    #[test]
    fn clear_twice_is_idempotent() {
        let seg = segment("clear");
        let mut set = ShmSet::new(CaseMode::Folded);
        set.insert(&seg, "a.exe").unwrap();
        set.insert(&seg, "b.exe").unwrap();
        set.clear(&seg);
        assert!(set.is_empty());
        set.clear(&seg);
        assert!(set.is_empty());
        Segment::unlink(seg.name()).unwrap();
    }
}
