use std::cmp::Ordering;

use uvfs_shm::{Segment, ShmResult, ShmSafe};

use crate::map::{CaseMode, MapEntry};
use crate::string::ShmString;
use crate::vec::ShmVec;

/// Ordered map permitting duplicate keys. Among equal keys, iteration is
/// insertion order (new duplicates append after existing ones).
#[repr(C)]
pub struct ShmMultiMap<V: ShmSafe> {
    entries: ShmVec<MapEntry<V>>,
    case_mode: u8,
    _pad: [u8; 3],
}

impl<V: ShmSafe> Clone for ShmMultiMap<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ShmSafe> Copy for ShmMultiMap<V> {}

unsafe impl<V: ShmSafe> ShmSafe for ShmMultiMap<V> {}

impl<V: ShmSafe> ShmMultiMap<V> {
    pub const fn new(mode: CaseMode) -> Self {
        ShmMultiMap {
            entries: ShmVec::new(),
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

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry not less than `key`.
    fn lower_bound(&self, seg: &Segment, key: &str) -> usize {
        let mode = self.mode();
        match self.entries.binary_search_by(seg, |entry| {
            match mode.compare(entry.key.as_str(seg), key) {
                Ordering::Less => Ordering::Less,
                _ => Ordering::Greater,
            }
        }) {
            Ok(index) | Err(index) => index,
        }
    }

    /// Index just past the last entry equal to `key`.
    fn upper_bound(&self, seg: &Segment, key: &str) -> usize {
        let mode = self.mode();
        match self.entries.binary_search_by(seg, |entry| {
            match mode.compare(entry.key.as_str(seg), key) {
                Ordering::Greater => Ordering::Greater,
                _ => Ordering::Less,
            }
        }) {
            Ok(index) | Err(index) => index,
        }
    }

    pub fn insert(&mut self, seg: &Segment, key: &str, value: V) -> ShmResult<()> {
        let index = self.upper_bound(seg, key);
        let mut stored = ShmString::from_str(seg, key)?;
        if let Err(err) = self.entries.insert(seg, index, MapEntry { key: stored, value }) {
            stored.free(seg);
            return Err(err);
        }
        Ok(())
    }

    pub fn get_all<'s>(&'s self, seg: &'s Segment, key: &str) -> impl Iterator<Item = V> + 's {
        let low = self.lower_bound(seg, key);
        let high = self.upper_bound(seg, key);
        (low..high).filter_map(move |i| self.entries.get(seg, i).map(|entry| entry.value))
    }

    pub fn contains_key(&self, seg: &Segment, key: &str) -> bool {
        self.lower_bound(seg, key) < self.upper_bound(seg, key)
    }

    /// Remove every entry with this key; returns how many were removed.
    pub fn remove_all(&mut self, seg: &Segment, key: &str) -> usize {
        let low = self.lower_bound(seg, key);
        let high = self.upper_bound(seg, key);
        for index in (low..high).rev() {
            let mut entry = self.entries.remove(seg, index);
            entry.key.free(seg);
        }
        high - low
    }

    pub fn iter<'s>(&'s self, seg: &'s Segment) -> impl Iterator<Item = (&'s str, V)> + 's {
        self.entries
            .iter(seg)
            .map(move |entry| (entry.key.as_str(seg), entry.value))
    }

    pub fn clear_with(&mut self, seg: &Segment, mut release: impl FnMut(&Segment, V)) {
        for i in 0..self.entries.len() {
            if let Some(mut entry) = self.entries.get(seg, i) {
                entry.key.free(seg);
                release(seg, entry.value);
            }
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tag: &str) -> Segment {
        let name = format!("uvfs-mmap-{}-{}", tag, std::process::id());
        let _ = Segment::unlink(&name);
        Segment::open_or_create(&name, 32 * 1024).unwrap()
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let seg = segment("dup");
        let mut map = ShmMultiMap::<u32>::new(CaseMode::Folded);
        map.insert(&seg, "game.exe", 1).unwrap();
        map.insert(&seg, "other.exe", 9).unwrap();
        map.insert(&seg, "GAME.EXE", 2).unwrap();
        map.insert(&seg, "game.exe", 3).unwrap();

        let values: Vec<u32> = map.get_all(&seg, "Game.exe").collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(map.remove_all(&seg, "game.EXE"), 3);
        assert!(!map.contains_key(&seg, "game.exe"));
        assert_eq!(map.get_all(&seg, "other.exe").collect::<Vec<_>>(), vec![9]);
        Segment::unlink(seg.name()).unwrap();
    }
}
