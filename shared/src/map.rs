use std::cmp::Ordering;

use uvfs_shm::{Segment, ShmResult, ShmSafe};

use crate::case;
use crate::string::ShmString;
use crate::vec::ShmVec;

/// Key comparison mode. Host-path keys fold case to match host semantics;
/// everything else compares raw UTF-8 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseMode {
    Sensitive,
    Folded,
}

impl CaseMode {
    pub(crate) fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            CaseMode::Sensitive => a.as_bytes().cmp(b.as_bytes()),
            CaseMode::Folded => case::cmp_folded(a, b),
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            CaseMode::Sensitive => 0,
            CaseMode::Folded => 1,
        }
    }

    fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            CaseMode::Sensitive
        } else {
            CaseMode::Folded
        }
    }
}

#[repr(C)]
pub struct MapEntry<V: ShmSafe> {
    pub key: ShmString,
    pub value: V,
}

impl<V: ShmSafe> Clone for MapEntry<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ShmSafe> Copy for MapEntry<V> {}

unsafe impl<V: ShmSafe> ShmSafe for MapEntry<V> {}

/// Ordered string-keyed map stored as a sorted vector of entries.
///
/// Sortedness gives ordered, insertion-stable iteration; a sorted vector
/// keeps every intra-segment reference a plain offset, which is the whole
/// point of the toolkit.
#[repr(C)]
pub struct ShmMap<V: ShmSafe> {
    entries: ShmVec<MapEntry<V>>,
    case_mode: u8,
    _pad: [u8; 3],
}

impl<V: ShmSafe> Clone for ShmMap<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ShmSafe> Copy for ShmMap<V> {}

unsafe impl<V: ShmSafe> ShmSafe for ShmMap<V> {}

impl<V: ShmSafe> ShmMap<V> {
    pub const fn new(mode: CaseMode) -> Self {
        ShmMap {
            entries: ShmVec::new(),
            case_mode: match mode {
                CaseMode::Sensitive => 0,
                CaseMode::Folded => 1,
            },
            _pad: [0; 3],
        }
    }

    pub fn case_mode(&self) -> CaseMode {
        CaseMode::from_raw(self.case_mode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search(&self, seg: &Segment, key: &str) -> Result<usize, usize> {
        let mode = self.case_mode();
        self.entries
            .binary_search_by(seg, |entry| mode.compare(entry.key.as_str(seg), key))
    }

    /// Insert or replace. Returns the previous value when replacing.
    ///
    /// Allocation happens before any mutation; on failure the map is left
    /// unchanged.
    pub fn insert(&mut self, seg: &Segment, key: &str, value: V) -> ShmResult<Option<V>> {
        match self.search(seg, key) {
            Ok(index) => {
                let mut entry = self.entries.get(seg, index).expect("index from search");
                let previous = entry.value;
                entry.value = value;
                self.entries.set(seg, index, entry);
                Ok(Some(previous))
            }
            Err(index) => {
                let mut stored = ShmString::from_str(seg, key)?;
                if let Err(err) = self.entries.insert(seg, index, MapEntry { key: stored, value }) {
                    stored.free(seg);
                    return Err(err);
                }
                Ok(None)
            }
        }
    }

    pub fn get(&self, seg: &Segment, key: &str) -> Option<V> {
        let index = self.search(seg, key).ok()?;
        self.entries.get(seg, index).map(|entry| entry.value)
    }

    pub fn contains_key(&self, seg: &Segment, key: &str) -> bool {
        self.search(seg, key).is_ok()
    }

    pub fn remove(&mut self, seg: &Segment, key: &str) -> Option<V> {
        let index = self.search(seg, key).ok()?;
        let mut entry = self.entries.remove(seg, index);
        entry.key.free(seg);
        Some(entry.value)
    }

    pub fn iter<'s>(&'s self, seg: &'s Segment) -> impl Iterator<Item = (&'s str, V)> + 's {
        self.entries
            .iter(seg)
            .map(move |entry| (entry.key.as_str(seg), entry.value))
    }

    /// Remove every entry, handing each value to `release` so nested
    /// shared storage can be returned to the segment.
    pub fn clear_with(&mut self, seg: &Segment, mut release: impl FnMut(&Segment, V)) {
        for i in 0..self.entries.len() {
            if let Some(mut entry) = self.entries.get(seg, i) {
                entry.key.free(seg);
                release(seg, entry.value);
            }
        }
        self.entries.clear();
    }

    pub fn clear(&mut self, seg: &Segment) {
        self.clear_with(seg, |_, _| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn segment(tag: &str) -> Segment {
        let name = format!("uvfs-map-{}-{}", tag, std::process::id());
        let _ = Segment::unlink(&name);
        Segment::open_or_create(&name, 32 * 1024).unwrap()
    }

    #[test]
    fn ordered_iteration() {
        let seg = segment("order");
        let mut map = ShmMap::<u32>::new(CaseMode::Sensitive);
        map.insert(&seg, "zeta", 3).unwrap();
        map.insert(&seg, "alpha", 1).unwrap();
        map.insert(&seg, "mid", 2).unwrap();

        let keys: Vec<&str> = map.iter(&seg).map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
        Segment::unlink(seg.name()).unwrap();
    }

    #[test]
    fn replace_returns_previous() {
        let seg = segment("replace");
        let mut map = ShmMap::<u32>::new(CaseMode::Sensitive);
        assert_eq!(map.insert(&seg, "k", 1).unwrap(), None);
        assert_eq!(map.insert(&seg, "k", 2).unwrap(), Some(1));
        assert_eq!(map.get(&seg, "k"), Some(2));
        assert_eq!(map.len(), 1);
        Segment::unlink(seg.name()).unwrap();
    }

    #[test]
    fn folded_keys_match_any_case() {
        let seg = segment("folded");
        let mut map = ShmMap::<u32>::new(CaseMode::Folded);
        map.insert(&seg, "C:/Game/Data/Mod.esp", 9).unwrap();
        assert_eq!(map.get(&seg, "c:/game/data/mod.ESP"), Some(9));
        assert!(map.contains_key(&seg, "C:/GAME/DATA/MOD.ESP"));
        assert_eq!(map.remove(&seg, "c:/game/data/mod.esp"), Some(9));
        assert!(map.is_empty());
        Segment::unlink(seg.name()).unwrap();
    }

    #[test]
    fn remove_missing_is_none() {
        let seg = segment("missing");
        let mut map = ShmMap::<u32>::new(CaseMode::Sensitive);
        assert_eq!(map.remove(&seg, "nope"), None);
        Segment::unlink(seg.name()).unwrap();
    }
}
