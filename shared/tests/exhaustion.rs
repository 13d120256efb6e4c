//! Containers must survive allocation failure without losing state.

use uvfs_shared::{CaseMode, ShmMap};
use uvfs_shm::{Segment, ShmErrorKind};

fn segment(tag: &str) -> Segment {
    let name = format!("uvfs-exhaust-{}-{}", tag, std::process::id());
    let _ = Segment::unlink(&name);
    Segment::open_or_create(&name, 4 * 1024).unwrap()
}

#[test]
fn failed_insert_leaves_map_unchanged() {
    let seg = segment("map");
    let mut map = ShmMap::<u64>::new(CaseMode::Sensitive);

    // Fill until an insert fails.
    let mut inserted = 0u64;
    let failure = loop {
        let key = format!("key-with-some-length-{inserted:04}");
        match map.insert(&seg, &key, inserted) {
            Ok(_) => inserted += 1,
            Err(err) => break err,
        }
    };
    assert_eq!(failure.kind(), ShmErrorKind::OutOfSegmentMemory);

    // Every successful insert is still present and ordered; the failed one
    // left no trace.
    assert_eq!(map.len(), inserted as usize);
    let mut previous = String::new();
    for (key, value) in map.iter(&seg) {
        assert!(previous.as_str() < key);
        assert_eq!(map.get(&seg, key), Some(value));
        previous = key.to_owned();
    }

    Segment::unlink(seg.name()).unwrap();
}
