use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use uvfs_resolver::{Action, DenyReason, ResolveIntent, Resolver, TombstoneView};
use uvfs_shm::Segment;
use uvfs_tree::{NodeFlags, NodeKind, RealEntry, RealFs, VirtualTree};

fn tree(tag: &str) -> VirtualTree {
    let name = format!("uvfs-resolve-{}-{}", tag, std::process::id());
    let _ = Segment::unlink(&name);
    VirtualTree::open_or_create(&name, 64 * 1024).unwrap()
}

fn drop_tree(tree: VirtualTree) {
    let name = tree.shm_name().to_owned();
    drop(tree);
    Segment::unlink(&name).unwrap();
}

#[derive(Default)]
struct FakeTombstones {
    deleted: HashSet<String>,
    fakes: HashMap<String, String>,
    overlay: Option<PathBuf>,
}

impl FakeTombstones {
    fn delete(mut self, key: &str) -> Self {
        self.deleted.insert(key.to_lowercase());
        self
    }

    fn fake(mut self, key: &str, real: &str) -> Self {
        self.fakes.insert(key.to_lowercase(), real.to_owned());
        self
    }

    fn overlay(mut self, root: &str) -> Self {
        self.overlay = Some(PathBuf::from(root));
        self
    }
}

impl TombstoneView for FakeTombstones {
    fn is_deleted(&self, key: &str) -> bool {
        self.deleted.contains(&key.to_lowercase())
    }

    fn fake_directory(&self, key: &str) -> Option<String> {
        self.fakes.get(&key.to_lowercase()).cloned()
    }

    fn overlay_root(&self) -> Option<PathBuf> {
        self.overlay.clone()
    }
}

#[derive(Default)]
struct FakeFs {
    dirs: HashMap<PathBuf, Vec<RealEntry>>,
    files: HashSet<PathBuf>,
}

impl FakeFs {
    fn with_file(mut self, path: &str) -> Self {
        self.files.insert(PathBuf::from(path));
        self
    }

    fn with_dir(mut self, path: &str, entries: &[(&str, NodeKind)]) -> Self {
        self.dirs.insert(
            PathBuf::from(path),
            entries
                .iter()
                .map(|(name, kind)| RealEntry {
                    name: (*name).to_owned(),
                    kind: *kind,
                })
                .collect(),
        );
        self
    }
}

impl RealFs for FakeFs {
    fn entry_kind(&self, path: &Path) -> Option<NodeKind> {
        if self.dirs.contains_key(path) {
            return Some(NodeKind::Directory);
        }
        if self.files.contains(path) {
            return Some(NodeKind::File);
        }
        None
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<RealEntry>> {
        self.dirs
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

#[test]
fn tombstone_hides_real_file_until_forgotten() {
    let tree = tree("tombstone");
    let real = FakeFs::default().with_file("C:/x/a.txt");

    let stones = FakeTombstones::default().delete("C:/x/a.txt");
    let resolver = Resolver::new(&tree, &stones, &real);
    assert_eq!(
        resolver
            .resolve("C:/x/a.txt", &ResolveIntent::OpenExisting)
            .unwrap(),
        Action::Deny(DenyReason::NotFound)
    );
    assert_eq!(
        resolver
            .resolve("C:/X/A.TXT", &ResolveIntent::Delete)
            .unwrap(),
        Action::Deny(DenyReason::NotFound)
    );

    // After forgetting, the same path passes through untouched.
    let forgotten = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &forgotten, &real);
    assert_eq!(
        resolver
            .resolve("C:/x/a.txt", &ResolveIntent::OpenExisting)
            .unwrap(),
        Action::Passthrough(PathBuf::from("C:/x/a.txt"))
    );

    drop_tree(tree);
}

#[test]
fn mapped_file_redirects_when_real_target_exists() {
    let tree = tree("redirect");
    tree.insert(
        "c:/game/data/mod.esp",
        Some("D:/mods/A/mod.esp"),
        NodeKind::File,
        NodeFlags::REDIRECT,
    )
    .unwrap();

    let real = FakeFs::default().with_file("D:/mods/A/mod.esp");
    let stones = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &stones, &real);

    assert_eq!(
        resolver
            .resolve("C:/game/data/mod.esp", &ResolveIntent::OpenExisting)
            .unwrap(),
        Action::Redirect(PathBuf::from("D:/mods/A/mod.esp"))
    );

    drop_tree(tree);
}

#[test]
fn missing_redirect_target_falls_through_to_passthrough() {
    let tree = tree("fallthrough");
    tree.insert(
        "c:/game/data/mod.esp",
        Some("D:/mods/A/mod.esp"),
        NodeKind::File,
        NodeFlags::REDIRECT,
    )
    .unwrap();

    let real = FakeFs::default(); // target does not exist
    let stones = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &stones, &real);

    assert_eq!(
        resolver
            .resolve("C:/game/data/mod.esp", &ResolveIntent::OpenExisting)
            .unwrap(),
        Action::Passthrough(PathBuf::from("C:/game/data/mod.esp"))
    );

    drop_tree(tree);
}

#[test]
fn synthetic_node_synthesizes() {
    let tree = tree("synthesize");
    tree.insert(
        "c:/game/data/mod.esp",
        Some("D:/mods/A/mod.esp"),
        NodeKind::File,
        NodeFlags::REDIRECT,
    )
    .unwrap();

    let real = FakeFs::default();
    let stones = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &stones, &real);

    // Intermediate directories exist only virtually.
    assert_eq!(
        resolver
            .resolve("C:/game/data", &ResolveIntent::OpenExisting)
            .unwrap(),
        Action::Synthesize(NodeKind::Directory)
    );

    drop_tree(tree);
}

#[test]
fn open_create_lands_in_overlay() {
    let tree = tree("overlay");
    let real = FakeFs::default();
    let stones = FakeTombstones::default().overlay("E:/overlay");
    let resolver = Resolver::new(&tree, &stones, &real);

    assert_eq!(
        resolver
            .resolve("C:/game/data/new.esp", &ResolveIntent::OpenCreate)
            .unwrap(),
        Action::CreateInOverlay(PathBuf::from("E:/overlay/C/game/data/new.esp"))
    );

    // Without an overlay root the call behaves unhooked.
    let bare = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &bare, &real);
    assert_eq!(
        resolver
            .resolve("C:/game/data/new.esp", &ResolveIntent::OpenCreate)
            .unwrap(),
        Action::Passthrough(PathBuf::from("C:/game/data/new.esp"))
    );

    drop_tree(tree);
}

#[test]
fn fake_directory_synthesizes_enumeration() {
    let tree = tree("fakedir");
    let real = FakeFs::default();
    let stones = FakeTombstones::default().fake("C:/game/fake", "C:/game/fake");
    let resolver = Resolver::new(&tree, &stones, &real);

    assert_eq!(
        resolver
            .resolve("C:/game/FAKE", &ResolveIntent::Enumerate)
            .unwrap(),
        Action::Synthesize(NodeKind::Directory)
    );
    assert_eq!(resolver.enumerate("C:/game/FAKE").unwrap(), Vec::new());

    drop_tree(tree);
}

#[test]
fn rename_source_honors_tombstones() {
    let tree = tree("rename");
    let real = FakeFs::default().with_file("C:/x/a.txt");
    let stones = FakeTombstones::default()
        .delete("C:/x/a.txt")
        .overlay("E:/overlay");
    let resolver = Resolver::new(&tree, &stones, &real);

    let (source, target) = resolver.resolve_rename("C:/x/a.txt", "C:/x/b.txt").unwrap();
    assert_eq!(source, Action::Deny(DenyReason::NotFound));
    assert_eq!(
        target,
        Action::CreateInOverlay(PathBuf::from("E:/overlay/C/x/b.txt"))
    );

    drop_tree(tree);
}

#[test]
fn enumerate_merges_through_resolver() {
    let tree = tree("enumerate");
    tree.insert(
        "c:/game/data",
        Some("c:/game/data"),
        NodeKind::Directory,
        NodeFlags::empty(),
    )
    .unwrap();
    tree.insert(
        "c:/game/data/mod.esp",
        None,
        NodeKind::File,
        NodeFlags::SYNTHETIC,
    )
    .unwrap();

    let real = FakeFs::default().with_dir("c:/game/data", &[("base.esp", NodeKind::File)]);
    let stones = FakeTombstones::default();
    let resolver = Resolver::new(&tree, &stones, &real);

    let names: Vec<String> = resolver
        .enumerate("C:\\game\\data")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["base.esp".to_owned(), "mod.esp".to_owned()]);

    drop_tree(tree);
}
