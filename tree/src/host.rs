use std::io;
use std::path::Path;

use crate::node::NodeKind;

/// One entry of a real directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Host-filesystem seam.
///
/// The tree and the resolver probe the host only through this trait so
/// tests can substitute a fake filesystem.
pub trait RealFs {
    /// Kind of the host entry at `path`, or `None` when absent.
    fn entry_kind(&self, path: &Path) -> Option<NodeKind>;

    /// List a real directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<RealEntry>>;

    fn exists(&self, path: &Path) -> bool {
        self.entry_kind(path).is_some()
    }
}

/// `std::fs`-backed implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdRealFs;

impl RealFs for StdRealFs {
    fn entry_kind(&self, path: &Path) -> Option<NodeKind> {
        let meta = std::fs::metadata(path).ok()?;
        Some(if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<RealEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let kind = match entry.file_type() {
                Ok(ty) if ty.is_dir() => NodeKind::Directory,
                Ok(_) => NodeKind::File,
                Err(_) => continue,
            };
            entries.push(RealEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }
}
