use std::path::PathBuf;

use uvfs_shared::case;

use crate::error::{TreeError, TreeErrorKind, TreeResult};
use crate::host::RealFs;
use crate::node::{NodeFlags, NodeKind};
use crate::tree::VirtualTree;

/// One entry of a merged directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedEntry {
    pub name: String,
    pub kind: NodeKind,
    pub real_path: Option<PathBuf>,
}

impl VirtualTree {
    /// Merged listing of a virtual directory.
    ///
    /// Virtual children come first on folded-name ties; children carrying
    /// the shadow flag are suppressed and also hide the equally named real
    /// entry. The real side is the nearest mapped ancestor's real path
    /// joined with the unmatched suffix.
    pub fn enumerate<S: AsRef<str>>(
        &self,
        components: &[S],
        real: &dyn RealFs,
    ) -> TreeResult<Vec<MergedEntry>> {
        let walk = self.walk_prefix(components);
        let exact = walk.depth == components.len();
        if exact && walk.view.kind != NodeKind::Directory {
            return Err(TreeError::new(
                TreeErrorKind::NotADirectory,
                "tree.enumerate.kind",
            ));
        }

        let mut out: Vec<MergedEntry> = Vec::new();
        let mut virtual_names: Vec<String> = Vec::new();
        let mut shadowed: Vec<String> = Vec::new();

        if exact {
            for child in self.children(components)? {
                let folded = case::fold(&child.name);
                if child.flags.contains(NodeFlags::SHADOW) {
                    shadowed.push(folded);
                    continue;
                }
                virtual_names.push(folded);
                out.push(MergedEntry {
                    name: child.name,
                    kind: child.kind,
                    real_path: child.real_path.map(PathBuf::from),
                });
            }
        }

        let real_dir: Option<PathBuf> = walk.real_base.as_ref().map(|(base, depth)| {
            let mut dir = PathBuf::from(base);
            for comp in &components[*depth..] {
                dir.push(comp.as_ref());
            }
            dir
        });

        if real_dir.is_none() && !exact {
            return Err(TreeError::new(TreeErrorKind::NotFound, "tree.enumerate"));
        }

        if let Some(dir) = real_dir {
            if let Ok(entries) = real.read_dir(&dir) {
                for entry in entries {
                    let folded = case::fold(&entry.name);
                    if virtual_names.contains(&folded) || shadowed.contains(&folded) {
                        continue;
                    }
                    out.push(MergedEntry {
                        real_path: Some(dir.join(&entry.name)),
                        name: entry.name,
                        kind: entry.kind,
                    });
                }
            }
        }

        // Stable: virtual entries were pushed first, so they win folded ties.
        out.sort_by(|a, b| case::cmp_folded(&a.name, &b.name));
        Ok(out)
    }
}
