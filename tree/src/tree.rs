use std::mem::size_of;

use smallvec::SmallVec;

use uvfs_shared::{ShmString, ShmVec};
use uvfs_shm::{Offset, Segment};

use crate::error::{TreeError, TreeErrorKind, TreeResult};
use crate::node::{NodeFlags, NodeKind, NodeView, TreeNode};

/// Well-known name of the root node inside a tree segment.
const ROOT_CONSTRUCT: &str = "tree";

/// Split a normalized virtual path into components.
pub fn split_components(path: &str) -> SmallVec<[&str; 8]> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Result of the longest-prefix walk.
#[derive(Clone, Debug)]
pub struct PrefixWalk {
    /// Number of matched components (0 = only the root matched).
    pub depth: usize,
    /// Snapshot of the deepest matched node.
    pub view: NodeView,
    /// Deepest matched node carrying a real path, with its depth.
    pub real_base: Option<(String, usize)>,
}

/// The shared virtual tree: virtual paths to host paths, one per segment.
///
/// All mutation runs under the caller's guard; the tree itself only
/// enforces structural invariants (sorted unique children, synthetic
/// intermediate directories).
pub struct VirtualTree {
    segment: Segment,
    root: Offset<TreeNode>,
}

impl VirtualTree {
    /// Attach or create the tree segment and its root node.
    pub fn open_or_create(name: &str, size: u64) -> TreeResult<Self> {
        let segment = Segment::open_or_create(name, size)?;
        let (root, _) = segment.find_or_construct(ROOT_CONSTRUCT, TreeNode::root)?;
        Ok(VirtualTree { segment, root })
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Name of the backing segment.
    pub fn shm_name(&self) -> &str {
        self.segment.name()
    }

    fn node(&self, off: Offset<TreeNode>) -> TreeNode {
        self.segment.read(off)
    }

    /// Create or replace the node at `path`. Missing intermediate
    /// directories are created as synthetic. Replacement keeps children.
    pub fn insert(
        &self,
        path: &str,
        real_path: Option<&str>,
        kind: NodeKind,
        flags: NodeFlags,
    ) -> TreeResult<()> {
        let components = split_components(path);
        if components.is_empty() {
            return Err(TreeError::new(TreeErrorKind::NotFound, "tree.insert.root"));
        }
        let seg = &self.segment;
        let mut cur = self.root;
        for (i, comp) in components.iter().enumerate() {
            let last = i + 1 == components.len();
            let parent = self.node(cur);
            match parent.search_child(seg, comp) {
                Ok(index) => {
                    let child_off = parent.children.get(seg, index).expect("child from search");
                    if last {
                        let mut child = self.node(child_off);
                        match real_path {
                            Some(real) => child.real_path.assign(seg, real)?,
                            None => child.real_path.free(seg),
                        }
                        child.flags = flags.bits();
                        child.kind = kind.to_raw();
                        seg.write(child_off, child);
                    } else {
                        let child = self.node(child_off);
                        if child.kind() != NodeKind::Directory {
                            return Err(TreeError::new(
                                TreeErrorKind::NotADirectory,
                                "tree.insert.component",
                            ));
                        }
                        cur = child_off;
                    }
                }
                Err(index) => {
                    let child_off = if last {
                        self.new_node(comp, kind, flags, real_path)?
                    } else {
                        self.new_node(comp, NodeKind::Directory, NodeFlags::SYNTHETIC, None)?
                    };
                    let mut parent = parent;
                    if let Err(err) = parent.children.insert(seg, index, child_off) {
                        self.free_subtree(child_off);
                        return Err(err.into());
                    }
                    seg.write(cur, parent);
                    cur = child_off;
                }
            }
        }
        Ok(())
    }

    /// Exact-match lookup.
    pub fn lookup(&self, path: &str) -> Option<NodeView> {
        let components = split_components(path);
        let seg = &self.segment;
        let mut cur = self.root;
        for comp in &components {
            let node = self.node(cur);
            let index = node.search_child(seg, comp).ok()?;
            cur = node.children.get(seg, index).expect("child from search");
        }
        Some(NodeView::of(seg, &self.node(cur)))
    }

    /// Walk as far as the tree matches, component by component.
    pub fn walk_prefix<S: AsRef<str>>(&self, components: &[S]) -> PrefixWalk {
        let seg = &self.segment;
        let mut cur = self.root;
        let mut depth = 0;
        let mut real_base = None;
        for comp in components {
            let node = self.node(cur);
            let Ok(index) = node.search_child(seg, comp.as_ref()) else {
                break;
            };
            cur = node.children.get(seg, index).expect("child from search");
            depth += 1;
            let reached = self.node(cur);
            if !reached.real_path.is_empty() {
                real_base = Some((reached.real_path.as_str(seg).to_owned(), depth));
            }
        }
        PrefixWalk {
            depth,
            view: NodeView::of(seg, &self.node(cur)),
            real_base,
        }
    }

    /// Detach and reclaim the subtree at `path`.
    pub fn remove(&self, path: &str) -> TreeResult<()> {
        let components = split_components(path);
        if components.is_empty() {
            return Err(TreeError::new(TreeErrorKind::NotFound, "tree.remove.root"));
        }
        let seg = &self.segment;
        let mut cur = self.root;
        for comp in &components[..components.len() - 1] {
            let node = self.node(cur);
            let index = node
                .search_child(seg, comp)
                .map_err(|_| TreeError::new(TreeErrorKind::NotFound, "tree.remove.walk"))?;
            cur = node.children.get(seg, index).expect("child from search");
        }
        let mut parent = self.node(cur);
        let last = components[components.len() - 1];
        let index = parent
            .search_child(seg, last)
            .map_err(|_| TreeError::new(TreeErrorKind::NotFound, "tree.remove.leaf"))?;
        let child_off = parent.children.remove(seg, index);
        seg.write(cur, parent);
        self.free_subtree(child_off);
        Ok(())
    }

    /// Snapshots of the children of the directory at `path`.
    pub fn children<S: AsRef<str>>(&self, components: &[S]) -> TreeResult<Vec<NodeView>> {
        let seg = &self.segment;
        let mut cur = self.root;
        for comp in components {
            let node = self.node(cur);
            let index = node
                .search_child(seg, comp.as_ref())
                .map_err(|_| TreeError::new(TreeErrorKind::NotFound, "tree.children.walk"))?;
            cur = node.children.get(seg, index).expect("child from search");
        }
        let node = self.node(cur);
        if node.kind() != NodeKind::Directory {
            return Err(TreeError::new(
                TreeErrorKind::NotADirectory,
                "tree.children.kind",
            ));
        }
        Ok(node
            .children
            .iter(seg)
            .map(|off| NodeView::of(seg, &self.node(off)))
            .collect())
    }

    fn new_node(
        &self,
        name: &str,
        kind: NodeKind,
        flags: NodeFlags,
        real_path: Option<&str>,
    ) -> TreeResult<Offset<TreeNode>> {
        let seg = &self.segment;
        let mut name_s = ShmString::from_str(seg, name)?;
        let mut real_s = match real_path {
            Some(real) => match ShmString::from_str(seg, real) {
                Ok(s) => s,
                Err(err) => {
                    name_s.free(seg);
                    return Err(err.into());
                }
            },
            None => ShmString::EMPTY,
        };
        let raw = match seg.alloc(size_of::<TreeNode>() as u32) {
            Ok(raw) => raw,
            Err(err) => {
                name_s.free(seg);
                real_s.free(seg);
                return Err(err.into());
            }
        };
        let off = Offset::new(raw);
        seg.write(
            off,
            TreeNode {
                name: name_s,
                real_path: real_s,
                children: ShmVec::new(),
                flags: flags.bits(),
                kind: kind.to_raw(),
                _pad: [0; 3],
            },
        );
        Ok(off)
    }

    fn free_subtree(&self, off: Offset<TreeNode>) {
        let seg = &self.segment;
        let mut node = self.node(off);
        let children: Vec<Offset<TreeNode>> = node.children.iter(seg).collect();
        for child in children {
            self.free_subtree(child);
        }
        node.name.free(seg);
        node.real_path.free(seg);
        node.children.free(seg);
        seg.dealloc(off.get(), size_of::<TreeNode>() as u32);
    }
}
