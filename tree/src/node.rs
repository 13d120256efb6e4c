use bitflags::bitflags;

use uvfs_shared::{case, ShmString, ShmVec};
use uvfs_shm::{Offset, Segment, ShmSafe};

/// What a virtual node stands for on the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            NodeKind::File => 0,
            NodeKind::Directory => 1,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            NodeKind::File
        } else {
            NodeKind::Directory
        }
    }
}

bitflags! {
    /// Behavior flags of a virtual node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u32 {
        /// The node exists only in the virtual tree.
        const SYNTHETIC = 1 << 0;
        /// Operations on the node forward to its real path.
        const REDIRECT = 1 << 1;
        /// The node hides the equally named real entry on enumeration.
        const SHADOW = 1 << 2;
    }
}

/// One node of the shared virtual tree.
///
/// Children are offsets into the same segment, kept sorted by folded name;
/// names are unique per parent under folding.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TreeNode {
    pub(crate) name: ShmString,
    pub(crate) real_path: ShmString,
    pub(crate) children: ShmVec<Offset<TreeNode>>,
    pub(crate) flags: u32,
    pub(crate) kind: u8,
    pub(crate) _pad: [u8; 3],
}

unsafe impl ShmSafe for TreeNode {}

impl TreeNode {
    pub(crate) fn root() -> Self {
        TreeNode {
            name: ShmString::EMPTY,
            real_path: ShmString::EMPTY,
            children: ShmVec::new(),
            flags: NodeFlags::SYNTHETIC.bits(),
            kind: NodeKind::Directory.to_raw(),
            _pad: [0; 3],
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        NodeKind::from_raw(self.kind)
    }

    pub(crate) fn flags(&self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.flags)
    }

    pub(crate) fn is_synthetic(&self) -> bool {
        self.flags().contains(NodeFlags::SYNTHETIC)
    }

    /// Binary search among the children by folded component name.
    pub(crate) fn search_child(&self, seg: &Segment, name: &str) -> Result<usize, usize> {
        self.children.binary_search_by(seg, |child_off| {
            let child: TreeNode = seg.read(child_off);
            case::cmp_folded(child.name.as_str(seg), name)
        })
    }
}

/// Owned snapshot of a node, for callers outside the segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeView {
    pub name: String,
    pub kind: NodeKind,
    pub flags: NodeFlags,
    pub real_path: Option<String>,
}

impl NodeView {
    pub(crate) fn of(seg: &Segment, node: &TreeNode) -> Self {
        let real = node.real_path.as_str(seg);
        NodeView {
            name: node.name.as_str(seg).to_owned(),
            kind: node.kind(),
            flags: node.flags(),
            real_path: if real.is_empty() {
                None
            } else {
                Some(real.to_owned())
            },
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.flags.contains(NodeFlags::SYNTHETIC)
    }
}
