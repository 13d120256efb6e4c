use std::path::PathBuf;

use uvfs_tree::NodeKind;

/// What an intercepted call wants from the path it passed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveIntent {
    /// Open something that must already exist.
    OpenExisting,
    /// Open, creating when absent.
    OpenCreate,
    /// List a directory.
    Enumerate,
    /// Remove the entry.
    Delete,
    /// Move the entry to `target`. Source resolution applies delete
    /// semantics; the target is resolved separately with create semantics.
    Rename { target: String },
}

/// Why a resolution denies the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// Answer as if the entry does not exist.
    NotFound,
}

/// Instruction handed back to the intercepted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Forward unchanged with this real path.
    Passthrough(PathBuf),
    /// Forward with this rewritten real path.
    Redirect(PathBuf),
    /// Do not forward; answer from the virtual tree.
    Synthesize(NodeKind),
    /// Do not forward; answer with the given failure.
    Deny(DenyReason),
    /// Create under the configured overlay root.
    CreateInOverlay(PathBuf),
}
