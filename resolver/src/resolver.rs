use std::path::PathBuf;

use uvfs_tree::{MergedEntry, RealFs, TreeErrorKind, VirtualTree};

use crate::action::{Action, DenyReason, ResolveIntent};
use crate::error::ResolveResult;
use crate::normalize::NormalizedPath;

/// Read access to the shared tombstone tables and overlay configuration.
///
/// Implemented by the hook context's guards; the resolver itself never
/// acquires anything.
pub trait TombstoneView {
    /// Is this normalized path tracked as virtually deleted?
    fn is_deleted(&self, key: &str) -> bool;

    /// Original real path of a faked directory, when tracked.
    fn fake_directory(&self, key: &str) -> Option<String>;

    /// Real directory absorbing creations through unmapped virtual paths.
    fn overlay_root(&self) -> Option<PathBuf>;
}

/// The decision procedure every intercepted filesystem call consults.
///
/// A `Resolver` borrows a held guard's view of the shared state and is
/// pure: resolving never mutates the tree, the tables or the host.
pub struct Resolver<'a> {
    tree: &'a VirtualTree,
    tombstones: &'a dyn TombstoneView,
    real: &'a dyn RealFs,
}

impl<'a> Resolver<'a> {
    pub fn new(
        tree: &'a VirtualTree,
        tombstones: &'a dyn TombstoneView,
        real: &'a dyn RealFs,
    ) -> Self {
        Self {
            tree,
            tombstones,
            real,
        }
    }

    /// Translate a host path plus intent into an action.
    pub fn resolve(&self, input: &str, intent: &ResolveIntent) -> ResolveResult<Action> {
        let norm = NormalizedPath::parse(input)?;

        // Tombstones win over everything: a deleted entry stays invisible
        // even while the real file exists.
        let delete_semantics = matches!(
            intent,
            ResolveIntent::OpenExisting | ResolveIntent::Delete | ResolveIntent::Rename { .. }
        );
        if delete_semantics && self.tombstones.is_deleted(norm.as_key()) {
            return Ok(Action::Deny(DenyReason::NotFound));
        }

        if matches!(intent, ResolveIntent::Enumerate)
            && self.tombstones.fake_directory(norm.as_key()).is_some()
        {
            return Ok(Action::Synthesize(uvfs_tree::NodeKind::Directory));
        }

        let components = norm.components();
        let walk = self.tree.walk_prefix(components);
        let exact = walk.depth == components.len();

        if exact && walk.view.is_synthetic() {
            return Ok(Action::Synthesize(walk.view.kind));
        }

        if let Some((base, depth)) = &walk.real_base {
            let mut candidate = PathBuf::from(base);
            for comp in &components[*depth..] {
                candidate.push(comp);
            }
            match intent {
                ResolveIntent::OpenExisting
                | ResolveIntent::Delete
                | ResolveIntent::Enumerate
                | ResolveIntent::Rename { .. } => {
                    if self.real.exists(&candidate) {
                        return Ok(Action::Redirect(candidate));
                    }
                }
                ResolveIntent::OpenCreate => {}
            }
        }

        if matches!(intent, ResolveIntent::OpenCreate) {
            if let Some(root) = self.tombstones.overlay_root() {
                return Ok(Action::CreateInOverlay(root.join(norm.overlay_suffix())));
            }
        }

        Ok(Action::Passthrough(PathBuf::from(norm.original())))
    }

    /// Resolve a rename pair: delete semantics for the source, create
    /// semantics for the target.
    pub fn resolve_rename(&self, source: &str, target: &str) -> ResolveResult<(Action, Action)> {
        let source_action = self.resolve(
            source,
            &ResolveIntent::Rename {
                target: target.to_owned(),
            },
        )?;
        let target_action = self.resolve(target, &ResolveIntent::OpenCreate)?;
        Ok((source_action, target_action))
    }

    /// Merged listing of a virtual directory, honoring faked directories:
    /// a tracked fake yields a (possibly empty) view even when nothing
    /// real backs it.
    pub fn enumerate(&self, input: &str) -> ResolveResult<Vec<MergedEntry>> {
        let norm = NormalizedPath::parse(input)?;
        match self.tree.enumerate(norm.components(), self.real) {
            Ok(entries) => Ok(entries),
            Err(err) if err.kind() == TreeErrorKind::NotFound => {
                if self.tombstones.fake_directory(norm.as_key()).is_some() {
                    Ok(Vec::new())
                } else {
                    Err(err.into())
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}
