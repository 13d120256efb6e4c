use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use uvfs_shm::{Offset, Segment, CONTENT_LOCK_TIMEOUT};
use uvfs_tree::VirtualTree;

use crate::config::{SharedConfig, CONFIG_CONSTRUCT};
use crate::delayed::{join_with_deadline, DelayedTask};
use crate::error::{ContextError, ContextResult};
use crate::guard::{ReadGuard, WriteGuard};
use crate::parameters::Parameters;

/// Minimum size of the configuration segment.
pub const CONFIG_SEGMENT_SIZE: u64 = 8 * 1024;
/// Minimum size of a virtual-tree segment.
pub const TREE_SEGMENT_SIZE: u64 = 64 * 1024;

const DELAYED_JOIN_DEADLINE: Duration = Duration::from_secs(5);

static ACTIVE: Mutex<Option<Arc<HookContext>>> = Mutex::new(None);

/// The process-local front end of the virtualization core.
///
/// Holds the mapped segments and process-local state; everything shared
/// lives behind [`HookContext::read_access`] / [`HookContext::write_access`].
pub struct HookContext {
    pub(crate) config_segment: Segment,
    pub(crate) config_slot: Offset<SharedConfig>,
    pub(crate) tree: VirtualTree,
    pub(crate) inverse_tree: VirtualTree,
    dll_dir: PathBuf,
    delayed: Mutex<Vec<DelayedTask>>,
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext").finish_non_exhaustive()
    }
}

impl HookContext {
    /// Construct the process singleton. Fails with
    /// [`ContextError::DuplicateSingleton`] when one already exists.
    pub fn create(params: &Parameters, module_path: &Path) -> ContextResult<Arc<Self>> {
        let mut active = ACTIVE.lock();
        if active.is_some() {
            return Err(ContextError::DuplicateSingleton);
        }
        let ctx = Arc::new(Self::connect(params, module_path)?);
        *active = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// The registered singleton, if any. Hook bodies that cannot thread a
    /// context through their entry points discover it here.
    pub fn active() -> Option<Arc<HookContext>> {
        ACTIVE.lock().clone()
    }

    /// Unregister the singleton. Teardown runs once the last clone drops.
    pub fn deactivate() -> bool {
        ACTIVE.lock().take().is_some()
    }

    /// Attach to an instance without registering the process singleton.
    /// Used by controller processes (and tests) that manage the instance
    /// but are not themselves hooked.
    pub fn connect(params: &Parameters, module_path: &Path) -> ContextResult<Self> {
        let config_segment =
            Segment::open_or_create(params.instance_name(), CONFIG_SEGMENT_SIZE)?;

        let config_slot = match config_segment.find::<SharedConfig>(CONFIG_CONSTRUCT) {
            Some(slot) => {
                debug!(
                    pid = std::process::id(),
                    "attached to existing shared configuration"
                );
                slot
            }
            None => {
                debug!(pid = std::process::id(), "creating shared configuration");
                let built = SharedConfig::init(&config_segment, params)?;
                let (slot, created) = config_segment.construct_with(CONFIG_CONSTRUCT, built)?;
                if !created {
                    built.release(&config_segment);
                }
                slot
            }
        };

        let (tree_name, inverse_name, users) = {
            let token = config_segment.lock_content(CONTENT_LOCK_TIMEOUT);
            if !token.owned() {
                warn!("shared lock timed out during attach; proceeding");
            }
            let mut cfg = config_segment.read(config_slot);
            cfg.user_count += 1;
            config_segment.write(config_slot, cfg);
            (
                cfg.current_tree_name.as_str(&config_segment).to_owned(),
                cfg.current_inverse_name.as_str(&config_segment).to_owned(),
                cfg.user_count,
            )
        };

        let tree = VirtualTree::open_or_create(&tree_name, TREE_SEGMENT_SIZE)?;
        let inverse_tree = VirtualTree::open_or_create(&inverse_name, TREE_SEGMENT_SIZE)?;
        debug!(
            tree = %tree_name,
            users,
            "attached to virtual tree"
        );

        Ok(HookContext {
            config_segment,
            config_slot,
            tree,
            inverse_tree,
            dll_dir: module_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| module_path.to_path_buf()),
            delayed: Mutex::new(Vec::new()),
        })
    }

    /// Shared access to the configuration and virtual tree.
    pub fn read_access(&self) -> ReadGuard<'_> {
        let token = self.config_segment.lock_content(CONTENT_LOCK_TIMEOUT);
        if !token.owned() {
            warn!("read guard timed out waiting for the shared lock; proceeding");
        }
        ReadGuard::new(self, token)
    }

    /// Exclusive access. The underlying lock is the same advisory word the
    /// readers use; exclusivity holds exactly as far as the lock does.
    pub fn write_access(&self) -> WriteGuard<'_> {
        let token = self.config_segment.lock_content(CONTENT_LOCK_TIMEOUT);
        if !token.owned() {
            warn!("write guard timed out waiting for the shared lock; proceeding");
        }
        WriteGuard::new(self, token)
    }

    /// Directory containing the injected library.
    pub fn dll_path(&self) -> &Path {
        &self.dll_dir
    }

    /// Wide-string boundary of [`HookContext::dll_path`].
    pub fn dll_path_wide(&self) -> Vec<u16> {
        uvfs_shared::wide::to_wide(&self.dll_dir.to_string_lossy())
    }

    /// Republish the tree segment names into the shared configuration and
    /// return the flat parameter block for a child process.
    pub fn call_parameters(&self) -> ContextResult<Parameters> {
        let guard = self.write_access();
        guard.publish_segment_names()?;
        guard.parameters_snapshot()
    }

    /// Track background work to be joined at teardown.
    pub fn register_delayed(&self, task: DelayedTask) {
        self.delayed.lock().push(task);
    }

    /// The pending background tasks.
    pub fn delayed(&self) -> MutexGuard<'_, Vec<DelayedTask>> {
        self.delayed.lock()
    }
}

impl Drop for HookContext {
    fn drop(&mut self) {
        info!("releasing hook context");

        let pending = std::mem::take(&mut *self.delayed.lock());
        if !pending.is_empty() {
            join_with_deadline(pending, DELAYED_JOIN_DEADLINE);
        }

        let remaining = {
            let token = self.config_segment.lock_content(CONTENT_LOCK_TIMEOUT);
            if !token.owned() {
                warn!("shared lock timed out during detach; proceeding");
            }
            let mut cfg = self.config_segment.read(self.config_slot);
            cfg.user_count = cfg.user_count.saturating_sub(1);
            self.config_segment.write(self.config_slot, cfg);
            cfg.user_count
        };

        if remaining == 0 {
            info!(
                instance = %self.config_segment.name(),
                "last user detached; removing shared segments"
            );
            let _ = Segment::unlink(self.tree.shm_name());
            let _ = Segment::unlink(self.inverse_tree.shm_name());
            let _ = Segment::unlink(self.config_segment.name());
        } else {
            info!(remaining, "detached from hook context");
        }
    }
}

/// Collaborator-facing constructor: build and register the singleton.
pub fn create_hook_context(
    params: &Parameters,
    module_path: &Path,
) -> ContextResult<Arc<HookContext>> {
    HookContext::create(params, module_path)
}
