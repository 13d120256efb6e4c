use std::ops::Deref;
use std::path::PathBuf;

use tracing::info;

use uvfs_resolver::{NormalizedPath, Resolver, TombstoneView};
use uvfs_shared::{case, wide, ShmString};
use uvfs_shm::{ContentLockToken, Segment};
use uvfs_tree::{NodeFlags, NodeKind, RealFs, VirtualTree};

use crate::config::{ForcedLibrary, SharedConfig};
use crate::context::HookContext;
use crate::error::ContextResult;
use crate::parameters::{CrashDumpsType, LogLevel, Parameters};

/// Shared (read) access to the configuration and virtual tree.
///
/// Held for the duration of one intercepted call; release is the drop of
/// the advisory lock token.
pub struct ReadGuard<'a> {
    ctx: &'a HookContext,
    _token: ContentLockToken<'a>,
}

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(ctx: &'a HookContext, token: ContentLockToken<'a>) -> Self {
        ReadGuard { ctx, _token: token }
    }

    fn seg(&self) -> &Segment {
        &self.ctx.config_segment
    }

    pub(crate) fn cfg(&self) -> SharedConfig {
        self.seg().read(self.ctx.config_slot)
    }

    pub fn tree(&self) -> &'a VirtualTree {
        &self.ctx.tree
    }

    pub fn inverse_tree(&self) -> &'a VirtualTree {
        &self.ctx.inverse_tree
    }

    /// A resolver over this guard's view of the shared state.
    pub fn resolver<'s>(&'s self, real: &'s dyn RealFs) -> Resolver<'s> {
        Resolver::new(&self.ctx.tree, self, real)
    }

    /// Number of processes currently attached to the instance.
    pub fn user_count(&self) -> u32 {
        self.cfg().user_count
    }

    pub fn registered_processes(&self) -> Vec<u32> {
        let cfg = self.cfg();
        cfg.process_list.iter(self.seg()).collect()
    }

    /// True iff any blacklisted suffix ends `app` or appears in `cmdline`,
    /// ignoring case.
    pub fn executable_blacklisted(&self, app: Option<&str>, cmdline: Option<&str>) -> bool {
        let cfg = self.cfg();
        let seg = self.seg();
        if let Some(app) = app {
            for suffix in cfg.process_blacklist.iter(seg) {
                if case::ends_with_folded(app, suffix) {
                    info!(app, "application is blacklisted");
                    return true;
                }
            }
        }
        if let Some(cmdline) = cmdline {
            for suffix in cfg.process_blacklist.iter(seg) {
                if case::contains_folded(cmdline, suffix) {
                    info!(cmdline, "command line is blacklisted");
                    return true;
                }
            }
        }
        false
    }

    /// Wide-string boundary of [`ReadGuard::executable_blacklisted`].
    pub fn executable_blacklisted_wide(
        &self,
        app: Option<&[u16]>,
        cmdline: Option<&[u16]>,
    ) -> bool {
        let app = app.map(wide::from_wide);
        let cmdline = cmdline.map(wide::from_wide);
        self.executable_blacklisted(app.as_deref(), cmdline.as_deref())
    }

    /// Libraries to inject into a process with this name (matched
    /// case-insensitively), newest registration first.
    pub fn libraries_to_force_load(&self, process: &str) -> Vec<PathBuf> {
        let cfg = self.cfg();
        let seg = self.seg();
        cfg.forced_libraries
            .iter(seg)
            .filter(|lib| case::eq_folded(lib.process.as_str(seg), process))
            .map(|lib| PathBuf::from(lib.library.as_str(seg)))
            .collect()
    }

    pub fn exists_deleted_file(&self, path: &str) -> bool {
        match NormalizedPath::parse(path) {
            Ok(norm) => self.deleted_key_present(norm.as_key()),
            Err(_) => false,
        }
    }

    pub fn lookup_deleted_file(&self, path: &str) -> Option<String> {
        let norm = NormalizedPath::parse(path).ok()?;
        let cfg = self.cfg();
        cfg.deleted_files
            .get(self.seg(), norm.as_key())
            .map(|value| value.as_str(self.seg()).to_owned())
    }

    pub fn exists_fake_directory(&self, path: &str) -> bool {
        match NormalizedPath::parse(path) {
            Ok(norm) => self.cfg().fake_directories.contains_key(self.seg(), norm.as_key()),
            Err(_) => false,
        }
    }

    pub fn lookup_fake_directory(&self, path: &str) -> Option<String> {
        let norm = NormalizedPath::parse(path).ok()?;
        let cfg = self.cfg();
        cfg.fake_directories
            .get(self.seg(), norm.as_key())
            .map(|value| value.as_str(self.seg()).to_owned())
    }

    pub fn overlay_root_path(&self) -> Option<PathBuf> {
        let cfg = self.cfg();
        let root = cfg.overlay_root.as_str(self.seg());
        if root.is_empty() {
            None
        } else {
            Some(PathBuf::from(root))
        }
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_raw(self.cfg().log_level)
    }

    pub fn crash_dumps_type(&self) -> CrashDumpsType {
        CrashDumpsType::from_raw(self.cfg().crash_dumps_type)
    }

    pub fn debug_mode(&self) -> bool {
        self.cfg().debug_mode != 0
    }

    fn deleted_key_present(&self, key: &str) -> bool {
        self.cfg().deleted_files.contains_key(self.seg(), key)
    }

    pub(crate) fn parameters_snapshot(&self) -> ContextResult<Parameters> {
        let cfg = self.cfg();
        let seg = self.seg();
        let mut params = Parameters::new(cfg.instance_name.as_str(seg))?;
        params.set_current_shm_name(cfg.current_tree_name.as_str(seg))?;
        params.set_current_inverse_shm_name(cfg.current_inverse_name.as_str(seg))?;
        params.set_crash_dumps_path(cfg.crash_dumps_path.as_str(seg))?;
        params.debug_mode = cfg.debug_mode != 0;
        params.log_level = LogLevel::from_raw(cfg.log_level);
        params.crash_dumps_type = CrashDumpsType::from_raw(cfg.crash_dumps_type);
        Ok(params)
    }
}

/// The resolver consults tombstones through the guard it runs under.
impl TombstoneView for ReadGuard<'_> {
    fn is_deleted(&self, key: &str) -> bool {
        self.deleted_key_present(key)
    }

    fn fake_directory(&self, key: &str) -> Option<String> {
        let cfg = self.cfg();
        cfg.fake_directories
            .get(self.seg(), key)
            .map(|value| value.as_str(self.seg()).to_owned())
    }

    fn overlay_root(&self) -> Option<PathBuf> {
        self.overlay_root_path()
    }
}

/// Exclusive (write) access. Exclusivity holds exactly as far as the
/// advisory lock does.
pub struct WriteGuard<'a> {
    inner: ReadGuard<'a>,
}

impl<'a> Deref for WriteGuard<'a> {
    type Target = ReadGuard<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(ctx: &'a HookContext, token: ContentLockToken<'a>) -> Self {
        WriteGuard {
            inner: ReadGuard::new(ctx, token),
        }
    }

    fn update_cfg<R>(&self, f: impl FnOnce(&mut SharedConfig, &Segment) -> R) -> R {
        let seg = self.inner.seg();
        let mut cfg = self.inner.cfg();
        let result = f(&mut cfg, seg);
        seg.write(self.inner.ctx.config_slot, cfg);
        result
    }

    pub fn register_process(&self, pid: u32) -> ContextResult<()> {
        self.update_cfg(|cfg, seg| {
            match cfg.process_list.binary_search_by(seg, |entry| entry.cmp(&pid)) {
                Ok(_) => Ok(()),
                Err(index) => cfg.process_list.insert(seg, index, pid).map_err(Into::into),
            }
        })
    }

    pub fn unregister_current_process(&self) {
        let pid = std::process::id();
        self.update_cfg(|cfg, seg| {
            if let Ok(index) = cfg.process_list.binary_search_by(seg, |entry| entry.cmp(&pid)) {
                cfg.process_list.remove(seg, index);
            }
        });
    }

    pub fn blacklist_executable(&self, suffix: &str) -> ContextResult<()> {
        self.update_cfg(|cfg, seg| {
            cfg.process_blacklist
                .insert(seg, suffix)
                .map(|_| ())
                .map_err(Into::into)
        })
    }

    pub fn clear_executable_blacklist(&self) {
        self.update_cfg(|cfg, seg| cfg.process_blacklist.clear(seg));
    }

    pub fn force_load_library(&self, process: &str, library: &str) -> ContextResult<()> {
        self.update_cfg(|cfg, seg| {
            let mut process_s = ShmString::from_str(seg, process)?;
            let library_s = match ShmString::from_str(seg, library) {
                Ok(s) => s,
                Err(err) => {
                    process_s.free(seg);
                    return Err(err.into());
                }
            };
            let record = ForcedLibrary {
                process: process_s,
                library: library_s,
            };
            if let Err(err) = cfg.forced_libraries.push_front(seg, record) {
                let mut record = record;
                record.process.free(seg);
                record.library.free(seg);
                return Err(err.into());
            }
            Ok(())
        })
    }

    pub fn clear_library_force_loads(&self) {
        self.update_cfg(|cfg, seg| {
            cfg.forced_libraries.clear_with(seg, |seg, mut lib| {
                lib.process.free(seg);
                lib.library.free(seg);
            });
        });
    }

    /// Track `virtual_path` as virtually deleted; `real_path` records what
    /// it pointed at so a later create can restore it.
    pub fn add_deleted_file(&self, virtual_path: &str, real_path: &str) -> ContextResult<()> {
        let key = NormalizedPath::parse(virtual_path)?;
        self.update_cfg(|cfg, seg| {
            let value = ShmString::from_str(seg, real_path)?;
            match cfg.deleted_files.insert(seg, key.as_key(), value) {
                Ok(Some(mut previous)) => {
                    previous.free(seg);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => {
                    let mut value = value;
                    value.free(seg);
                    Err(err.into())
                }
            }
        })
    }

    pub fn forget_deleted_file(&self, virtual_path: &str) -> bool {
        let Ok(key) = NormalizedPath::parse(virtual_path) else {
            return false;
        };
        self.update_cfg(|cfg, seg| match cfg.deleted_files.remove(seg, key.as_key()) {
            Some(mut value) => {
                value.free(seg);
                true
            }
            None => false,
        })
    }

    pub fn add_fake_directory(&self, virtual_path: &str, real_path: &str) -> ContextResult<()> {
        let key = NormalizedPath::parse(virtual_path)?;
        self.update_cfg(|cfg, seg| {
            let value = ShmString::from_str(seg, real_path)?;
            match cfg.fake_directories.insert(seg, key.as_key(), value) {
                Ok(Some(mut previous)) => {
                    previous.free(seg);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => {
                    let mut value = value;
                    value.free(seg);
                    Err(err.into())
                }
            }
        })
    }

    pub fn forget_fake_directory(&self, virtual_path: &str) -> bool {
        let Ok(key) = NormalizedPath::parse(virtual_path) else {
            return false;
        };
        self.update_cfg(|cfg, seg| match cfg.fake_directories.remove(seg, key.as_key()) {
            Some(mut value) => {
                value.free(seg);
                true
            }
            None => false,
        })
    }

    pub fn set_overlay_root(&self, root: Option<&str>) -> ContextResult<()> {
        self.update_cfg(|cfg, seg| {
            match root {
                Some(root) => cfg.overlay_root.assign(seg, root)?,
                None => cfg.overlay_root.free(seg),
            }
            Ok(())
        })
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.update_cfg(|cfg, _| cfg.log_level = level.to_raw());
    }

    pub fn set_crash_dumps_type(&self, dumps: CrashDumpsType) {
        self.update_cfg(|cfg, _| cfg.crash_dumps_type = dumps.to_raw());
    }

    /// Map a virtual path onto a real one, maintaining the inverse tree.
    pub fn insert_mapping(
        &self,
        virtual_path: &str,
        real_path: &str,
        kind: NodeKind,
        flags: NodeFlags,
    ) -> ContextResult<()> {
        let virtual_norm = NormalizedPath::parse(virtual_path)?;
        let real_norm = NormalizedPath::parse(real_path)?;
        self.inner
            .ctx
            .tree
            .insert(virtual_norm.as_key(), Some(real_norm.as_key()), kind, flags)?;
        self.inner.ctx.inverse_tree.insert(
            real_norm.as_key(),
            Some(virtual_norm.as_key()),
            kind,
            flags,
        )?;
        Ok(())
    }

    /// Add a purely virtual node (no real backing).
    pub fn insert_synthetic(
        &self,
        virtual_path: &str,
        kind: NodeKind,
        flags: NodeFlags,
    ) -> ContextResult<()> {
        let virtual_norm = NormalizedPath::parse(virtual_path)?;
        self.inner
            .ctx
            .tree
            .insert(virtual_norm.as_key(), None, kind, flags | NodeFlags::SYNTHETIC)?;
        Ok(())
    }

    /// Detach a virtual subtree, dropping its inverse mapping as well.
    pub fn remove_mapping(&self, virtual_path: &str) -> ContextResult<()> {
        let virtual_norm = NormalizedPath::parse(virtual_path)?;
        if let Some(view) = self.inner.ctx.tree.lookup(virtual_norm.as_key()) {
            if let Some(real) = view.real_path {
                if let Ok(real_norm) = NormalizedPath::parse(&real) {
                    let _ = self.inner.ctx.inverse_tree.remove(real_norm.as_key());
                }
            }
        }
        self.inner.ctx.tree.remove(virtual_norm.as_key())?;
        Ok(())
    }

    pub(crate) fn publish_segment_names(&self) -> ContextResult<()> {
        let tree_name = self.inner.ctx.tree.shm_name().to_owned();
        let inverse_name = self.inner.ctx.inverse_tree.shm_name().to_owned();
        self.update_cfg(|cfg, seg| {
            cfg.current_tree_name.assign(seg, &tree_name)?;
            cfg.current_inverse_name.assign(seg, &inverse_name)?;
            Ok(())
        })
    }
}
