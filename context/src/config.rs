use uvfs_shared::{CaseMode, ShmList, ShmMap, ShmSet, ShmString, ShmVec};
use uvfs_shm::{Segment, ShmResult, ShmSafe};

use crate::parameters::Parameters;

/// Well-known name of the configuration object inside the config segment.
pub(crate) const CONFIG_CONSTRUCT: &str = "parameters";

/// One forced-library record: when a process with this name is hooked,
/// the library is injected into it.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ForcedLibrary {
    pub process: ShmString,
    pub library: ShmString,
}

unsafe impl ShmSafe for ForcedLibrary {}

/// The shared configuration: one per instance, owned by the config
/// segment, mutated only through write guards.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct SharedConfig {
    pub instance_name: ShmString,
    pub current_tree_name: ShmString,
    pub current_inverse_name: ShmString,
    pub crash_dumps_path: ShmString,
    pub overlay_root: ShmString,
    pub user_count: u32,
    pub debug_mode: u8,
    pub log_level: u8,
    pub crash_dumps_type: u8,
    pub _pad: u8,
    /// PIDs registered as hooked, sorted.
    pub process_list: ShmVec<u32>,
    /// Executable-name suffixes whose processes must not be hooked.
    pub process_blacklist: ShmSet,
    pub forced_libraries: ShmList<ForcedLibrary>,
    /// Virtual path → original real path of virtually deleted files.
    pub deleted_files: ShmMap<ShmString>,
    /// Virtual path → original real path of faked directories.
    pub fake_directories: ShmMap<ShmString>,
}

unsafe impl ShmSafe for SharedConfig {}

impl SharedConfig {
    /// Build a fully initialized configuration inside `seg`.
    pub fn init(seg: &Segment, params: &Parameters) -> ShmResult<Self> {
        let mut instance_name = ShmString::from_str(seg, params.instance_name())?;
        let mut current_tree_name = match ShmString::from_str(seg, params.current_shm_name()) {
            Ok(s) => s,
            Err(err) => {
                instance_name.free(seg);
                return Err(err);
            }
        };
        let mut current_inverse_name =
            match ShmString::from_str(seg, params.current_inverse_shm_name()) {
                Ok(s) => s,
                Err(err) => {
                    instance_name.free(seg);
                    current_tree_name.free(seg);
                    return Err(err);
                }
            };
        let crash_dumps_path = match ShmString::from_str(seg, params.crash_dumps_path()) {
            Ok(s) => s,
            Err(err) => {
                instance_name.free(seg);
                current_tree_name.free(seg);
                current_inverse_name.free(seg);
                return Err(err);
            }
        };

        Ok(SharedConfig {
            instance_name,
            current_tree_name,
            current_inverse_name,
            crash_dumps_path,
            overlay_root: ShmString::EMPTY,
            user_count: 0,
            debug_mode: params.debug_mode as u8,
            log_level: params.log_level.to_raw(),
            crash_dumps_type: params.crash_dumps_type.to_raw(),
            _pad: 0,
            process_list: ShmVec::new(),
            process_blacklist: ShmSet::new(CaseMode::Folded),
            forced_libraries: ShmList::new(),
            deleted_files: ShmMap::new(CaseMode::Folded),
            fake_directories: ShmMap::new(CaseMode::Folded),
        })
    }

    /// Release everything this configuration owns inside `seg`. Only used
    /// when a racing construct lost and its copy must be reclaimed.
    pub fn release(mut self, seg: &Segment) {
        self.instance_name.free(seg);
        self.current_tree_name.free(seg);
        self.current_inverse_name.free(seg);
        self.crash_dumps_path.free(seg);
        self.overlay_root.free(seg);
        self.process_list.free(seg);
        self.process_blacklist.clear(seg);
        self.forced_libraries.clear_with(seg, |seg, mut lib| {
            lib.process.free(seg);
            lib.library.free(seg);
        });
        self.deleted_files.clear_with(seg, |seg, mut value| value.free(seg));
        self.fake_directories.clear_with(seg, |seg, mut value| value.free(seg));
    }
}
