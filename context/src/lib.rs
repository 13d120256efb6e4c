//! Process-local front end of the virtualization core.
//!
//! One `HookContext` per process attaches the shared configuration and
//! virtual-tree segments, contributes one unit to the instance's user
//! count, and hands out scoped guards through which hook bodies read and
//! mutate the shared state. When the last attached process detaches, the
//! segments are unlinked.

mod config;
mod context;
mod delayed;
mod error;
mod guard;
mod parameters;

pub use context::{
    create_hook_context, HookContext, CONFIG_SEGMENT_SIZE, TREE_SEGMENT_SIZE,
};
pub use delayed::DelayedTask;
pub use error::{ContextError, ContextResult};
pub use guard::{ReadGuard, WriteGuard};
pub use parameters::{CrashDumpsType, LogLevel, Parameters, MAX_DUMP_PATH_LEN, MAX_NAME_LEN};
