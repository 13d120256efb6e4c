//! The shared virtual tree: virtual paths mapped onto real paths.
//!
//! The tree lives inside its own shared segment so every hooked process
//! sees the same view; nodes reference each other by offset only. The
//! merge of virtual children with a real directory listing — the heart of
//! virtualized enumeration — lives here too.

mod enumerate;
mod error;
mod host;
mod node;
mod tree;

pub use enumerate::MergedEntry;
pub use error::{TreeError, TreeErrorKind, TreeResult};
pub use host::{RealEntry, RealFs, StdRealFs};
pub use node::{NodeFlags, NodeKind, NodeView};
pub use tree::{split_components, PrefixWalk, VirtualTree};
