//! Relocatable strings and containers for shared segments.
//!
//! Everything here stores offsets only, never addresses, so a construct is
//! valid in every process that maps its segment regardless of base
//! address. All allocation flows through the owning segment's allocator;
//! inserts allocate before mutating, so a failed insert leaves the
//! container exactly as it was.

pub mod case;
mod list;
mod map;
mod multimap;
mod set;
mod string;
mod vec;
pub mod wide;

pub use list::ShmList;
pub use map::{CaseMode, MapEntry, ShmMap};
pub use multimap::ShmMultiMap;
pub use set::ShmSet;
pub use string::ShmString;
pub use vec::ShmVec;
