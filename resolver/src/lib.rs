//! Path translation: the decision procedure between an intercepted call
//! and the real filesystem.
//!
//! Given a host path and the intent of the call, the resolver consults the
//! shared virtual tree and tombstone tables (through a held guard) and
//! answers with a single instruction: pass through, redirect, synthesize,
//! deny, or create in the overlay.

mod action;
mod error;
mod normalize;
mod resolver;

pub use action::{Action, DenyReason, ResolveIntent};
pub use error::{ResolveError, ResolveResult};
pub use normalize::NormalizedPath;
pub use resolver::{Resolver, TombstoneView};
