use thiserror::Error;

use uvfs_resolver::ResolveError;
use uvfs_shm::ShmError;
use uvfs_tree::TreeError;

#[derive(Debug, Error)]
pub enum ContextError {
    /// A second hook context was constructed in a process that already has
    /// one. Fatal: the library refuses to activate twice.
    #[error("a hook context already exists in this process")]
    DuplicateSingleton,

    /// A parameter string does not fit its fixed-size field.
    #[error("invalid parameter ({context})")]
    InvalidParameter { context: &'static str },

    /// The config or tree segment failed. During construction this is
    /// fatal for the attaching process.
    #[error(transparent)]
    Segment(#[from] ShmError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

pub type ContextResult<T> = Result<T, ContextError>;
