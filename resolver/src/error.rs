use thiserror::Error;

use uvfs_tree::TreeError;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The input path could not be normalized (empty, malformed, too long).
    #[error("invalid path ({context})")]
    InvalidPath { context: &'static str },

    /// The virtual tree or its segment failed underneath the resolver.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ResolveError {
    pub(crate) fn invalid(context: &'static str) -> Self {
        ResolveError::InvalidPath { context }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
