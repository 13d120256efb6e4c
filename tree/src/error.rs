use std::fmt;

use uvfs_shm::{ShmError, ShmErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeErrorKind {
    /// The virtual path names no node.
    NotFound,
    /// A path component other than the last resolved to a file.
    NotADirectory,
    /// The underlying segment failed (allocation, attach, …).
    Segment(ShmErrorKind),
}

#[derive(Debug)]
pub struct TreeError {
    kind: TreeErrorKind,
    context: &'static str,
}

impl TreeError {
    pub fn new(kind: TreeErrorKind, context: &'static str) -> Self {
        Self { kind, context }
    }

    pub fn kind(&self) -> TreeErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TreeErrorKind::NotFound => write!(f, "virtual path not found ({})", self.context),
            TreeErrorKind::NotADirectory => {
                write!(f, "virtual path is not a directory ({})", self.context)
            }
            TreeErrorKind::Segment(kind) => write!(f, "segment failure {:?} ({})", kind, self.context),
        }
    }
}

impl std::error::Error for TreeError {}

impl From<ShmError> for TreeError {
    fn from(err: ShmError) -> Self {
        TreeError {
            kind: TreeErrorKind::Segment(err.kind()),
            context: err.context(),
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
