use std::fmt;

/// Failure modes of the segment layer.
///
/// Kept "errno-like" on purpose: callers map these to their own error
/// surfaces (or to an unhooked fallback) in a single place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShmErrorKind {
    /// A named segment could not be created or attached.
    SegmentUnavailable,
    /// An existing segment is smaller than the caller requires.
    SizeMismatch,
    /// An allocation did not fit into the segment arena.
    OutOfSegmentMemory,
    /// The mapped region does not carry a valid segment layout.
    InvalidSegment,
    /// The segment name is empty, too long or contains a NUL.
    InvalidName,
}

impl ShmErrorKind {
    fn describe(self) -> &'static str {
        match self {
            ShmErrorKind::SegmentUnavailable => "segment unavailable",
            ShmErrorKind::SizeMismatch => "segment smaller than required",
            ShmErrorKind::OutOfSegmentMemory => "out of segment memory",
            ShmErrorKind::InvalidSegment => "invalid segment layout",
            ShmErrorKind::InvalidName => "invalid segment name",
        }
    }
}

/// Error with a machine-readable kind and a static context tag naming the
/// operation that failed (e.g. `"segment.create"`).
#[derive(Debug)]
pub struct ShmError {
    kind: ShmErrorKind,
    context: &'static str,
    errno: Option<rustix::io::Errno>,
}

impl ShmError {
    pub fn new(kind: ShmErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            errno: None,
        }
    }

    pub fn with_errno(kind: ShmErrorKind, context: &'static str, errno: rustix::io::Errno) -> Self {
        Self {
            kind,
            context,
            errno: Some(errno),
        }
    }

    pub fn kind(&self) -> ShmErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind.describe(), self.context)?;
        if let Some(errno) = self.errno {
            write!(f, ": {errno}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShmError {}

pub type ShmResult<T> = Result<T, ShmError>;
