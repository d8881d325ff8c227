use meta_buffers::BufferError;
use meta_names::NameError;
use thiserror::Error;

/// Errors raised by tree access, mutation, merging and the codecs.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("invalid path syntax: {0}")]
    InvalidPathSyntax(#[from] NameError),
    #[error("invalid element name: {0:?}")]
    InvalidName(String),
    #[error("node has no name and no @name value")]
    AnonymousNode,
    #[error("cannot rename attached node {name:?}")]
    RenameOfAttachedNode { name: String },
    #[error("index {index} out of range for {path} with {len} elements")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
    #[error("malformed stream: {0}")]
    MalformedStream(String),
    #[error("merge dimension mismatch: expected {expected} elements, got {actual}")]
    MergeDimensionMismatch { expected: usize, actual: usize },
    #[error("node id is stale or belongs to another tree")]
    StaleNode,
    #[error("attaching the node would make it its own ancestor")]
    CyclicAttachment,
    #[error("the root node cannot be {0}")]
    RootNode(&'static str),
    #[error("{what} of length {len} does not fit the wire format")]
    Oversized { what: &'static str, len: usize },
    #[error("tree depth exceeds the limit of {0}")]
    DepthLimitExceeded(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<BufferError> for MetaError {
    fn from(err: BufferError) -> Self {
        MetaError::MalformedStream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetaError>;
