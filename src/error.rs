use thiserror::Error;

/// Errors surfaced by the RVM library.
///
/// The C++ implementation this crate replaces communicated failure through
/// sentinel values (`(void *)-1`, `(trans_t)-1`) indistinguishable from a
/// real handle at the type level. `Result<T, RvmError>` is the idiomatic
/// replacement the design notes call for: a typed, matchable failure
/// instead of a cast the caller has to remember to check.
#[derive(Error, Debug)]
pub enum RvmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment name must not be empty")]
    EmptyName,

    #[error("segment name must not contain a path separator or end in \".log\": {0:?}")]
    InvalidName(String),

    #[error("segment already mapped: {0:?}")]
    AlreadyMapped(String),

    #[error("segment not mapped: {0:?}")]
    NotMapped(String),

    #[error("segment {0:?} is already owned by an open transaction")]
    SegmentBusy(String),

    #[error("begin_trans requires at least one segment")]
    EmptyTransaction,

    #[error("range [{offset}, {offset}+{size}) is out of bounds for a segment of size {segment_size}")]
    OutOfBounds {
        offset: usize,
        size: usize,
        segment_size: usize,
    },
}

pub type Result<T> = std::result::Result<T, RvmError>;
