/// Result alias that carries the custom [`NetMdError`] type.
pub type Result<T> = std::result::Result<T, NetMdError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum NetMdError {
    /// The transport reported a failure or timed out. Never retried here.
    #[error("transport error: {0}")]
    Transport(String),
    /// A decode would have written past the destination capacity.
    #[error("buffer too small: need {needed} bytes, capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    /// A group or track index outside the valid bounds.
    #[error("{what} index {index} out of range (count {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// The device reported an implausible size field.
    #[error("device reported invalid size {0}")]
    InvalidSize(usize),
    /// The disc title string could not be decoded.
    #[error("malformed disc title: {0}")]
    Parse(String),
    /// A fixed-offset read fell beyond the end of a response frame.
    #[error("response too short: expected at least {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },
    /// Empty groups have no anchor track and cannot be relocated.
    #[error("group {0} has no tracks to move")]
    EmptyGroup(usize),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl NetMdError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a transport failure from any displayable cause.
    pub fn transport<T: std::fmt::Display>(cause: T) -> Self {
        Self::Transport(cause.to_string())
    }

    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }
}

impl From<&str> for NetMdError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for NetMdError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
