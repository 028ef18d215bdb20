#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox creation failed: {0}")]
    CreationFailed(String),

    #[error("sandbox is closed")]
    Closed,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("remote error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// True for errors caused by the handle's lifecycle rather than the
    /// operation itself (closed handle, dropped session).
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Closed | Self::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
