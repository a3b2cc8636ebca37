use thiserror::Error;

/// The error taxonomy shared by the PixArt and Synaptics RMI device families.
///
/// Every fallible operation in this crate returns `Result<T, FuError>`. Call
/// sites that need to attach a phase label to a lower-level failure use
/// [`ResultContext::context`] to wrap it in [`FuError::Context`], which keeps
/// the original error reachable via `std::error::Error::source` instead of
/// flattening it into a fresh string.
#[derive(Debug, Error)]
pub enum FuError {
    #[error("read failed: {0}")]
    ReadError(String),

    #[error("write failed: {0}")]
    WriteError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("security error: {0}")]
    SecurityError(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("device is not in bootloader mode")]
    NotBootloader,

    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch { computed: u16, received: u16 },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FuError>,
    },
}

pub type FuResult<T> = Result<T, FuError>;

/// Attaches a phase/context label to a `FuResult` without discarding the
/// underlying error, mirroring `DriverError`'s source-chaining wrapper
/// variants rather than `format!`-gluing the source into a new string.
pub trait ResultContext<T> {
    fn context(self, context: impl Into<String>) -> FuResult<T>;
}

impl<T> ResultContext<T> for FuResult<T> {
    fn context(self, context: impl Into<String>) -> FuResult<T> {
        self.map_err(|source| FuError::Context {
            context: context.into(),
            source: Box::new(source),
        })
    }
}
