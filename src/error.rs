use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object store unreachable for key {key}: {detail}")]
    StoreUnavailable { key: String, detail: String },

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Invalid document hash: {0}")]
    InvalidHash(String),

    #[error("Invalid proof id: {0}")]
    InvalidId(String),

    #[error("Refusing to store an empty receipt for proof {0}")]
    EmptyReceipt(String),

    #[error("No OTS receipt available for proof {0}")]
    NoReceipt(String),

    #[error("Timestamp sidecar unreachable: {0}")]
    SidecarUnavailable(String),

    #[error("Timestamp sidecar rejected request (HTTP {status}): {detail}")]
    SidecarRejected { status: u16, detail: String },

    #[error("Timestamp sidecar returned an unexpected response: {0}")]
    SidecarProtocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnchorError {
    /// Whether the error originated at the timestamp sidecar.
    pub fn is_sidecar_failure(&self) -> bool {
        matches!(
            self,
            AnchorError::SidecarUnavailable(_)
                | AnchorError::SidecarRejected { .. }
                | AnchorError::SidecarProtocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;
