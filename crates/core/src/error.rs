use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShadowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture init failed: {0}")]
    CaptureInit(String),

    #[error("Bind failed: {0}")]
    Bind(String),

    #[error("{0}")]
    Other(String),
}

impl ShadowError {
    /// Process exit code for fatal startup errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShadowError::Config(_) => 1,
            ShadowError::CaptureInit(_) => 2,
            ShadowError::Bind(_) => 3,
            _ => 1,
        }
    }
}
