use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagehandError {
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Log shipping failed: {0}")]
    Shipping(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Invalid remote URI: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StagehandError>;
