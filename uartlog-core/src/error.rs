use thiserror::Error;

/// Main error type for uartlog operations
#[derive(Error, Debug)]
pub enum UartLogError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Buffer overflow: {requested} bytes requested, {free} bytes free")]
    BufferOverflow { requested: usize, free: usize },

    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Port closed")]
    PortClosed,

    #[error("Frame too large: {size} bytes exceeds output capacity of {capacity} bytes")]
    FrameTooLarge { size: usize, capacity: usize },

    #[error("Length overflow: {len} byte region exceeds the {max} byte length field")]
    LengthOverflow { len: usize, max: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for uartlog operations
pub type UartLogResult<T> = Result<T, UartLogError>;
