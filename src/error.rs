use std::fmt;

/// Main error type for the Tidings broadcast node
#[derive(Debug)]
pub enum TidingsError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Inbound envelope could not be handled
    Protocol(ProtocolError),

    /// Transport layer errors
    Transport(String),

    /// System I/O errors
    Io(std::io::Error),

    /// JSON serialization/deserialization errors
    Serialization(serde_json::Error),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),

    /// Broken internal invariant; the process must not continue
    Invariant(String),
}

/// Errors about the shape or timing of an inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Body could not be parsed or is missing fields
    Malformed(String),

    /// Message type this node does not handle
    NotSupported(String),

    /// Request arrived before the `init` handshake
    NotInitialized,
}

/// Wire error codes understood by the cluster runtime
pub mod codes {
    pub const NOT_SUPPORTED: u32 = 10;
    pub const TEMPORARILY_UNAVAILABLE: u32 = 11;
    pub const MALFORMED_REQUEST: u32 = 12;
    pub const CRASH: u32 = 13;
}

impl fmt::Display for TidingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TidingsError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TidingsError::Protocol(err) => write!(f, "Protocol error: {}", err),
            TidingsError::Transport(msg) => write!(f, "Transport error: {}", msg),
            TidingsError::Io(err) => write!(f, "I/O error: {}", err),
            TidingsError::Serialization(err) => write!(f, "Serialization error: {}", err),
            TidingsError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
            TidingsError::Invariant(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            ProtocolError::NotSupported(msg) => write!(f, "not supported: {}", msg),
            ProtocolError::NotInitialized => write!(f, "node has not been initialized"),
        }
    }
}

impl std::error::Error for TidingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TidingsError::Io(err) => Some(err),
            TidingsError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, TidingsError>;

impl TidingsError {
    /// Error code reported back to the sender in an `error` body
    pub fn code(&self) -> u32 {
        match self {
            TidingsError::Protocol(ProtocolError::Malformed(_)) => codes::MALFORMED_REQUEST,
            TidingsError::Protocol(ProtocolError::NotSupported(_)) => codes::NOT_SUPPORTED,
            TidingsError::Protocol(ProtocolError::NotInitialized) => {
                codes::TEMPORARILY_UNAVAILABLE
            }
            TidingsError::Serialization(_) => codes::MALFORMED_REQUEST,
            TidingsError::Config(_)
            | TidingsError::Transport(_)
            | TidingsError::Io(_)
            | TidingsError::Concurrency(_)
            | TidingsError::Invariant(_) => codes::CRASH,
        }
    }

    /// Fatal errors end the process instead of being replied to
    pub fn is_fatal(&self) -> bool {
        matches!(self, TidingsError::Invariant(_))
    }
}

// Conversions from common error types
impl From<std::io::Error> for TidingsError {
    fn from(err: std::io::Error) -> Self {
        TidingsError::Io(err)
    }
}

impl From<serde_json::Error> for TidingsError {
    fn from(err: serde_json::Error) -> Self {
        TidingsError::Serialization(err)
    }
}

impl From<ProtocolError> for TidingsError {
    fn from(err: ProtocolError) -> Self {
        TidingsError::Protocol(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TidingsError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        crate::transport_error!("outbound channel closed")
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::TidingsError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TidingsError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::TidingsError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TidingsError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::TidingsError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TidingsError::Concurrency(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! invariant_error {
    ($msg:expr) => {
        $crate::error::TidingsError::Invariant($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TidingsError::Invariant(format!($fmt, $($arg)*))
    };
}
