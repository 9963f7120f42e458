use std::io;
use thiserror::Error;

/// Custom error types for the STDMA link layer
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport setup failed: {0}")]
    Transport(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("No free slot in the current frame")]
    NoFreeSlot,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transmission failed: {0}")]
    Transmit(#[source] io::Error),

    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("Interrupted: {0}")]
    Interrupted(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new transport setup error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new malformed packet error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPacket(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new interruption error
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Error::Interrupted(msg.into())
    }

    /// Whether the station can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MalformedPacket(_) | Error::NoFreeSlot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::malformed("short buffer");
        assert!(matches!(err, Error::MalformedPacket(_)));
        assert_eq!(err.to_string(), "Malformed packet: short buffer");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::NoFreeSlot.is_recoverable());
        assert!(Error::malformed("x").is_recoverable());
        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(!Error::Transmit(broken).is_recoverable());
        assert!(!Error::transport("no such interface").is_recoverable());
    }
}
