use thiserror::Error;

/// Catch-all error type for internal fallible operations (bind, connect,
/// I/O) rather than a bespoke enum per call site.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a ring message (or discovery datagram) was rejected. Kept separate
/// from [`Error`] because the classification matters here: callers log the
/// variant and drop the message, they never propagate it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingMessageParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("wrong number of arguments for {command}: expected {expected}, got {got}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid id {0:?}")]
    InvalidId(String),
}
