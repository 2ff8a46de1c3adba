use thiserror::Error;

/// All errors produced by the gameNet transport layer.
#[derive(Debug, Error)]
pub enum GameNetError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("unknown channel tag: 0x{0:02x}")]
    UnknownChannel(u8),

    #[error("send() called on a receiver-only endpoint (no remote configured)")]
    NoRemote,

    #[error("endpoint is closed")]
    EndpointClosed,

    #[error("pending send queue is full ({0} entries)")]
    PendingQueueFull(usize),

    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GameNetError>;
