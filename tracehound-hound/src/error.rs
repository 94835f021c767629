//! Error types for process isolation and IPC

use thiserror::Error;

/// Errors from the process adapter, framing layer, and pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoundError {
    /// Child process could not be started
    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    /// Child did not answer within the configured deadline
    #[error("Process timed out: {0}")]
    Timeout(String),

    /// Child exited unexpectedly while busy
    #[error("Process crashed: {0}")]
    Crashed(String),

    /// No idle slot and the exhaustion policy rejects the activation
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// Defer queue is at its limit
    #[error("Defer queue full: {0}")]
    DeferQueueFull(String),

    /// Frame payload exceeds the 1 MiB cap
    #[error("Frame too large: {size} bytes exceeds {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// A complete frame could not be decoded into a message
    #[error("Message decode failed: {0}")]
    MessageDecode(String),

    /// Writing to or reading from the child failed
    #[error("IPC failure: {0}")]
    Ipc(String),
}

impl HoundError {
    /// Stable wire code for the error
    pub fn code(&self) -> &'static str {
        match self {
            HoundError::SpawnFailed(_) => "PROCESS_SPAWN_FAILED",
            HoundError::Timeout(_) => "PROCESS_TIMEOUT",
            HoundError::Crashed(_) => "PROCESS_CRASHED",
            HoundError::PoolExhausted(_) => "PROCESS_POOL_EXHAUSTED",
            HoundError::DeferQueueFull(_) => "PROCESS_DEFER_QUEUE_FULL",
            HoundError::FrameTooLarge { .. } => "IPC_FRAME_TOO_LARGE",
            HoundError::MessageDecode(_) => "IPC_MESSAGE_DECODE_FAILED",
            HoundError::Ipc(_) => "IPC_FAILED",
        }
    }
}

/// Result type for hound operations
pub type HoundResult<T> = Result<T, HoundError>;
