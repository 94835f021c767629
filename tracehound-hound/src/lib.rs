//! # Tracehound Hound
//!
//! Process-isolated evidence analysis. A pool of sandboxed child
//! processes receives evidence bytes over a length-prefixed binary IPC
//! protocol; activations are fire-and-forget with timeout and kill
//! semantics, and results fan out over typed channels.
//!
//! ## Components
//!
//! - `FrameParser` / `HoundMessage`: the wire protocol (4-byte big-endian
//!   length prefix, 1 MiB cap, typed status and metrics messages)
//! - `HoundProcess`: spawn/send/kill over stdin/stdout with declarative
//!   execution constraints
//! - `HoundPool`: slot scheduler with lazy spawn, timeout, rotation
//!   jitter, and exhaustion policies

pub mod error;
pub mod ipc;
pub mod pool;
pub mod process;

pub use error::{HoundError, HoundResult};
pub use ipc::{
    encode_frame, FrameParser, HoundMessage, HoundState, FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD,
    MSG_METRICS, MSG_STATUS,
};
pub use pool::{
    ExhaustionPolicy, HoundOutcome, HoundPool, HoundPoolConfig, PoolStats, WorkerSpec,
};
pub use process::{HoundProcess, ProcessConstraints};
