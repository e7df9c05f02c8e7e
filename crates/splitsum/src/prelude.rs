//! Convenience re-exports for common `splitsum` types.
//!
//! ```ignore
//! use splitsum::prelude::*;
//! ```
//!
//! Wire-level types ([`StreamState`](crate::summarizer::StreamState),
//! [`StreamChunk`](crate::summarizer::StreamChunk)) are left out; import them
//! from [`summarizer`](crate::summarizer) when driving a backend by hand.

pub use std::sync::Arc;

// ── Splitting ───────────────────────────────────────────────────────
pub use crate::split::{SplitError, SplitResult, split_lines};

// ── Summarizers ─────────────────────────────────────────────────────
pub use crate::summarizer::{
    NetworkSummarizer, ProcessSummarizer, SummarizeError, Summarizer, SummaryFuture,
};

// ── Progress ────────────────────────────────────────────────────────
pub use crate::progress::{
    FnProgressHandler, LoggingProgress, NoopProgress, ProgressEvent, ProgressHandler,
    StdoutProgress,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{BackendConfig, resolve_from_env};
