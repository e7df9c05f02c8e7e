//! Compact long documents by splitting them in two and summarizing each half.
//!
//! `splitsum` divides a document's lines into two overlapping parts, streams
//! each part through a language-model backend, and concatenates the two
//! summaries. The result fits into a context window the full document did not.
//!
//! The library has two independent halves that compose only through the
//! caller:
//!
//! - [`split`]: the pure, overlap-aware line splitter ([`split_lines`]).
//! - [`summarizer`]: the [`Summarizer`] trait and its two streaming
//!   backends, [`ProcessSummarizer`] (a CLI printing newline-delimited JSON)
//!   and [`NetworkSummarizer`] (an OpenAI-compatible SSE endpoint).
//!
//! # Example
//!
//! ```ignore
//! use splitsum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SummarizeError> {
//!     let text = std::fs::read_to_string("notes.md").unwrap();
//!     let lines: Vec<String> = text.lines().map(String::from).collect();
//!     let parts = split_lines(&lines, 50, 20)?;
//!
//!     let backend = ProcessSummarizer::new().with_progress(Arc::new(StdoutProgress));
//!     let first = backend.summarize(Some(&parts.part_a.join("\n")), None).await?;
//!     let second = backend.summarize(Some(&parts.part_b.join("\n")), None).await?;
//!     println!("{first}\n\n{second}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`split`] | [`split_lines`] and [`SplitResult`] |
//! | [`summarizer`] | [`Summarizer`] trait, error taxonomy, both backends |
//! | [`progress`] | [`ProgressHandler`](progress::ProgressHandler) side channel for streamed text and banners |
//! | [`config`] | Credential and endpoint resolution (environment, then config file) |
//! | [`validate`] | Command-line parameter checks |
//! | [`chat`] | Chat completion request types |

pub mod chat;
pub mod config;
pub mod prelude;
pub mod progress;
pub mod split;
pub mod summarizer;
pub mod validate;

pub use split::{SplitError, SplitResult, split_lines};
pub use summarizer::{
    NetworkSummarizer, ProcessSummarizer, SummarizeError, Summarizer, SummaryFuture,
};
