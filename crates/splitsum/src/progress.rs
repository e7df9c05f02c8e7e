//! Progress side channel for streaming summarization.
//!
//! Summarizers report what they observe on the wire through
//! [`ProgressEvent`] values delivered to a [`ProgressHandler`]. Nothing sent
//! here is part of the returned summary; it exists so a user watching the
//! terminal can see the model working.
//!
//! # Choosing a handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopProgress`] | Tests, library callers that only want the result |
//! | [`LoggingProgress`] | Structured logging via `tracing` |
//! | [`StdoutProgress`] | Interactive CLI: banners and raw fragments on stdout |
//! | [`FnProgressHandler`] | Quick closures |

use std::io::Write;

use tracing::{debug, info, trace, warn};

/// Events emitted by a summarizer while a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    /// A network request is about to be sent.
    Connecting { backend: &'a str },
    /// The first text fragment arrived. Emitted at most once per request.
    ///
    /// `after_connecting` is set when a [`Connecting`](Self::Connecting)
    /// event was already emitted for this request.
    Connected {
        backend: &'a str,
        after_connecting: bool,
    },
    /// An incremental text fragment.
    Fragment(&'a str),
    /// The backend announced which model is serving the request.
    BackendInfo { model: &'a str },
    /// An informational message with no model attached.
    Notice(&'a str),
    /// A line looked like JSON but failed to parse. Processing continues.
    ParseDiagnostic(&'a str),
    /// The response stream ended.
    Finished,
}

/// Receiver for [`ProgressEvent`]s.
///
/// Handlers are best-effort observers: they cannot fail the request and
/// should not block for long, since they run inline with stream processing.
pub trait ProgressHandler: Send + Sync {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        let _ = event;
    }
}

/// Discards all events.
pub struct NoopProgress;
impl ProgressHandler for NoopProgress {}

/// Logs events through `tracing`.
pub struct LoggingProgress;

impl ProgressHandler for LoggingProgress {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        match event {
            ProgressEvent::Connecting { backend } => debug!("Connecting to {backend}"),
            ProgressEvent::Connected { backend, .. } => info!("Connected to {backend}"),
            ProgressEvent::Fragment(text) => trace!("fragment: {} chars", text.len()),
            ProgressEvent::BackendInfo { model } => info!("Processing input using {model}"),
            ProgressEvent::Notice(msg) => info!("{msg}"),
            ProgressEvent::ParseDiagnostic(line) => warn!("Failed to parse JSON: {line}"),
            ProgressEvent::Finished => debug!("Stream finished"),
        }
    }
}

/// Writes banners and fragments to stdout, flushing after every write so
/// fragments appear as they arrive.
///
/// Parse diagnostics go to stderr so they never interleave with streamed
/// text in a redirected stdout.
pub struct StdoutProgress;

impl StdoutProgress {
    /// Text written to stdout for `event`, or `None` for events that go to
    /// stderr instead.
    ///
    /// The 🔗 marker appears on the first connection banner of a request
    /// only.
    pub fn render(event: &ProgressEvent<'_>) -> Option<String> {
        let text = match event {
            ProgressEvent::Connecting { backend } => {
                format!("🔗 Connecting to {backend} API...\n\n")
            }
            ProgressEvent::Connected {
                backend,
                after_connecting: false,
            } => format!("🔗 Connected to {backend}, generating response...\n\n"),
            ProgressEvent::Connected {
                backend,
                after_connecting: true,
            } => format!("Connected to {backend}, generating response...\n\n"),
            ProgressEvent::Fragment(text) => (*text).to_string(),
            ProgressEvent::BackendInfo { model } => format!("Process input using {model}...\n\n"),
            ProgressEvent::Notice(msg) => format!("{msg}\n"),
            ProgressEvent::ParseDiagnostic(_) => return None,
            ProgressEvent::Finished => "\n".to_string(),
        };
        Some(text)
    }
}

impl ProgressHandler for StdoutProgress {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        let Some(text) = Self::render(event) else {
            if let ProgressEvent::ParseDiagnostic(line) = event {
                eprintln!("Failed to parse JSON: {line}");
            }
            return;
        };
        let mut out = std::io::stdout().lock();
        // Progress output is best-effort; a closed stdout must not abort the request.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// A progress handler backed by a closure.
///
/// ```ignore
/// let handler = FnProgressHandler::new(|event| {
///     if let ProgressEvent::Fragment(text) = event {
///         print!("{text}");
///     }
/// });
/// ```
pub struct FnProgressHandler<F>(F)
where
    F: Fn(&ProgressEvent<'_>) + Send + Sync;

impl<F> FnProgressHandler<F>
where
    F: Fn(&ProgressEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProgressHandler for FnProgressHandler<F>
where
    F: Fn(&ProgressEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent<'_>) {
        (self.0)(event)
    }
}

/// Records events as owned strings. Used by unit tests across the crate.
#[cfg(test)]
pub(crate) mod recording {
    use super::{ProgressEvent, ProgressHandler};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingProgress(pub(crate) Mutex<Vec<String>>);

    impl RecordingProgress {
        pub(crate) fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        pub(crate) fn fragments(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("fragment:").map(str::to_string))
                .collect()
        }
    }

    impl ProgressHandler for RecordingProgress {
        fn on_event(&self, event: &ProgressEvent<'_>) {
            let line = match event {
                ProgressEvent::Connecting { backend } => format!("connecting:{backend}"),
                ProgressEvent::Connected { backend, .. } => format!("connected:{backend}"),
                ProgressEvent::Fragment(t) => format!("fragment:{t}"),
                ProgressEvent::BackendInfo { model } => format!("model:{model}"),
                ProgressEvent::Notice(m) => format!("notice:{m}"),
                ProgressEvent::ParseDiagnostic(l) => format!("diagnostic:{l}"),
                ProgressEvent::Finished => "finished".to_string(),
            };
            self.0.lock().unwrap().push(line);
        }
    }
}
