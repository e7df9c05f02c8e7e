//! Summarization through an external CLI that streams newline-delimited JSON.
//!
//! The CLI is started with `--output-format stream-json --verbose`, receives
//! the wrapped content on stdin, and prints one JSON event per line on
//! stdout. [`StreamState`] reduces those lines to the final summary and is
//! fed raw stdout chunks exactly as they arrive, so it can be exercised
//! without a real subprocess.
//!
//! Event shapes handled by [`StreamState`]:
//!
//! | `type` | Effect |
//! |--------|--------|
//! | `assistant` | text blocks are shown as progress, never accumulated |
//! | `result` | replaces the stored summary |
//! | `system` | model banner or generic notice; skips the rest of the chunk |

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::{
    SYSTEM_PROMPT, SummarizeError, Summarizer, SummaryFuture, check_content, finish_text,
    with_deadline, wrap_content,
};
use crate::progress::{NoopProgress, ProgressEvent, ProgressHandler};

/// Executable invoked when no other program is configured.
pub const DEFAULT_PROGRAM: &str = "claude";

/// Backend name shown in the "connected" banner.
const BACKEND_LABEL: &str = "Claude";

/// Shown for a `system` event that names no model.
const UNKNOWN_SYSTEM_NOTICE: &str = "Unknown system message detected.";

/// Read size for the stdout pipe.
const READ_CHUNK_BYTES: usize = 8 * 1024;

// ── Event types ────────────────────────────────────────────────────

/// One line of `stream-json` output. Unknown `type`s deserialize to `Other`.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CliEvent {
    Assistant {
        #[serde(default)]
        message: Option<AssistantMessage>,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
    },
    System {
        #[serde(default)]
        model: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<Vec<ContentBlock>>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// What the caller should do after a line has been handled.
enum LineOutcome {
    Continue,
    /// A system event was seen; the remaining lines of the current chunk are
    /// skipped.
    StopChunk,
}

// ── State machine ──────────────────────────────────────────────────

/// Incremental reducer for one request's stdout.
///
/// Chunks may split lines (and multi-byte characters) anywhere. Bytes after
/// the last newline stay in the pending buffer until a later chunk completes
/// the line; a line is never parsed before its newline is seen.
#[derive(Debug, Default)]
pub struct StreamState {
    pending: Vec<u8>,
    result: String,
    first_fragment_seen: bool,
    backend_announced: bool,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent terminal `result` value (untrimmed).
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Feed one chunk of stdout, processing every line it completes.
    pub fn feed(&mut self, chunk: &[u8], progress: &dyn ProgressHandler) {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return;
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        for raw in complete.split(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let LineOutcome::StopChunk = self.process_line(line, progress) {
                // TODO: confirm with the CLI maintainers whether lines after a
                // system event in the same read are meant to be dropped.
                debug!("system event seen, skipping rest of chunk");
                break;
            }
        }
    }

    fn process_line(&mut self, line: &str, progress: &dyn ProgressHandler) -> LineOutcome {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                // --verbose interleaves plain debug text with events; only
                // report lines that were clearly meant to be JSON.
                if line.starts_with('{') && line.ends_with('}') {
                    warn!("Failed to parse JSON line: {e}");
                    progress.on_event(&ProgressEvent::ParseDiagnostic(line));
                } else {
                    trace!("skipping non-JSON line");
                }
                return LineOutcome::Continue;
            }
        };

        let event = match CliEvent::deserialize(value) {
            Ok(event) => event,
            Err(e) => {
                trace!("ignoring event with unexpected shape: {e}");
                return LineOutcome::Continue;
            }
        };

        match event {
            CliEvent::Assistant {
                message:
                    Some(AssistantMessage {
                        content: Some(blocks),
                    }),
            } => {
                if !self.first_fragment_seen {
                    self.first_fragment_seen = true;
                    progress.on_event(&ProgressEvent::Connected {
                        backend: BACKEND_LABEL,
                        after_connecting: false,
                    });
                }
                for block in &blocks {
                    if block.kind.as_deref() == Some("text")
                        && let Some(text) = block.text.as_deref()
                        && !text.is_empty()
                    {
                        progress.on_event(&ProgressEvent::Fragment(text));
                    }
                }
                LineOutcome::Continue
            }
            CliEvent::Result {
                result: Some(result),
            } if !result.is_empty() => {
                trace!("result event: {} chars", result.len());
                self.result = result;
                LineOutcome::Continue
            }
            CliEvent::System { model } => {
                match model.as_deref() {
                    Some(model) if !self.backend_announced => {
                        self.backend_announced = true;
                        progress.on_event(&ProgressEvent::BackendInfo { model });
                    }
                    Some(model) => trace!("backend already announced, ignoring model {model}"),
                    None => progress.on_event(&ProgressEvent::Notice(UNKNOWN_SYSTEM_NOTICE)),
                }
                LineOutcome::StopChunk
            }
            _ => LineOutcome::Continue,
        }
    }

    /// Resolve the request from the process exit code and captured stderr.
    ///
    /// Unterminated bytes still pending are discarded.
    pub fn finish(self, exit_code: i32, stderr: &str) -> Result<String, SummarizeError> {
        if !self.pending.is_empty() {
            debug!(
                "discarding {} unterminated byte(s) at end of output",
                self.pending.len()
            );
        }
        if exit_code != 0 {
            return Err(SummarizeError::BackendProcessFailed {
                code: exit_code,
                stderr: stderr.trim().to_string(),
            });
        }
        finish_text(&self.result)
    }
}

// ── Summarizer ─────────────────────────────────────────────────────

/// Build the CLI arguments for one request.
pub fn build_args(model: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        "--system-prompt".to_string(),
        SYSTEM_PROMPT.to_string(),
    ];
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    args
}

/// [`Summarizer`] backed by a `stream-json` CLI subprocess.
pub struct ProcessSummarizer {
    program: PathBuf,
    timeout: Option<Duration>,
    progress: Arc<dyn ProgressHandler>,
}

impl Default for ProcessSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSummarizer {
    /// Invoke [`DEFAULT_PROGRAM`] from `PATH` with no timeout and no progress output.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            timeout: None,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Use a different executable (absolute path or name on `PATH`).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the process and fail with [`SummarizeError::Timeout`] after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    async fn run(&self, content: &str, model: Option<&str>) -> Result<String, SummarizeError> {
        debug!(
            "Spawning {} (model={}, {} bytes of input)",
            self.program.display(),
            model.unwrap_or("(default)"),
            content.len()
        );

        let mut child = Command::new(&self.program)
            .args(build_args(model))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SummarizeError::SpawnFailed(format!("{}: {e}", self.program.display())))?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SummarizeError::SpawnFailed(
                "child stdio was not captured".to_string(),
            ));
        };

        let payload = wrap_content(content);
        let write_input = async move {
            // A child that exits without reading stdin closes the pipe; the
            // exit status reports the real failure.
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!("failed to write backend stdin: {e}");
            }
            if let Err(e) = stdin.shutdown().await {
                debug!("failed to close backend stdin: {e}");
            }
        };

        let progress = self.progress.as_ref();
        let read_output = async move {
            let mut state = StreamState::new();
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            loop {
                let n = stdout.read(&mut buf).await.map_err(|e| {
                    SummarizeError::BackendError(format!("failed to read backend output: {e}"))
                })?;
                if n == 0 {
                    break;
                }
                state.feed(&buf[..n], progress);
            }
            Ok::<_, SummarizeError>(state)
        };

        let read_errors = async move {
            let mut bytes = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut bytes).await {
                debug!("failed to read backend stderr: {e}");
            }
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let ((), state, stderr_text) = tokio::join!(write_input, read_output, read_errors);
        let state = state?;

        let status = child
            .wait()
            .await
            .map_err(|e| SummarizeError::BackendError(format!("failed to wait for backend: {e}")))?;
        // Killed by a signal: no exit code.
        let code = status.code().unwrap_or(-1);
        debug!("{} exited with code {code}", self.program.display());

        state.finish(code, &stderr_text)
    }
}

impl Summarizer for ProcessSummarizer {
    fn name(&self) -> &str {
        "claude"
    }

    fn summarize<'a>(
        &'a self,
        content: Option<&'a str>,
        model: Option<&'a str>,
    ) -> SummaryFuture<'a> {
        Box::pin(async move {
            let content = check_content(content)?;
            with_deadline(self.timeout, self.run(content, model)).await
        })
    }
}
