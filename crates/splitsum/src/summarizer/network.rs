//! Summarization through an OpenAI-compatible chat completions stream.
//!
//! The request is sent with `stream: true`; the response is a Server-Sent
//! Events body whose `data:` payloads are [`StreamChunk`]s. Each chunk
//! carries at most one delta fragment, and the summary is the concatenation
//! of all non-empty fragments. [`aggregate_deltas`] performs that reduction
//! over any `Stream` of chunks so it can be driven by scripted input.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{
    SYSTEM_PROMPT, SummarizeError, Summarizer, SummaryFuture, check_content, finish_text,
    with_deadline, wrap_content,
};
use crate::chat::{ChatRequest, Message, ResponseFormat, ResponseFormatType};
use crate::config::BackendConfig;
use crate::progress::{NoopProgress, ProgressEvent, ProgressHandler};

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Low temperature keeps summaries close to the source text.
pub const SUMMARY_TEMPERATURE: f32 = 0.1;

const BACKEND_LABEL: &str = "OpenAI";

// ── Wire types ─────────────────────────────────────────────────────

/// One SSE `data:` payload. Every level is optional; missing levels mean
/// the chunk carries no text.
#[derive(Deserialize, Debug, Default)]
pub struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// `{"error": {"message": ...}}` as returned by the API on failure.
#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StreamChunk {
    /// The first choice's delta text, or `""`.
    pub fn delta_text(&self) -> &str {
        self.choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_deref())
            .unwrap_or("")
    }
}

// ── Aggregation ────────────────────────────────────────────────────

/// Accumulates delta fragments for one request.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    first_fragment_seen: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far (untrimmed).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply one chunk. An error payload inside the stream fails the request.
    pub fn push(
        &mut self,
        chunk: &StreamChunk,
        progress: &dyn ProgressHandler,
    ) -> Result<(), SummarizeError> {
        if let Some(err) = &chunk.error {
            return Err(match err.message.as_deref() {
                Some(msg) if !msg.is_empty() => SummarizeError::BackendError(msg.to_string()),
                _ => SummarizeError::UnknownBackendError(format!("{err:?}")),
            });
        }

        let fragment = chunk.delta_text();
        if fragment.is_empty() {
            return Ok(());
        }
        if !self.first_fragment_seen {
            self.first_fragment_seen = true;
            progress.on_event(&ProgressEvent::Connected {
                backend: BACKEND_LABEL,
                after_connecting: true,
            });
        }
        progress.on_event(&ProgressEvent::Fragment(fragment));
        self.text.push_str(fragment);
        Ok(())
    }

    /// Trim the accumulated text, failing with
    /// [`SummarizeError::EmptyResult`] if nothing but whitespace arrived.
    pub fn finish(self) -> Result<String, SummarizeError> {
        finish_text(&self.text)
    }
}

/// Reduce a stream of chunks to the final summary.
///
/// The first stream error aborts aggregation and is returned as-is.
pub async fn aggregate_deltas<S>(
    stream: S,
    progress: &dyn ProgressHandler,
) -> Result<String, SummarizeError>
where
    S: Stream<Item = Result<StreamChunk, SummarizeError>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut acc = DeltaAccumulator::new();
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        acc.push(&item?, progress)?;
        chunks += 1;
    }

    debug!(
        "Stream completed with {chunks} chunk(s), {} chars",
        acc.text().len()
    );
    progress.on_event(&ProgressEvent::Finished);
    acc.finish()
}

// ── Error classification ───────────────────────────────────────────

/// Classify a non-success HTTP response.
///
/// A structured `{"error": {"message": ...}}` body supplies the message;
/// otherwise the raw body (or the status reason) is used.
pub(crate) fn api_error(status: reqwest::StatusCode, body: &str) -> SummarizeError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    SummarizeError::BackendApiError {
        status: status.as_u16(),
        message,
    }
}

/// Classify a transport error from `reqwest`.
pub(crate) fn transport_error(err: &reqwest::Error) -> SummarizeError {
    if let Some(status) = err.status() {
        return SummarizeError::BackendApiError {
            status: status.as_u16(),
            message: err.to_string(),
        };
    }
    message_or_unknown(err.to_string(), || format!("{err:?}"))
}

fn message_or_unknown(message: String, repr: impl FnOnce() -> String) -> SummarizeError {
    if message.trim().is_empty() {
        SummarizeError::UnknownBackendError(repr())
    } else {
        SummarizeError::BackendError(message)
    }
}

// ── SSE transport ──────────────────────────────────────────────────

/// Incremental decoder for an SSE body.
///
/// Bytes are buffered until a newline completes a line, so `data:` lines
/// and multi-byte characters may be split across reads anywhere. Decoding
/// stops at the `[DONE]` sentinel; bytes fed after it are dropped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    ready: VecDeque<StreamChunk>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` was seen or the body was flushed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Take the next decoded chunk, if any.
    pub fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.ready.pop_front()
    }

    /// Append bytes and queue every chunk completed by them.
    pub fn feed(&mut self, bytes: &[u8], progress: &dyn ProgressHandler) {
        if self.done {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if self.handle_line(line.trim(), progress) {
                self.done = true;
                self.buffer.clear();
                return;
            }
        }
    }

    /// Process an unterminated final line once the body ends.
    pub fn flush(&mut self, progress: &dyn ProgressHandler) {
        if self.done {
            return;
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if !line.is_empty() {
            self.handle_line(line, progress);
        }
        self.done = true;
    }

    /// Handle one line. Returns `true` on the `[DONE]` sentinel.
    fn handle_line(&mut self, line: &str, progress: &dyn ProgressHandler) -> bool {
        if line.is_empty() || line.starts_with(':') {
            return false;
        }
        let Some(data) = line.strip_prefix("data:") else {
            trace!("ignoring SSE field: {line}");
            return false;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            return true;
        }
        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => self.ready.push_back(chunk),
            Err(e) => {
                warn!("Failed to parse SSE chunk: {e}");
                progress.on_event(&ProgressEvent::ParseDiagnostic(data));
            }
        }
        false
    }
}

/// Pulls body bytes from a streaming response through an [`SseDecoder`].
struct SseReader {
    resp: reqwest::Response,
    decoder: SseDecoder,
    progress: Arc<dyn ProgressHandler>,
}

impl SseReader {
    fn into_stream(self) -> impl Stream<Item = Result<StreamChunk, SummarizeError>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            loop {
                if let Some(chunk) = reader.decoder.next_chunk() {
                    return Some((Ok(chunk), reader));
                }
                if reader.decoder.is_done() {
                    return None;
                }
                match reader.resp.chunk().await {
                    Ok(Some(bytes)) => reader.decoder.feed(&bytes, reader.progress.as_ref()),
                    Ok(None) => reader.decoder.flush(reader.progress.as_ref()),
                    Err(e) => {
                        reader.decoder.done = true;
                        return Some((Err(transport_error(&e)), reader));
                    }
                }
            }
        })
    }
}

// ── Summarizer ─────────────────────────────────────────────────────

/// Build the streaming request body for one part.
pub fn build_request(content: &str, model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(wrap_content(content)),
        ],
        stream: true,
        temperature: SUMMARY_TEMPERATURE,
        response_format: ResponseFormat {
            fmt_type: ResponseFormatType::Text,
        },
    }
}

/// [`Summarizer`] backed by an OpenAI-compatible streaming endpoint.
pub struct NetworkSummarizer {
    client: reqwest::Client,
    config: BackendConfig,
    default_model: String,
    timeout: Option<Duration>,
    progress: Arc<dyn ProgressHandler>,
}

impl NetworkSummarizer {
    /// Create a summarizer for the resolved `config`.
    pub fn new(config: BackendConfig) -> Result<Self, SummarizeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("splitsum/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                SummarizeError::BackendError(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            config,
            default_model: DEFAULT_MODEL.to_string(),
            timeout: None,
            progress: Arc::new(NoopProgress),
        })
    }

    /// Model used when `summarize` is called without one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Fail with [`SummarizeError::Timeout`] if the whole request exceeds `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url().trim_end_matches('/')
        )
    }

    async fn run(&self, content: &str, model: &str) -> Result<String, SummarizeError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            SummarizeError::BackendError(
                "no API key configured; set OPENAI_API_KEY or apiKey in the config file"
                    .to_string(),
            )
        })?;

        let body = build_request(content, model);
        let url = self.endpoint();
        debug!(
            "Sending streaming request: url={url}, model={model}, {} bytes of input",
            content.len()
        );
        self.progress.on_event(&ProgressEvent::Connecting {
            backend: BACKEND_LABEL,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!("API returned HTTP {status}");
            return Err(api_error(status, &text));
        }

        let reader = SseReader {
            resp,
            decoder: SseDecoder::new(),
            progress: Arc::clone(&self.progress),
        };
        aggregate_deltas(reader.into_stream(), self.progress.as_ref()).await
    }
}

impl Summarizer for NetworkSummarizer {
    fn name(&self) -> &str {
        "openai"
    }

    fn summarize<'a>(
        &'a self,
        content: Option<&'a str>,
        model: Option<&'a str>,
    ) -> SummaryFuture<'a> {
        Box::pin(async move {
            let content = check_content(content)?;
            let model = model.unwrap_or(&self.default_model);
            with_deadline(self.timeout, self.run(content, model)).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::recording::RecordingProgress;

    fn chunk(json: &str) -> StreamChunk {
        serde_json::from_str(json).unwrap()
    }

    fn scripted(
        items: Vec<Result<StreamChunk, SummarizeError>>,
    ) -> impl Stream<Item = Result<StreamChunk, SummarizeError>> {
        futures::stream::iter(items)
    }

    #[test]
    fn delta_text_tolerates_missing_levels() {
        assert_eq!(chunk("{}").delta_text(), "");
        assert_eq!(chunk(r#"{"choices":[]}"#).delta_text(), "");
        assert_eq!(chunk(r#"{"choices":[{}]}"#).delta_text(), "");
        assert_eq!(chunk(r#"{"choices":[{"delta":{}}]}"#).delta_text(), "");
        assert_eq!(
            chunk(r#"{"choices":[{"delta":{"content":null}}]}"#).delta_text(),
            ""
        );
        assert_eq!(
            chunk(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).delta_text(),
            "hi"
        );
    }

    #[tokio::test]
    async fn concatenates_only_non_empty_fragments() {
        let rec = RecordingProgress::default();
        let stream = scripted(vec![
            Ok(chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)),
            Ok(chunk(r#"{"choices":[{"delta":{"content":"This is "}}]}"#)),
            Ok(chunk(r#"{"choices":[]}"#)),
            Ok(chunk(r#"{"choices":[{"delta":{"content":""}}]}"#)),
            Ok(chunk("{}")),
            Ok(chunk(r#"{"choices":[{"delta":{"content":"a summary"}}]}"#)),
            Ok(chunk(r#"{"choices":[{"delta":{"content":"\n"}}]}"#)),
        ]);
        let result = aggregate_deltas(stream, &rec).await.unwrap();
        assert_eq!(result, "This is a summary");
        assert_eq!(rec.fragments(), vec!["This is ", "a summary", "\n"]);
        assert_eq!(rec.events()[0], "connected:OpenAI");
        assert_eq!(rec.events().last().unwrap(), "finished");
    }

    #[test]
    fn connected_follows_connecting_banner() {
        let flags = std::sync::Mutex::new(Vec::new());
        let handler = crate::progress::FnProgressHandler::new(|event: &ProgressEvent<'_>| {
            if let ProgressEvent::Connected { after_connecting, .. } = event {
                flags.lock().unwrap().push(*after_connecting);
            }
        });
        let mut acc = DeltaAccumulator::new();
        for text in ["a", "b"] {
            let delta = chunk(&format!(r#"{{"choices":[{{"delta":{{"content":"{text}"}}}}]}}"#));
            acc.push(&delta, &handler).unwrap();
        }
        assert_eq!(*flags.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn all_empty_stream_is_empty_result() {
        let rec = RecordingProgress::default();
        let stream = scripted(vec![
            Ok(chunk(r#"{"choices":[{"delta":{"content":""}}]}"#)),
            Ok(chunk(r#"{"choices":[{"delta":{"content":"   "}}]}"#)),
        ]);
        let err = aggregate_deltas(stream, &rec).await.unwrap_err();
        assert!(err.is_content_issue());
    }

    #[tokio::test]
    async fn stream_error_aborts_without_partial_result() {
        let rec = RecordingProgress::default();
        let stream = scripted(vec![
            Ok(chunk(r#"{"choices":[{"delta":{"content":"partial"}}]}"#)),
            Err(SummarizeError::BackendError("connection reset".into())),
            Ok(chunk(r#"{"choices":[{"delta":{"content":"never"}}]}"#)),
        ]);
        let err = aggregate_deltas(stream, &rec).await.unwrap_err();
        assert!(matches!(err, SummarizeError::BackendError(ref m) if m == "connection reset"));
        assert!(!rec.events().contains(&"finished".to_string()));
    }

    #[tokio::test]
    async fn in_stream_error_payload_fails() {
        let rec = RecordingProgress::default();
        let stream = scripted(vec![Ok(chunk(
            r#"{"error":{"message":"overloaded"}}"#,
        ))]);
        let err = aggregate_deltas(stream, &rec).await.unwrap_err();
        assert!(matches!(err, SummarizeError::BackendError(ref m) if m == "overloaded"));
    }

    fn drain(decoder: &mut SseDecoder) -> Vec<String> {
        std::iter::from_fn(|| decoder.next_chunk())
            .map(|c| c.delta_text().to_string())
            .collect()
    }

    #[test]
    fn data_line_split_across_reads_is_decoded_once_complete() {
        let rec = RecordingProgress::default();
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: {\"choices\":[{\"delta\":", &rec);
        assert!(drain(&mut decoder).is_empty());
        assert!(!decoder.pending().is_empty());
        decoder.feed(b"{\"content\":\"joined\"}}]}\n\n", &rec);
        assert_eq!(drain(&mut decoder), vec!["joined"]);
        assert!(decoder.pending().is_empty());
        assert!(rec.events().is_empty(), "no diagnostics for split lines");
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let rec = RecordingProgress::default();
        let mut decoder = SseDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{1f600}\"}}]}\n";
        let bytes = line.as_bytes();
        // Split inside the four-byte emoji.
        let cut = line.find('\u{1f600}').unwrap() + 2;
        decoder.feed(&bytes[..cut], &rec);
        decoder.feed(&bytes[cut..], &rec);
        assert_eq!(drain(&mut decoder), vec!["caf\u{e9} \u{1f600}"]);
    }

    #[test]
    fn flush_parses_unterminated_final_line() {
        let rec = RecordingProgress::default();
        let mut decoder = SseDecoder::new();
        let last = b"data: {\"choices\":[{\"delta\":{\"content\":\"last\"}}]}";
        decoder.feed(last, &rec);
        assert!(drain(&mut decoder).is_empty());
        decoder.flush(&rec);
        assert!(decoder.is_done());
        assert_eq!(drain(&mut decoder), vec!["last"]);
    }

    #[test]
    fn input_after_done_is_dropped() {
        let rec = RecordingProgress::default();
        let mut decoder = SseDecoder::new();
        decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n",
            &rec,
        );
        assert!(decoder.is_done());
        let later = b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n";
        decoder.feed(later, &rec);
        decoder.flush(&rec);
        assert_eq!(drain(&mut decoder), vec!["kept"]);
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let rec = RecordingProgress::default();
        let mut decoder = SseDecoder::new();
        decoder.feed(
            b": keep-alive\nevent: message\ndata: {not json\ndata:{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            &rec,
        );
        assert_eq!(drain(&mut decoder), vec!["ok"]);
        assert_eq!(rec.events(), vec!["diagnostic:{not json"]);
    }

    #[test]
    fn api_error_prefers_structured_message() {
        let err = api_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API key","type":"auth"}}"#,
        );
        assert!(matches!(
            err,
            SummarizeError::BackendApiError { status: 401, ref message } if message == "Invalid API key"
        ));
    }

    #[test]
    fn api_error_falls_back_to_body_then_reason() {
        let err = api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(matches!(
            err,
            SummarizeError::BackendApiError { status: 502, ref message } if message == "upstream down"
        ));

        let err = api_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(
            err,
            SummarizeError::BackendApiError { status: 429, ref message } if message == "Too Many Requests"
        ));
    }

    #[test]
    fn blank_message_is_unknown_error() {
        let err = message_or_unknown("  ".into(), || "Error { kind: Other }".into());
        assert!(matches!(err, SummarizeError::UnknownBackendError(ref r) if r.contains("Other")));

        let err = message_or_unknown("timed out".into(), || unreachable!());
        assert!(matches!(err, SummarizeError::BackendError(ref m) if m == "timed out"));
    }

    #[test]
    fn request_body_is_streaming_plain_text() {
        let body = serde_json::to_value(build_request("doc", "gpt-test")).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["response_format"]["type"], "text");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][1]["content"],
            "<text_to_summarize>doc</text_to_summarize>"
        );
    }

    #[test]
    fn endpoint_joins_base_url() {
        let summarizer = NetworkSummarizer::new(BackendConfig {
            api_key: None,
            base_url: Some("http://localhost:9000/v1/".into()),
        })
        .unwrap();
        assert_eq!(
            summarizer.endpoint(),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn rejects_missing_content_without_request() {
        let summarizer = NetworkSummarizer::new(BackendConfig {
            api_key: Some("k".into()),
            // Nothing listens here; reaching the transport would fail differently.
            base_url: Some("http://127.0.0.1:9".into()),
        })
        .unwrap();
        for content in [None, Some("")] {
            let err = summarizer.summarize(content, None).await.unwrap_err();
            assert!(matches!(err, SummarizeError::InvalidInput(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_connecting() {
        let summarizer = NetworkSummarizer::new(BackendConfig::default()).unwrap();
        let err = summarizer.summarize(Some("text"), None).await.unwrap_err();
        assert!(matches!(err, SummarizeError::BackendError(ref m) if m.contains("API key")));
    }
}
