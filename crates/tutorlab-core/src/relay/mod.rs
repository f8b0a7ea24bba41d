//! Streaming relay between the upstream tutor model and the browser.
//!
//! Each request moves through `OPEN_UPSTREAM -> STREAMING` and ends in one of
//! `COMPLETED`, `UPSTREAM_ERROR`, or (for forwarding only) `CLIENT_DISCONNECTED`.
//! A spawned pump task owns the upstream stream: it forwards every chunk over
//! an unbounded channel and feeds the same bytes to a [`FrameParser`]. The
//! caller gets two independent halves:
//!
//! - [`RelayHandle::frames`], the byte stream for the HTTP response body.
//! - [`RelayHandle::completion`], resolving to the reassembled text once the
//!   upstream finishes, whether or not anyone is still reading `frames`.

pub mod frame;
pub mod prompt;
pub mod upstream;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{Instrument, debug, info, warn};

use tutorlab_types::config::UpstreamConfig;
use tutorlab_types::error::UpstreamError;
use tutorlab_types::llm::{CompletionRequest, HistoryEntry};

use self::frame::FrameParser;
use self::upstream::CompletionUpstream;

/// Model and sampling settings for relayed completions.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f64,
    pub regenerate_temperature: f64,
}

impl From<&UpstreamConfig> for RelaySettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            regenerate_temperature: config.regenerate_temperature,
        }
    }
}

/// What the browser asked for.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub topic_name: String,
    pub history: Vec<HistoryEntry>,
    pub message: String,
    pub regenerate: bool,
}

/// How the upstream side of a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    Completed,
    UpstreamError(String),
}

/// Result of a finished relay, produced regardless of client state.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// Reassembled assistant text, possibly empty.
    pub text: String,
    /// Milliseconds from opening the upstream request to its end.
    pub latency_ms: u64,
    pub status: RelayStatus,
    /// The response body receiver went away before the upstream finished.
    pub client_disconnected: bool,
    /// Upstream chunks received.
    pub chunks: u32,
}

/// Byte stream to hand to the HTTP response body.
pub type FrameStream = UnboundedReceiverStream<Bytes>;

/// Resolves once the upstream side of the relay ends.
pub struct RelayCompletion(JoinHandle<RelayOutcome>);

impl RelayCompletion {
    pub async fn wait(self) -> RelayOutcome {
        match self.0.await {
            Ok(outcome) => outcome,
            Err(e) => RelayOutcome {
                text: String::new(),
                latency_ms: 0,
                status: RelayStatus::UpstreamError(format!("relay task failed: {e}")),
                client_disconnected: true,
                chunks: 0,
            },
        }
    }
}

pub struct RelayHandle {
    pub frames: FrameStream,
    pub completion: RelayCompletion,
}

/// Opens upstream completions and splits them into forward + accumulate.
pub struct ChatRelay<U: CompletionUpstream> {
    upstream: Arc<U>,
    settings: RelaySettings,
}

impl<U: CompletionUpstream> ChatRelay<U> {
    pub fn new(upstream: Arc<U>, settings: RelaySettings) -> Self {
        Self { upstream, settings }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Build the upstream request body for `request`.
    pub fn completion_request(&self, request: &RelayRequest) -> CompletionRequest {
        let temperature = if request.regenerate {
            self.settings.regenerate_temperature
        } else {
            self.settings.temperature
        };
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: prompt::build_prompt(
                &request.topic_name,
                &request.history,
                &request.message,
                request.regenerate,
            ),
            temperature,
            stream: true,
        }
    }

    /// Start relaying. Must be called inside a tokio runtime.
    pub fn start(&self, request: RelayRequest) -> RelayHandle {
        let body = self.completion_request(&request);
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!(
            "gen_ai.relay",
            gen_ai.request.model = %body.model,
            gen_ai.request.temperature = body.temperature,
            gen_ai.request.stream = true,
            regenerate = request.regenerate,
        );
        let task = tokio::spawn(pump(Arc::clone(&self.upstream), body, tx).instrument(span));
        RelayHandle {
            frames: UnboundedReceiverStream::new(rx),
            completion: RelayCompletion(task),
        }
    }
}

/// Sends to the client until the first failed send, then stays quiet.
struct Forwarder {
    tx: mpsc::UnboundedSender<Bytes>,
    disconnected: bool,
}

impl Forwarder {
    fn send(&mut self, chunk: Bytes) {
        if self.disconnected {
            return;
        }
        if self.tx.send(chunk).is_err() {
            self.disconnected = true;
            info!("client disconnected, continuing upstream for persistence");
        }
    }
}

/// End-of-stream sentinel understood by the browser client.
const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Terminal frame sent when the upstream fails.
pub fn error_frame(err: &UpstreamError) -> Bytes {
    let payload = serde_json::json!({ "error": err.to_string() });
    Bytes::from(format!("data: {payload}\n\n{DONE_FRAME}"))
}

async fn pump<U: CompletionUpstream>(
    upstream: Arc<U>,
    body: CompletionRequest,
    tx: mpsc::UnboundedSender<Bytes>,
) -> RelayOutcome {
    let started = Instant::now();
    let mut forward = Forwarder {
        tx,
        disconnected: false,
    };
    let mut parser = FrameParser::new();
    let mut chunks = 0u32;

    let status = match upstream.open(body).await {
        Err(e) => {
            warn!(error = %e, "upstream request failed");
            forward.send(error_frame(&e));
            RelayStatus::UpstreamError(e.to_string())
        }
        Ok(mut stream) => loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    chunks += 1;
                    parser.push(&chunk);
                    forward.send(chunk);
                }
                Some(Err(e)) => {
                    warn!(error = %e, chunks, "upstream stream failed");
                    forward.send(error_frame(&e));
                    break RelayStatus::UpstreamError(e.to_string());
                }
                None => break RelayStatus::Completed,
            }
        },
    };
    parser.finish();
    if status == RelayStatus::Completed && !parser.is_done() {
        debug!(chunks, "upstream closed without sentinel, terminating body");
        forward.send(Bytes::from_static(DONE_FRAME.as_bytes()));
    }

    let latency_ms = started.elapsed().as_millis() as u64;
    if parser.skipped() > 0 {
        debug!(skipped = parser.skipped(), "unparseable frames skipped");
    }
    info!(
        latency_ms,
        chunks,
        done_sentinel = parser.is_done(),
        client_disconnected = forward.disconnected,
        "relay finished"
    );

    RelayOutcome {
        text: parser.into_text(),
        latency_ms,
        status,
        client_disconnected: forward.disconnected,
        chunks,
    }
}
