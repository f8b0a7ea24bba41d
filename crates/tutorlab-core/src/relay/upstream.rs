//! CompletionUpstream trait definition.
//!
//! The relay needs the raw upstream bytes (they are forwarded to the browser
//! verbatim), so the upstream hands back a byte stream rather than parsed
//! events. Implementations live in tutorlab-infra.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use tutorlab_types::error::UpstreamError;
use tutorlab_types::llm::CompletionRequest;

/// Raw response body of a streaming completion.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static>>;

pub trait CompletionUpstream: Send + Sync + 'static {
    /// Open a streaming completion. Resolves once response headers arrive.
    fn open(
        &self,
        request: CompletionRequest,
    ) -> impl std::future::Future<Output = Result<ByteStream, UpstreamError>> + Send;
}
