//! OpenTelemetry GenAI Semantic Convention attribute names.
//!
//! Spans around upstream completions declare these fields as
//! `tracing::field::Empty` and fill them through `Span::record`, which takes
//! the field name as a string.
//!
//! Span naming convention: `"{operation} {model}"` (e.g., `"chat deepseek-chat"`)

/// The name of the operation being performed (e.g., "chat").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI provider (e.g., "deepseek").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

/// The model ID requested (e.g., "deepseek-chat").
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

/// The sampling temperature for the request.
pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

/// HTTP status returned by the provider.
pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";

/// Standard chat completion operation.
pub const OP_CHAT: &str = "chat";

/// Provider name used when the base URL points at DeepSeek.
pub const PROVIDER_DEEPSEEK: &str = "deepseek";

/// Provider name for any other OpenAI-compatible endpoint.
pub const PROVIDER_OPENAI_COMPATIBLE: &str = "openai_compatible";

/// Span display name for an operation on a model.
pub fn span_name(operation: &str, model: &str) -> String {
    format!("{operation} {model}")
}

/// Provider name inferred from a base URL.
pub fn provider_for_base_url(base_url: &str) -> &'static str {
    if base_url.contains("deepseek") {
        PROVIDER_DEEPSEEK
    } else {
        PROVIDER_OPENAI_COMPATIBLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_name() {
        assert_eq!(span_name(OP_CHAT, "deepseek-chat"), "chat deepseek-chat");
    }

    #[test]
    fn test_provider_for_base_url() {
        assert_eq!(provider_for_base_url("https://api.deepseek.com/v1"), "deepseek");
        assert_eq!(provider_for_base_url("http://localhost:8080/v1"), "openai_compatible");
    }
}
