use thiserror::Error;

/// Errors from the LLM enrichment pipeline.
///
/// Variants are classified as transient or permanent by
/// [`crate::retry::is_retriable`]; permanent errors drop straight through to
/// the keyword fallback without burning retry budget.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by API: {message}")]
    RateLimited { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to deserialize {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("API returned an empty completion")]
    EmptyResponse,
}
