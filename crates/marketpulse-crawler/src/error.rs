use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser service error ({status}): {message}")]
    Browser { status: u16, message: String },

    #[error("driver error: {0}")]
    Driver(String),
}
