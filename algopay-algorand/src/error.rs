//! Errors raised while talking to algod or the indexer.

use algopay::error::QueryError;
use http::StatusCode;

/// Errors that can occur while querying an Algorand node or indexer.
#[derive(Debug, thiserror::Error)]
pub enum AlgorandClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response decoded but does not describe a usable transfer.
    #[error("Malformed transaction: {context}: {message}")]
    Malformed {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong.
        message: String,
    },
    /// More pages were outstanding when the page limit was reached.
    #[error("Indexer results truncated: {context}: {pages} pages read, more remain")]
    Truncated {
        /// Human-readable context.
        context: &'static str,
        /// Pages read before giving up.
        pages: usize,
    },
}

impl From<AlgorandClientError> for QueryError {
    fn from(err: AlgorandClientError) -> Self {
        match err {
            AlgorandClientError::JsonDeserialization { context, source } => Self::Malformed {
                context,
                message: source.to_string(),
            },
            AlgorandClientError::Malformed { context, message } => {
                Self::Malformed { context, message }
            }
            AlgorandClientError::Truncated { context, pages } => Self::Malformed {
                context,
                message: format!("results truncated after {pages} pages"),
            },
            AlgorandClientError::UrlParse { context, source } => Self::Unavailable {
                context,
                source: Box::new(source),
            },
            AlgorandClientError::Http { context, source }
            | AlgorandClientError::ResponseBodyRead { context, source } => Self::Unavailable {
                context,
                source: Box::new(source),
            },
            AlgorandClientError::HttpStatus {
                context,
                status,
                body,
            } => Self::Unavailable {
                context,
                source: format!("HTTP {status}: {body}").into(),
            },
        }
    }
}
