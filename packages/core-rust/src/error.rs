//! Transport errors and their classification into user-facing messages.
//!
//! Transports report failures as a structured [`TransportError`]. The
//! classifier turns that into a status code plus a domain-specific message
//! that tells the user what to do next. Errors that only exist as text (for
//! example relayed from another process) go through [`parse_error_message`]
//! first.

use std::sync::LazyLock;

use regex::Regex;

/// Failure reported by the layer that performs one remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("request failed with status code: {status}. Error message: {body}")]
    Http { status: u16, body: String },
    /// The request did not complete within the transport timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure (DNS, TLS, reset).
    #[error("network error: {0}")]
    Network(String),
    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Status code and server message pulled out of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub status_code: u16,
    pub message: String,
}

static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"status code:\s*(\d{3})").expect("status pattern is valid"));
static ERROR_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Error message:\s*(.*)$").expect("message pattern is valid"));

/// Extracts the status code and server message from a free-text error of the
/// form `... status code: 404. Error message: {...}`. Returns `None` when no
/// status code is present.
#[must_use]
pub fn parse_error_message(raw: &str) -> Option<ErrorDetails> {
    let status_code = STATUS_CODE
        .captures(raw)
        .and_then(|caps| caps[1].parse::<u16>().ok())?;
    let message = ERROR_MESSAGE
        .captures(raw)
        .map_or_else(String::new, |caps| caps[1].trim().to_string());
    Some(ErrorDetails {
        status_code,
        message,
    })
}

/// Result of classification: the status (if one was known) and the message
/// to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status_code: Option<u16>,
    pub message: String,
}

/// Per-domain table of user-facing error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessages {
    /// Plural noun used in messages, e.g. `"alarms"`.
    pub records: &'static str,
    /// Extra statuses beyond 404/429/504, checked first.
    pub extra: &'static [(u16, &'static str)],
}

/// Text used when nothing about the failure could be determined.
pub const UNKNOWN_ERROR_MESSAGE: &str = "The query failed due to an unknown error.";

impl ErrorMessages {
    #[must_use]
    pub const fn new(records: &'static str) -> Self {
        Self { records, extra: &[] }
    }

    #[must_use]
    pub const fn with_extra(self, extra: &'static [(u16, &'static str)]) -> Self {
        Self {
            records: self.records,
            extra,
        }
    }

    /// Message for a known status code and server message.
    #[must_use]
    pub fn message_for(&self, details: &ErrorDetails) -> String {
        if let Some((_, text)) = self.extra.iter().find(|(code, _)| *code == details.status_code) {
            return (*text).to_string();
        }
        let records = self.records;
        match details.status_code {
            404 => format!(
                "The query to fetch {records} failed because the requested resource was not found. \
                 Please check the query parameters and try again."
            ),
            429 => format!(
                "The query to fetch {records} failed due to too many requests. Please try again later."
            ),
            504 => format!(
                "The query to fetch {records} experienced a timeout error. \
                 Narrow your query with a more specific filter and try again."
            ),
            code => format!(
                "The query failed due to the following error: (status {code}) {}.",
                details.message
            ),
        }
    }

    /// Classifies a structured transport error. Never fails.
    #[must_use]
    pub fn classify(&self, error: &TransportError) -> ClassifiedError {
        let details = match error {
            TransportError::Http { status, body } => ErrorDetails {
                status_code: *status,
                message: body.clone(),
            },
            TransportError::Timeout => ErrorDetails {
                status_code: 504,
                message: String::new(),
            },
            TransportError::Network(_) | TransportError::Decode(_) => {
                return ClassifiedError {
                    status_code: None,
                    message: UNKNOWN_ERROR_MESSAGE.to_string(),
                };
            }
        };
        ClassifiedError {
            status_code: Some(details.status_code),
            message: self.message_for(&details),
        }
    }

    /// Classifies a free-text error message. Unparseable input maps to the
    /// unknown-error message.
    #[must_use]
    pub fn classify_message(&self, raw: &str) -> ClassifiedError {
        match parse_error_message(raw) {
            Some(details) => ClassifiedError {
                status_code: Some(details.status_code),
                message: self.message_for(&details),
            },
            None => ClassifiedError {
                status_code: None,
                message: UNKNOWN_ERROR_MESSAGE.to_string(),
            },
        }
    }
}
