use crate::constants::constants;
use crate::protocol::{ErrorBody, Failed};
use std::fmt;

/// The five failure kinds a caller branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    ServerError,
    ThresholdExceeded,
    StreamError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server-error",
            ErrorKind::ThresholdExceeded => "threshold-exceeded",
            ErrorKind::StreamError => "stream-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a search session.
///
/// Initial-request failures (`ServerError`, `ThresholdExceeded`) and in-band
/// failures (`StreamError`) stay distinct so callers can tell "failed before
/// any progress" from "failed after partial results".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Search timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Result set too large: {matches_found} matches exceed the threshold of {threshold}")]
    ThresholdExceeded {
        matches_found: u64,
        threshold: u64,
        csv_fallback_url: Option<String>,
    },

    #[error("Search failed mid-stream ({}): {}", failed.status_code, failed.message)]
    StreamError { failed: Failed, events_before: usize },
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::Network { .. } => ErrorKind::Network,
            SearchError::Timeout { .. } => ErrorKind::Timeout,
            SearchError::ServerError { .. } => ErrorKind::ServerError,
            SearchError::ThresholdExceeded { .. } => ErrorKind::ThresholdExceeded,
            SearchError::StreamError { .. } => ErrorKind::StreamError,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            SearchError::Network { .. } => constants::NETWORK_STATUS,
            SearchError::Timeout { .. } => constants::TIMEOUT_STATUS,
            SearchError::ServerError { status, .. } => *status,
            SearchError::ThresholdExceeded { .. } => 400,
            SearchError::StreamError { failed, .. } => failed.status_code,
        }
    }

    /// Export URL to fetch complete results from; only set for oversized result sets.
    pub fn csv_fallback(&self) -> Option<&str> {
        match self {
            SearchError::ThresholdExceeded {
                csv_fallback_url, ..
            } => csv_fallback_url.as_deref(),
            _ => None,
        }
    }

    /// Whether the caller is expected to switch to the CSV export.
    pub fn wants_csv_export(&self) -> bool {
        self.kind() == ErrorKind::ThresholdExceeded
    }

    /// Same failure in the shape of a terminal stream event.
    pub fn to_failed_event(&self) -> Failed {
        match self {
            SearchError::StreamError { failed, .. } => failed.clone(),
            SearchError::ThresholdExceeded {
                matches_found,
                threshold,
                csv_fallback_url,
            } => Failed {
                status_code: self.status_code(),
                kind: self.kind().as_str().to_string(),
                message: self.to_string(),
                matches_found: Some(*matches_found),
                threshold: Some(*threshold),
                csv_fallback_url: csv_fallback_url.clone(),
            },
            _ => Failed {
                status_code: self.status_code(),
                kind: self.kind().as_str().to_string(),
                message: self.to_string(),
                matches_found: None,
                threshold: None,
                csv_fallback_url: None,
            },
        }
    }

    /// Text for an end user, including the recovery action where there is one.
    pub fn user_message(&self) -> String {
        match self {
            SearchError::Network { .. } => {
                "Could not reach the search server. Check your connection and try again."
                    .to_string()
            }
            SearchError::Timeout { .. } => {
                "The search took too long and was stopped. Narrow the scope or the pattern."
                    .to_string()
            }
            SearchError::ServerError { status, message } => {
                format!("The server rejected the search ({}): {}", status, message)
            }
            SearchError::ThresholdExceeded {
                matches_found,
                threshold,
                ..
            } => format!(
                "Found {} matches, more than the {} that can be displayed. Export the complete results as CSV instead.",
                matches_found, threshold
            ),
            SearchError::StreamError { failed, .. } => {
                format!("The search failed while running: {}", failed.message)
            }
        }
    }

    /// Classify a non-success response received before any stream byte.
    pub fn from_rejection(status: u16, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ErrorBody>(body).ok();

        if let Some(body) = &parsed {
            if status == 400 && body.is_result_set_too_large() {
                if let (Some(matches_found), Some(threshold)) = (body.matches_found, body.threshold)
                {
                    return SearchError::ThresholdExceeded {
                        matches_found,
                        threshold,
                        csv_fallback_url: body.csv_endpoint.clone(),
                    };
                }
            }
        }

        let message = parsed
            .as_ref()
            .and_then(|b| b.text())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Search request failed with status {}", status));
        SearchError::ServerError { status, message }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SearchError::ServerError {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SearchError::Network {
                message: err.to_string(),
            },
        }
    }
}

/// Errors building a [`crate::protocol::SearchRequest`] from user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Search pattern must not be empty")]
    EmptyPattern,

    #[error("maxResults must be between 1 and 10000, got {0}")]
    MaxResultsOutOfRange(u32),

    #[error("Missing {0} for the selected search scope")]
    MissingScopeId(&'static str),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),
}
