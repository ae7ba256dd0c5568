use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Conflict,
    /// The upstream service answered, but with something we cannot use.
    UpstreamInvalid,
    UpstreamUnavailable,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorCode {
    /// Status code reported in the operation envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidArgument => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::Cancelled => 499,
            ErrorCode::Internal => 500,
            ErrorCode::UpstreamInvalid => 502,
            ErrorCode::UpstreamUnavailable => 502,
            ErrorCode::Timeout => 504,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::UpstreamInvalid => "UPSTREAM_INVALID",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

pub trait RagraphError: std::error::Error {
    fn error_code(&self) -> ErrorCode;

    /// Upstream-provided status code, when one exists and should be surfaced as is.
    fn upstream_status(&self) -> Option<u16> {
        None
    }

    fn status_code(&self) -> u16 {
        self.upstream_status()
            .filter(|status| *status >= 400)
            .unwrap_or_else(|| self.error_code().status_code())
    }
}
