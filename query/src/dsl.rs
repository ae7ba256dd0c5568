use ragraph_core::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use storage::IndexVersion;
use thiserror::Error;

pub const DEFAULT_K: usize = 5;
const MAX_K: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQueryRequest {
    #[serde(default, alias = "s3_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_k")]
    pub k: i64,
    #[serde(default)]
    pub index_version: Option<String>,
}

const fn default_k() -> i64 {
    DEFAULT_K as i64
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("Parameter 'bucket' is missing or empty.")]
    MissingBucket,
    #[error("Parameter 'query' is missing or empty.")]
    EmptyQuery,
    #[error("Invalid 'k' value: k must be between 1 and 1000")]
    InvalidK,
    #[error("Invalid 'indexVersion' value: {0:?}")]
    InvalidIndexVersion(String),
}

impl RagraphError for QueryValidationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagQuery {
    pub bucket: String,
    pub query: String,
    pub k: usize,
    pub index_version: Option<IndexVersion>,
}

impl RagQueryRequest {
    pub fn new(bucket: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            query: query.into(),
            k: default_k(),
            index_version: None,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<RagQuery, QueryValidationError> {
        let bucket = self.bucket.trim();
        if bucket.is_empty() {
            return Err(QueryValidationError::MissingBucket);
        }
        if self.query.trim().is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        let k = usize::try_from(self.k)
            .ok()
            .filter(|k| (1..=MAX_K).contains(k))
            .ok_or(QueryValidationError::InvalidK)?;
        let index_version = match self.index_version.as_deref() {
            None => None,
            Some(raw) => Some(
                IndexVersion::parse(raw)
                    .ok_or_else(|| QueryValidationError::InvalidIndexVersion(raw.to_string()))?,
            ),
        };

        Ok(RagQuery {
            bucket: bucket.to_string(),
            query: self.query.clone(),
            k,
            index_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_k_to_five() {
        let request = RagQueryRequest::parse_json(r#"{"bucket":"docs","query":"apple"}"#).unwrap();
        let query = request.validate().unwrap();
        assert_eq!(query.k, 5);
        assert_eq!(query.index_version, None);
    }

    #[test]
    fn accepts_legacy_bucket_name() {
        let request =
            RagQueryRequest::parse_json(r#"{"s3_bucket":"docs","query":"q","k":2}"#).unwrap();
        assert_eq!(request.validate().unwrap().bucket, "docs");
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut request = RagQueryRequest::new("docs", "q");
        request.k = 0;
        assert_eq!(request.validate(), Err(QueryValidationError::InvalidK));
        request.k = -3;
        assert_eq!(request.validate(), Err(QueryValidationError::InvalidK));

        assert_eq!(
            RagQueryRequest::new("", "q").validate(),
            Err(QueryValidationError::MissingBucket)
        );
        assert_eq!(
            RagQueryRequest::new("docs", "  ").validate(),
            Err(QueryValidationError::EmptyQuery)
        );

        let mut request = RagQueryRequest::new("docs", "q");
        request.index_version = Some("../etc".to_string());
        assert!(matches!(
            request.validate(),
            Err(QueryValidationError::InvalidIndexVersion(_))
        ));
    }
}
