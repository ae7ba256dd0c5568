use crate::ops::Operation;
use ragraph_core::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result of one operation. `body` is itself JSON text, so a transport payload is
/// decoded twice: once for the envelope, once for the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("transport payload has no string 'data' field")]
    MissingData,
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("operation failed with {status_code} {code}: {message}")]
    Failed {
        status_code: u16,
        code: ErrorCode,
        message: String,
    },
    #[error("{operation} body does not match its schema: {source}")]
    Body {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Envelope {
    pub fn success<T: Serialize>(body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status_code: 200,
            body: serde_json::to_string(body)?,
        })
    }

    pub fn failure(status_code: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        let body = ErrorBody {
            message: message.into(),
            code,
        };
        // A two-field struct of a string and a unit enum always serializes.
        let body = serde_json::to_string(&body).unwrap_or_else(|_| String::from("{}"));
        Self { status_code, body }
    }

    pub fn from_error<E: RagraphError>(err: &E) -> Self {
        Self::failure(err.status_code(), err.error_code(), err.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// `{"data": "<envelope json>"}`.
    pub fn to_transport(&self) -> Result<Value, serde_json::Error> {
        Ok(serde_json::json!({ "data": serde_json::to_string(self)? }))
    }

    pub fn from_transport(payload: &Value) -> Result<Self, EnvelopeError> {
        let data = payload
            .get("data")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingData)?;
        serde_json::from_str(data).map_err(EnvelopeError::Envelope)
    }

    pub fn error_body(&self) -> Option<ErrorBody> {
        if self.is_success() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// Decodes a transport payload into `O`'s success body. A failure envelope comes
/// back as [`EnvelopeError::Failed`]; a body of the wrong shape as
/// [`EnvelopeError::Body`].
pub fn decode<O: Operation>(payload: &Value) -> Result<O::Body, EnvelopeError> {
    let envelope = Envelope::from_transport(payload)?;
    decode_envelope::<O>(&envelope)
}

pub fn decode_envelope<O: Operation>(envelope: &Envelope) -> Result<O::Body, EnvelopeError> {
    if !envelope.is_success() {
        let (code, message) = match envelope.error_body() {
            Some(body) => (body.code, body.message),
            None => (ErrorCode::Internal, envelope.body.clone()),
        };
        return Err(EnvelopeError::Failed {
            status_code: envelope.status_code,
            code,
            message,
        });
    }
    serde_json::from_str(&envelope.body).map_err(|source| EnvelopeError::Body {
        operation: O::NAME,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{BuildIndex, DeleteVectorCollection, MessageBody, SynthesizeQuery};

    #[test]
    fn transport_is_decoded_twice() {
        let envelope = Envelope::success(&MessageBody::new("Collection deleted")).unwrap();
        let transport = envelope.to_transport().unwrap();
        assert!(transport["data"].is_string());

        let body = decode::<DeleteVectorCollection>(&transport).unwrap();
        assert_eq!(body.message, "Collection deleted");
    }

    #[test]
    fn failure_envelope_surfaces_code_and_message() {
        let envelope = Envelope::failure(404, ErrorCode::NotFound, "collection docs not found");
        let transport = envelope.to_transport().unwrap();

        match decode::<DeleteVectorCollection>(&transport) {
            Err(EnvelopeError::Failed {
                status_code,
                code,
                message,
            }) => {
                assert_eq!(status_code, 404);
                assert_eq!(code, ErrorCode::NotFound);
                assert_eq!(message, "collection docs not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn body_of_the_wrong_operation_is_rejected() {
        let envelope = Envelope::success(&MessageBody::new("hello")).unwrap();
        let err = decode_envelope::<SynthesizeQuery>(&envelope).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::Body {
                operation: "synthesizeQuery",
                ..
            }
        ));

        let err = decode_envelope::<BuildIndex>(&envelope).unwrap_err();
        assert!(matches!(err, EnvelopeError::Body { .. }));
    }

    #[test]
    fn payload_without_data_is_rejected() {
        let err = Envelope::from_transport(&serde_json::json!({ "statusCode": 200 })).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingData));

        let err = Envelope::from_transport(&serde_json::json!({ "data": "not json" })).unwrap_err();
        assert!(matches!(err, EnvelopeError::Envelope(_)));
    }

    #[test]
    fn envelope_field_names_are_camel_case() {
        let json = serde_json::to_value(Envelope::failure(400, ErrorCode::InvalidArgument, "x"))
            .unwrap();
        assert_eq!(json["statusCode"], 400);
        let body: Value = serde_json::from_str(json["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["code"], "INVALID_ARGUMENT");
    }
}
