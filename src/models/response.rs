use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::GatewayError;

/// One failed target in a dispatch request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionErrorEntry {
    pub error: String,
    pub session: String,
}

impl From<&GatewayError> for SessionErrorEntry {
    fn from(err: &GatewayError) -> Self {
        SessionErrorEntry {
            error: err.to_string(),
            session: err.session_key().unwrap_or_default().to_string(),
        }
    }
}

/// Body of every admin response: `{"result":"OK"}` on full success,
/// `{"errors":[...],"result":"OK"|"NG"}` when any target failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<SessionErrorEntry>>,
    pub result: String,
}

impl DispatchResponse {
    pub fn ok() -> Self {
        DispatchResponse {
            errors: None,
            result: constants::RESULT_OK.to_string(),
        }
    }

    pub fn with_errors(errors: Vec<SessionErrorEntry>, strict: bool) -> Self {
        let result = if strict {
            constants::RESULT_NG
        } else {
            constants::RESULT_OK
        };
        DispatchResponse {
            errors: Some(errors),
            result: result.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_shape() {
        let body = serde_json::to_string(&DispatchResponse::ok()).unwrap();
        assert_eq!(body, r#"{"result":"OK"}"#);
    }

    #[test]
    fn test_error_shape() {
        let err = GatewayError::SessionNotFound("hogehog".into());
        let resp = DispatchResponse::with_errors(vec![(&err).into()], true);
        let body = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            body,
            r#"{"errors":[{"error":"session is not found: hogehog","session":"hogehog"}],"result":"NG"}"#
        );
    }

    #[test]
    fn test_partial_delivery_keeps_ok() {
        let err = GatewayError::SessionClosed("fugafuga".into());
        let resp = DispatchResponse::with_errors(vec![(&err).into()], false);
        assert_eq!(resp.result, constants::RESULT_OK);
    }
}
