//! Decoding of per-invocation metadata carried in `/next` response headers.

use lambda_bootstrap_core::protocol::{Deadline, Invocation};
use lambda_bootstrap_core::routes::{
    validate_request_id, RouteError, CLIENT_CONTEXT_HEADER, COGNITO_IDENTITY_HEADER,
    DEADLINE_HEADER, FUNCTION_ARN_HEADER, REQUEST_ID_HEADER, TRACE_ID_HEADER,
};
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::ClientError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CognitoIdentity {
    #[serde(default)]
    cognito_identity_id: String,
    #[serde(default)]
    cognito_identity_pool_id: String,
}

/// Only the request id is required; optional headers that fail to decode are
/// logged and left empty.
pub(crate) fn invocation_from_parts(
    headers: &HeaderMap,
    payload: Vec<u8>,
) -> Result<Invocation, ClientError> {
    let request_id = match headers.get(REQUEST_ID_HEADER) {
        None => return Err(ClientError::MissingHeader(REQUEST_ID_HEADER)),
        Some(value) => value.to_str().map_err(|_| {
            ClientError::InvalidRequestId(RouteError::new(
                "request id header is not visible ascii",
            ))
        })?,
    };
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return Err(ClientError::MissingHeader(REQUEST_ID_HEADER));
    }
    validate_request_id(request_id).map_err(ClientError::InvalidRequestId)?;

    let deadline = match header_text(headers, request_id, DEADLINE_HEADER) {
        Some(text) => parse_deadline(request_id, &text),
        None => Deadline::default(),
    };

    let identity = match header_text(headers, request_id, COGNITO_IDENTITY_HEADER) {
        Some(text) => parse_cognito_identity(request_id, &text),
        None => CognitoIdentity::default(),
    };

    Ok(Invocation {
        request_id: request_id.to_string(),
        payload,
        deadline,
        invoked_function_arn: header_text(headers, request_id, FUNCTION_ARN_HEADER)
            .unwrap_or_default(),
        trace_id: header_text(headers, request_id, TRACE_ID_HEADER).unwrap_or_default(),
        cognito_identity_id: identity.cognito_identity_id,
        cognito_identity_pool_id: identity.cognito_identity_pool_id,
        client_context: headers
            .get(CLIENT_CONTEXT_HEADER)
            .map(|value| value.as_bytes().to_vec())
            .unwrap_or_default(),
    })
}

fn header_text(headers: &HeaderMap, request_id: &str, name: &'static str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(text) => Some(text.to_string()),
        Err(_) => {
            tracing::warn!(
                component = "runtime_client",
                event = "header_ignored",
                request_id,
                header = name,
                "header is not visible ascii"
            );
            None
        }
    }
}

fn parse_deadline(request_id: &str, text: &str) -> Deadline {
    match text.trim().parse::<i64>() {
        Ok(millis) => Deadline::from_epoch_millis(millis),
        Err(error) => {
            tracing::warn!(
                component = "runtime_client",
                event = "header_ignored",
                request_id,
                header = DEADLINE_HEADER,
                value = text,
                %error,
                "deadline is not an integer millisecond timestamp"
            );
            Deadline::default()
        }
    }
}

fn parse_cognito_identity(request_id: &str, text: &str) -> CognitoIdentity {
    match serde_json::from_str(text) {
        Ok(identity) => identity,
        Err(error) => {
            tracing::warn!(
                component = "runtime_client",
                event = "header_ignored",
                request_id,
                header = COGNITO_IDENTITY_HEADER,
                %error,
                "cognito identity is not valid json"
            );
            CognitoIdentity::default()
        }
    }
}
