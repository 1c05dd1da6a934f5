use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const HANDLER_ERROR_TYPE: &str = "HandlerError";
pub const SERIALIZATION_ERROR_TYPE: &str = "SerializationError";
pub const HANDLER_PANIC_ERROR_TYPE: &str = "Runtime.HandlerPanic";
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Absolute invocation deadline as an epoch timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deadline {
    pub seconds: i64,
    pub nanos: i64,
}

impl Deadline {
    pub fn from_epoch_millis(millis: i64) -> Self {
        Self {
            seconds: millis.div_euclid(1_000),
            nanos: millis.rem_euclid(1_000) * 1_000_000,
        }
    }

    pub fn epoch_millis(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000)
            .saturating_add(self.nanos / 1_000_000)
    }

    /// A zero deadline means the control plane did not send one.
    pub fn is_unset(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanos).ok()?;
        Utc.timestamp_opt(self.seconds, nanos).single()
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_unset() {
            return Duration::ZERO;
        }
        self.to_datetime()
            .and_then(|deadline| (deadline - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// One unit of work delivered by the control plane.
///
/// The same record is used by the HTTP polling encoding (built from response
/// headers) and by the local call encoding (serialized as-is).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "Payload", with = "base64_bytes", default)]
    pub payload: Vec<u8>,
    #[serde(rename = "Deadline", default)]
    pub deadline: Deadline,
    #[serde(rename = "InvokedFunctionArn", default)]
    pub invoked_function_arn: String,
    #[serde(rename = "XAmznTraceId", default)]
    pub trace_id: String,
    #[serde(rename = "CognitoIdentityId", default)]
    pub cognito_identity_id: String,
    #[serde(rename = "CognitoIdentityPoolId", default)]
    pub cognito_identity_pool_id: String,
    #[serde(rename = "ClientContext", with = "base64_bytes", default)]
    pub client_context: Vec<u8>,
}

impl Invocation {
    pub fn context(&self) -> InvocationContext {
        InvocationContext {
            request_id: self.request_id.clone(),
            deadline: self.deadline,
            invoked_function_arn: self.invoked_function_arn.clone(),
            trace_id: self.trace_id.clone(),
            cognito_identity_id: self.cognito_identity_id.clone(),
            cognito_identity_pool_id: self.cognito_identity_pool_id.clone(),
            client_context: self.client_context.clone(),
        }
    }
}

/// Handler-facing metadata derived from an [`Invocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub deadline: Deadline,
    pub invoked_function_arn: String,
    pub trace_id: String,
    pub cognito_identity_id: String,
    pub cognito_identity_pool_id: String,
    pub client_context: Vec<u8>,
}

impl InvocationContext {
    /// Time left before the deadline; zero once it has passed or when unknown.
    pub fn remaining_time(&self) -> Duration {
        self.deadline.remaining_at(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub path: String,
    pub line: i32,
    pub label: String,
}

/// Structured handler failure, serialized as the Runtime API error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeError {
    #[serde(rename = "errorMessage")]
    pub message: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "stackTrace", default, skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<StackFrame>,
    #[serde(skip)]
    pub should_exit: bool,
}

impl InvokeError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            stack_trace: Vec::new(),
            should_exit: false,
        }
    }

    /// Builds an error typed after the Rust type of `error`.
    pub fn from_error<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(SERIALIZATION_ERROR_TYPE, message)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(HANDLER_PANIC_ERROR_TYPE, message)
    }

    pub fn with_frame(mut self, path: impl Into<String>, line: i32, label: impl Into<String>) -> Self {
        self.stack_trace.push(StackFrame {
            path: path.into(),
            line,
            label: label.into(),
        });
        self
    }

    /// Appends the location of the caller as a stack frame.
    #[track_caller]
    pub fn with_caller_frame(self, label: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        let line = i32::try_from(location.line()).unwrap_or(i32::MAX);
        self.with_frame(location.file(), line, label)
    }

    pub fn exiting(mut self) -> Self {
        self.should_exit = true;
        self
    }

    /// Guarantees a non-empty message and type before the error is reported.
    pub fn normalized(mut self) -> Self {
        let untyped = self.error_type.trim().is_empty();
        if self.message.trim().is_empty() {
            self.message = if untyped {
                UNKNOWN_ERROR_MESSAGE.to_string()
            } else {
                self.error_type.clone()
            };
        }
        if untyped {
            self.error_type = HANDLER_ERROR_TYPE.to_string();
        }
        self
    }

    /// JSON envelope posted to the `/error` route.
    pub fn to_envelope(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for InvokeError {}

impl From<String> for InvokeError {
    fn from(message: String) -> Self {
        Self::new(HANDLER_ERROR_TYPE, message)
    }
}

impl From<&str> for InvokeError {
    fn from(message: &str) -> Self {
        Self::new(HANDLER_ERROR_TYPE, message)
    }
}

impl From<serde_json::Error> for InvokeError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}

/// The single value produced for every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Vec<u8>),
    Failure(InvokeError),
}

impl Outcome {
    pub fn should_exit(&self) -> bool {
        matches!(self, Self::Failure(error) if error.should_exit)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Reply record of the local call encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    #[serde(rename = "Payload", with = "base64_bytes", default)]
    pub payload: Vec<u8>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvokeError>,
}

impl InvokeResponse {
    pub fn into_outcome(self) -> Outcome {
        match self.error {
            Some(error) => Outcome::Failure(error),
            None => Outcome::Success(self.payload),
        }
    }
}

impl From<Outcome> for InvokeResponse {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(payload) => Self {
                payload,
                error: None,
            },
            Outcome::Failure(error) => Self {
                payload: Vec::new(),
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {}

/// Request side of the local call encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum LocalCall {
    #[serde(rename = "Function.Ping")]
    Ping(PingRequest),
    #[serde(rename = "Function.Invoke")]
    Invoke(Invocation),
}

/// Reply side of the local call encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "result")]
pub enum LocalReply {
    #[serde(rename = "Function.Ping")]
    Ping(PingResponse),
    #[serde(rename = "Function.Invoke")]
    Invoke(InvokeResponse),
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim_start_matches("dyn ")
        .to_string()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
