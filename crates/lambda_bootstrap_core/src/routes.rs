pub const RUNTIME_API_VERSION: &str = "2018-06-01";

pub const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
pub const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
pub const FUNCTION_ARN_HEADER: &str = "Lambda-Runtime-Invoked-Function-Arn";
pub const TRACE_ID_HEADER: &str = "Lambda-Runtime-Trace-Id";
pub const CLIENT_CONTEXT_HEADER: &str = "Lambda-Runtime-Client-Context";
pub const COGNITO_IDENTITY_HEADER: &str = "Lambda-Runtime-Cognito-Identity";
pub const FUNCTION_ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    message: String,
}

impl RouteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RouteError {}

/// Runtime API URLs rooted at one control-plane endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRoutes {
    base_url: String,
}

impl RuntimeRoutes {
    /// Accepts `host:port` (as found in `AWS_LAMBDA_RUNTIME_API`) or a full
    /// `http://` / `https://` base URL.
    pub fn new(endpoint: &str) -> Result<Self, RouteError> {
        let trimmed = endpoint.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RouteError::new("runtime api endpoint cannot be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(RouteError::new(format!(
                "runtime api endpoint '{trimmed}' cannot contain whitespace"
            )));
        }

        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn next_invocation(&self) -> String {
        format!(
            "{}/{RUNTIME_API_VERSION}/runtime/invocation/next",
            self.base_url
        )
    }

    pub fn invocation_response(&self, request_id: &str) -> Result<String, RouteError> {
        self.invocation_route(request_id, "response")
    }

    pub fn invocation_error(&self, request_id: &str) -> Result<String, RouteError> {
        self.invocation_route(request_id, "error")
    }

    pub fn ping(&self) -> String {
        format!("{}/{RUNTIME_API_VERSION}/ping", self.base_url)
    }

    fn invocation_route(&self, request_id: &str, action: &str) -> Result<String, RouteError> {
        validate_request_id(request_id)?;
        Ok(format!(
            "{}/{RUNTIME_API_VERSION}/runtime/invocation/{request_id}/{action}",
            self.base_url
        ))
    }
}

/// Request ids are placed verbatim in a path segment.
pub fn validate_request_id(request_id: &str) -> Result<(), RouteError> {
    if request_id.is_empty() {
        return Err(RouteError::new("request id cannot be empty"));
    }
    if let Some(invalid) = request_id
        .chars()
        .find(|ch| matches!(ch, '/' | '?' | '#' | '%') || ch.is_whitespace() || ch.is_control())
    {
        return Err(RouteError::new(format!(
            "request id '{}' contains invalid character {invalid:?}",
            request_id.escape_debug()
        )));
    }
    Ok(())
}
