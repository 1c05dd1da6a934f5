//! Error types for the runtime client and the invocation loop.

use lambda_bootstrap_core::routes::RouteError;
use thiserror::Error;

/// Failures talking to the Runtime API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("runtime api transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("runtime api returned status {status} for {route}: {body}")]
    UnexpectedStatus {
        route: String,
        status: u16,
        body: String,
    },

    #[error("runtime api response is missing required header {0}")]
    MissingHeader(&'static str),

    #[error("invalid request id: {0}")]
    InvalidRequestId(RouteError),

    #[error("invalid runtime api endpoint: {0}")]
    InvalidEndpoint(RouteError),

    #[error("failed to encode error envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Coarse classification used by the invocation loop's failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Endpoint unreachable, connection reset, or a non-success status.
    Transport,
    /// The control plane answered, but without usable metadata.
    Protocol,
    /// Local failure preparing a request.
    Local,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::UnexpectedStatus { .. } => ErrorKind::Transport,
            Self::MissingHeader(_) | Self::InvalidRequestId(_) => ErrorKind::Protocol,
            Self::InvalidEndpoint(_) | Self::Encode(_) => ErrorKind::Local,
        }
    }

    /// Connection-level failure, as opposed to an answer the loop can act on.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Fatal conditions that move the invocation loop to its terminal state.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("polling the runtime api failed after {attempts} attempt(s): {source}")]
    Poll {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("reporting the outcome of invocation {request_id} failed: {source}")]
    Report {
        request_id: String,
        #[source]
        source: ClientError,
    },
}
