//! Blocking client for the Lambda Runtime API.
//!
//! The client owns one pooled HTTP connection to the control plane and issues
//! the three calls the invocation loop needs (poll next, post response, post
//! error) plus an optional liveness ping. Every call blocks the calling thread.

use std::time::Duration;

use lambda_bootstrap_core::protocol::{Invocation, InvokeError};
use lambda_bootstrap_core::routes::{RuntimeRoutes, FUNCTION_ERROR_TYPE_HEADER};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderValue, CONTENT_TYPE};

use crate::error::ClientError;
use crate::metadata::invocation_from_parts;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The control-plane calls consumed by the invocation loop.
pub trait RuntimeApi {
    /// Blocks until the control plane hands out the next invocation.
    fn next_invocation(&self) -> Result<Invocation, ClientError>;

    fn post_response(&self, request_id: &str, payload: &[u8]) -> Result<(), ClientError>;

    fn post_error(&self, request_id: &str, error: &InvokeError) -> Result<(), ClientError>;
}

impl<T: RuntimeApi + ?Sized> RuntimeApi for &T {
    fn next_invocation(&self) -> Result<Invocation, ClientError> {
        (**self).next_invocation()
    }

    fn post_response(&self, request_id: &str, payload: &[u8]) -> Result<(), ClientError> {
        (**self).post_response(request_id, payload)
    }

    fn post_error(&self, request_id: &str, error: &InvokeError) -> Result<(), ClientError> {
        (**self).post_error(request_id, error)
    }
}

/// HTTP implementation of [`RuntimeApi`].
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    client: Client,
    routes: RuntimeRoutes,
}

impl RuntimeClient {
    /// Create a client for `endpoint` (`host:port`, as in `AWS_LAMBDA_RUNTIME_API`).
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let routes = RuntimeRoutes::new(endpoint).map_err(ClientError::InvalidEndpoint)?;
        Self::with_routes(routes)
    }

    pub fn with_routes(routes: RuntimeRoutes) -> Result<Self, ClientError> {
        // `/next` is a long poll, so reads must never time out.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self { client, routes })
    }

    pub fn routes(&self) -> &RuntimeRoutes {
        &self.routes
    }

    /// Liveness probe; any HTTP answer counts as alive.
    pub fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.get(self.routes.ping()).send()?;
        drain(response);
        Ok(())
    }
}

impl RuntimeApi for RuntimeClient {
    fn next_invocation(&self) -> Result<Invocation, ClientError> {
        let route = self.routes.next_invocation();
        let response = self.client.get(&route).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected_status(route, response));
        }

        let headers = response.headers().clone();
        let payload = response.bytes()?.to_vec();
        invocation_from_parts(&headers, payload)
    }

    fn post_response(&self, request_id: &str, payload: &[u8]) -> Result<(), ClientError> {
        let route = self
            .routes
            .invocation_response(request_id)
            .map_err(ClientError::InvalidRequestId)?;
        let response = self
            .client
            .post(&route)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec())
            .send()?;
        accept(route, response)
    }

    fn post_error(&self, request_id: &str, error: &InvokeError) -> Result<(), ClientError> {
        let route = self
            .routes
            .invocation_error(request_id)
            .map_err(ClientError::InvalidRequestId)?;
        let body = error.to_envelope()?;

        let mut request = self
            .client
            .post(&route)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        // Handler-supplied types are not guaranteed to be valid header text.
        if let Ok(error_type) = HeaderValue::from_str(&error.error_type) {
            request = request.header(FUNCTION_ERROR_TYPE_HEADER, error_type);
        }

        let response = request.send()?;
        accept(route, response)
    }
}

fn accept(route: String, response: Response) -> Result<(), ClientError> {
    if response.status().is_success() {
        drain(response);
        Ok(())
    } else {
        Err(unexpected_status(route, response))
    }
}

fn unexpected_status(route: String, response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    ClientError::UnexpectedStatus {
        route,
        status,
        body,
    }
}

/// Reads the body to the end so the pooled connection can be reused.
fn drain(response: Response) {
    let _ = response.bytes();
}
