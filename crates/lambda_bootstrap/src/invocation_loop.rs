//! The poll → invoke → report driver.
//!
//! One invocation is processed at a time, in poll order, on the calling
//! thread. The loop cycles `WaitNext → Invoking → Reporting → WaitNext` and
//! only reaches `Terminated` on a fatal client failure, an outcome with
//! `should_exit` set (after it has been reported), or the optional
//! invocation limit.

use std::time::Duration;

use lambda_bootstrap_core::protocol::{Invocation, Outcome};
use lambda_bootstrap_core::retry::{Backoff, RetryPolicy};

use crate::adapter::{invoke_handler, Handler};
use crate::client::RuntimeApi;
use crate::error::{ClientError, ErrorKind, LoopError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopConfig {
    pub retry: RetryPolicy,
    pub exit_on_panic: bool,
    pub max_invocations: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    WaitNext,
    Invoking,
    Reporting,
    Terminated,
}

/// Why the loop stopped without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    HandlerRequestedExit { request_id: String },
    InvocationLimitReached { invocations: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejected_reports: u64,
    pub protocol_errors: u64,
    pub poll_retries: u64,
}

pub struct InvocationLoop<A, H> {
    api: A,
    handler: H,
    config: LoopConfig,
    state: LoopState,
    stats: LoopStats,
    protocol_streak: u32,
    sleep: Box<dyn FnMut(Duration)>,
}

impl<A: RuntimeApi, H: Handler> InvocationLoop<A, H> {
    pub fn new(api: A, handler: H, config: LoopConfig) -> Self {
        Self {
            api,
            handler,
            config,
            state: LoopState::WaitNext,
            stats: LoopStats::default(),
            protocol_streak: 0,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the blocking sleep used between poll retries.
    pub fn with_sleeper(mut self, sleep: impl FnMut(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Runs cycles until the loop terminates.
    pub fn run(&mut self) -> Result<LoopExit, LoopError> {
        let result = self.run_cycles();
        self.state = LoopState::Terminated;

        let stats = self.stats;
        match &result {
            Ok(exit) => tracing::info!(
                component = "invocation_loop",
                event = "runtime_stopped",
                reason = ?exit,
                invocations = stats.invocations,
                successes = stats.successes,
                failures = stats.failures,
                rejected_reports = stats.rejected_reports,
                protocol_errors = stats.protocol_errors,
                poll_retries = stats.poll_retries,
                "invocation loop stopped"
            ),
            Err(error) => tracing::error!(
                component = "invocation_loop",
                event = "runtime_stopped",
                %error,
                invocations = stats.invocations,
                successes = stats.successes,
                failures = stats.failures,
                rejected_reports = stats.rejected_reports,
                protocol_errors = stats.protocol_errors,
                poll_retries = stats.poll_retries,
                "invocation loop stopped on a fatal error"
            ),
        }
        result
    }

    fn run_cycles(&mut self) -> Result<LoopExit, LoopError> {
        let mut backoff = Backoff::new(self.config.retry);

        loop {
            if let Some(limit) = self.config.max_invocations {
                if self.stats.invocations >= limit {
                    return Ok(LoopExit::InvocationLimitReached {
                        invocations: self.stats.invocations,
                    });
                }
            }

            self.state = LoopState::WaitNext;
            let Some(invocation) = self.poll(&mut backoff)? else {
                continue;
            };

            self.state = LoopState::Invoking;
            let request_id = invocation.request_id.clone();
            tracing::info!(
                component = "invocation_loop",
                event = "invocation_received",
                request_id = %request_id,
                payload_bytes = invocation.payload.len(),
                deadline_ms = invocation.deadline.epoch_millis(),
                function_arn = %invocation.invoked_function_arn,
                trace_id = %invocation.trace_id,
                "invocation received"
            );
            let outcome = self.invoke(&invocation);
            drop(invocation);

            self.state = LoopState::Reporting;
            let should_exit = outcome.should_exit();
            self.report(&request_id, outcome)?;

            if should_exit {
                return Ok(LoopExit::HandlerRequestedExit { request_id });
            }
        }
    }

    /// `Ok(None)` abandons the cycle after a protocol error.
    fn poll(&mut self, backoff: &mut Backoff) -> Result<Option<Invocation>, LoopError> {
        match self.api.next_invocation() {
            Ok(invocation) => {
                backoff.reset();
                self.protocol_streak = 0;
                Ok(Some(invocation))
            }
            Err(error) if error.kind() == ErrorKind::Protocol => {
                self.stats.protocol_errors += 1;
                self.protocol_streak = self.protocol_streak.saturating_add(1);
                tracing::error!(
                    component = "invocation_loop",
                    event = "protocol_error",
                    %error,
                    consecutive = self.protocol_streak,
                    "poll response unusable; cycle abandoned without a report"
                );
                // Repeated unusable answers are paced but never fatal.
                if self.protocol_streak > 1 {
                    (self.sleep)(self.config.retry.pause_for(self.protocol_streak - 1));
                }
                Ok(None)
            }
            Err(error) => match backoff.next_delay() {
                Some(delay) => {
                    self.stats.poll_retries += 1;
                    tracing::warn!(
                        component = "invocation_loop",
                        event = "poll_retry",
                        %error,
                        attempt = backoff.failures(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "poll failed; retrying"
                    );
                    (self.sleep)(delay);
                    Ok(None)
                }
                None => Err(LoopError::Poll {
                    attempts: backoff.failures(),
                    source: error,
                }),
            },
        }
    }

    fn invoke(&mut self, invocation: &Invocation) -> Outcome {
        let outcome = invoke_handler(&mut self.handler, invocation, self.config.exit_on_panic);
        self.stats.invocations += 1;

        match &outcome {
            Outcome::Success(payload) => {
                self.stats.successes += 1;
                tracing::info!(
                    component = "invocation_loop",
                    event = "invocation_succeeded",
                    request_id = %invocation.request_id,
                    result_bytes = payload.len(),
                    "handler succeeded"
                );
            }
            Outcome::Failure(error) => {
                self.stats.failures += 1;
                tracing::error!(
                    component = "invocation_loop",
                    event = "invocation_failed",
                    request_id = %invocation.request_id,
                    error_type = %error.error_type,
                    error_message = %error.message,
                    should_exit = error.should_exit,
                    "handler failed"
                );
            }
        }
        outcome
    }

    fn report(&mut self, request_id: &str, outcome: Outcome) -> Result<(), LoopError> {
        let result = match &outcome {
            Outcome::Success(payload) => self.api.post_response(request_id, payload),
            Outcome::Failure(error) => self.api.post_error(request_id, error),
        };

        match result {
            Ok(()) => Ok(()),
            Err(error) if error.is_connection_failure() => Err(LoopError::Report {
                request_id: request_id.to_string(),
                source: error,
            }),
            Err(error) => {
                self.stats.rejected_reports += 1;
                log_rejected_report(request_id, &error);
                Ok(())
            }
        }
    }
}

/// The control plane owns retry semantics, so a rejected report is not fatal.
fn log_rejected_report(request_id: &str, error: &ClientError) {
    tracing::warn!(
        component = "invocation_loop",
        event = "report_rejected",
        request_id,
        %error,
        "control plane did not accept the report"
    );
}
