//! The handler capability and the boundary that contains its failures.
//!
//! A handler turns raw payload bytes into raw result bytes or an
//! [`InvokeError`]. Typed signatures are composed once at wiring time with
//! [`handler_fn`] or [`json_handler`]; the loop only ever sees [`Handler`].

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use lambda_bootstrap_core::protocol::{Invocation, InvocationContext, InvokeError, Outcome};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait Handler {
    fn invoke(
        &mut self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<Vec<u8>, InvokeError>;
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn invoke(
        &mut self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<Vec<u8>, InvokeError> {
        (**self).invoke(payload, context)
    }
}

/// Handler backed by a closure over raw bytes.
#[derive(Debug, Clone)]
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: FnMut(&[u8], &InvocationContext) -> Result<Vec<u8>, InvokeError>,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: FnMut(&[u8], &InvocationContext) -> Result<Vec<u8>, InvokeError>,
{
    fn invoke(
        &mut self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<Vec<u8>, InvokeError> {
        (self.f)(payload, context)
    }
}

/// Handler that decodes the payload as JSON `I` and encodes the result `O`.
pub struct JsonHandler<F, I, O, E> {
    f: F,
    _marker: PhantomData<fn(I) -> Result<O, E>>,
}

pub fn json_handler<F, I, O, E>(f: F) -> JsonHandler<F, I, O, E>
where
    F: FnMut(I, &InvocationContext) -> Result<O, E>,
    I: DeserializeOwned,
    O: Serialize,
    E: Into<InvokeError>,
{
    JsonHandler {
        f,
        _marker: PhantomData,
    }
}

impl<F, I, O, E> Handler for JsonHandler<F, I, O, E>
where
    F: FnMut(I, &InvocationContext) -> Result<O, E>,
    I: DeserializeOwned,
    O: Serialize,
    E: Into<InvokeError>,
{
    fn invoke(
        &mut self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<Vec<u8>, InvokeError> {
        let input: I = serde_json::from_slice(payload).map_err(|error| {
            InvokeError::serialization(format!("failed to decode payload: {error}"))
        })?;
        let output = (self.f)(input, context).map_err(Into::into)?;
        serde_json::to_vec(&output).map_err(|error| {
            InvokeError::serialization(format!("failed to encode result: {error}"))
        })
    }
}

/// Runs one invocation through `handler`, always producing exactly one outcome.
///
/// Returned errors and panics both become [`Outcome::Failure`]; a panic only
/// requests process exit when `exit_on_panic` is set.
pub fn invoke_handler<H: Handler + ?Sized>(
    handler: &mut H,
    invocation: &Invocation,
    exit_on_panic: bool,
) -> Outcome {
    let context = invocation.context();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.invoke(&invocation.payload, &context)
    }));

    match result {
        Ok(Ok(payload)) => Outcome::Success(payload),
        Ok(Err(error)) => Outcome::Failure(error.normalized()),
        Err(panic_payload) => {
            let mut error = InvokeError::panic(panic_message(panic_payload.as_ref()));
            error.should_exit = exit_on_panic;
            Outcome::Failure(error.normalized())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use lambda_bootstrap_core::protocol::{
        HANDLER_ERROR_TYPE, HANDLER_PANIC_ERROR_TYPE, SERIALIZATION_ERROR_TYPE,
    };
    use serde::Deserialize;

    use super::*;

    fn invocation(payload: &[u8]) -> Invocation {
        Invocation {
            request_id: "abc-123".to_string(),
            payload: payload.to_vec(),
            ..Invocation::default()
        }
    }

    #[test]
    fn closure_handler_sees_payload_and_context() {
        let mut handler = handler_fn(|payload: &[u8], context: &InvocationContext| {
            let mut out = context.request_id.as_bytes().to_vec();
            out.extend_from_slice(payload);
            Ok(out)
        });

        let outcome = invoke_handler(&mut handler, &invocation(b":hi"), false);
        assert_eq!(outcome, Outcome::Success(b"abc-123:hi".to_vec()));
    }

    #[test]
    fn returned_error_is_normalized() {
        let mut handler = handler_fn(|_: &[u8], _: &InvocationContext| {
            Err(InvokeError::new("", "boom"))
        });

        let Outcome::Failure(error) = invoke_handler(&mut handler, &invocation(b""), false) else {
            panic!("expected failure");
        };
        assert_eq!(error.message, "boom");
        assert_eq!(error.error_type, HANDLER_ERROR_TYPE);
        assert!(!error.should_exit);
    }

    #[test]
    fn panic_is_contained_and_reported() {
        let mut handler = handler_fn(|_: &[u8], _: &InvocationContext| -> Result<Vec<u8>, InvokeError> {
            panic!("handler exploded")
        });

        let Outcome::Failure(error) = invoke_handler(&mut handler, &invocation(b""), false) else {
            panic!("expected failure");
        };
        assert_eq!(error.error_type, HANDLER_PANIC_ERROR_TYPE);
        assert_eq!(error.message, "handler exploded");
        assert!(!error.should_exit);
    }

    #[test]
    fn panic_requests_exit_when_configured() {
        let mut handler = handler_fn(|_: &[u8], _: &InvocationContext| -> Result<Vec<u8>, InvokeError> {
            panic!("{}", String::from("formatted panic"))
        });

        let outcome = invoke_handler(&mut handler, &invocation(b""), true);
        assert!(outcome.should_exit());
    }

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    #[derive(Serialize)]
    struct Reply {
        message: String,
    }

    #[test]
    fn json_handler_round_trips_typed_values() {
        let mut handler = json_handler(|input: Greeting, _: &InvocationContext| {
            Ok::<_, InvokeError>(Reply {
                message: format!("hello {}", input.name),
            })
        });

        let outcome = invoke_handler(&mut handler, &invocation(br#"{"name":"ada"}"#), false);
        assert_eq!(
            outcome,
            Outcome::Success(br#"{"message":"hello ada"}"#.to_vec())
        );
    }

    #[test]
    fn json_handler_reports_decode_failure_as_serialization_error() {
        let mut handler = json_handler(|input: Greeting, _: &InvocationContext| {
            Ok::<_, InvokeError>(Reply {
                message: input.name,
            })
        });

        let Outcome::Failure(error) = invoke_handler(&mut handler, &invocation(b"not json"), false)
        else {
            panic!("expected failure");
        };
        assert_eq!(error.error_type, SERIALIZATION_ERROR_TYPE);
        assert!(error.message.starts_with("failed to decode payload"));
    }

    #[test]
    fn boxed_handlers_dispatch_dynamically() {
        let mut handler: Box<dyn Handler> =
            Box::new(handler_fn(|payload: &[u8], _: &InvocationContext| Ok(payload.to_vec())));

        let outcome = invoke_handler(&mut handler, &invocation(b"same"), false);
        assert_eq!(outcome, Outcome::Success(b"same".to_vec()));
    }
}
