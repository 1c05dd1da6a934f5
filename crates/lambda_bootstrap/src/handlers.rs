//! Built-in handlers selectable from the command line.

use clap::ValueEnum;
use lambda_bootstrap_core::protocol::{InvocationContext, InvokeError};

use crate::adapter::{handler_fn, Handler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HandlerKind {
    /// Return the payload unchanged
    #[default]
    Echo,
    /// ASCII upper-case a UTF-8 payload
    Uppercase,
}

impl HandlerKind {
    pub fn build(self) -> Box<dyn Handler> {
        match self {
            Self::Echo => Box::new(handler_fn(echo)),
            Self::Uppercase => Box::new(handler_fn(uppercase)),
        }
    }
}

pub fn echo(payload: &[u8], _context: &InvocationContext) -> Result<Vec<u8>, InvokeError> {
    Ok(payload.to_vec())
}

pub fn uppercase(payload: &[u8], _context: &InvocationContext) -> Result<Vec<u8>, InvokeError> {
    let text = std::str::from_utf8(payload).map_err(|error| {
        InvokeError::serialization(format!("payload is not valid utf-8: {error}"))
    })?;
    Ok(text.to_ascii_uppercase().into_bytes())
}
