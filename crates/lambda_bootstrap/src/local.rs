//! Local call encoding: the same records as the HTTP protocol, exchanged as
//! length-prefixed JSON frames over any byte stream.
//!
//! Each frame is a 4-byte big-endian length followed by one JSON document.
//! Requests are [`LocalCall`] values, replies are [`LocalReply`] values.

use std::io::{self, Read, Write};

use lambda_bootstrap_core::protocol::{
    Invocation, InvokeError, InvokeResponse, LocalCall, LocalReply, Outcome, PingRequest,
    PingResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::adapter::{invoke_handler, Handler};

/// 6 MiB payload ceiling after base64 expansion, plus room for metadata.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024 + 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("local channel io failure: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    TooLarge { len: usize },

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("peer closed the channel before replying")]
    Closed,

    #[error("reply does not match the call: expected {expected}")]
    MismatchedReply { expected: &'static str },
}

/// Reads one frame; `Ok(None)` means the peer closed the stream between frames.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, FrameError> {
    match read_frame_bytes(reader)? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}

/// Reads the body of one frame without decoding it. The stream stays in sync
/// after a successful read even if the body turns out to be malformed.
pub fn read_frame_bytes<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), FrameError> {
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len: body.len() });
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeExit {
    EndOfInput,
    HandlerRequestedExit { request_id: String },
}

/// Serves `Function.Ping` and `Function.Invoke` calls against one handler.
pub struct LocalServer<H> {
    handler: H,
    exit_on_panic: bool,
}

impl<H: Handler> LocalServer<H> {
    pub fn new(handler: H, exit_on_panic: bool) -> Self {
        Self {
            handler,
            exit_on_panic,
        }
    }

    /// Answers one call. The flag is set when the server must stop after
    /// sending the reply.
    pub fn handle_call(&mut self, call: LocalCall) -> (LocalReply, bool) {
        match call {
            LocalCall::Ping(PingRequest {}) => (LocalReply::Ping(PingResponse {}), false),
            LocalCall::Invoke(invocation) => {
                let outcome = invoke_handler(&mut self.handler, &invocation, self.exit_on_panic);
                log_outcome(&invocation, &outcome);
                let should_exit = outcome.should_exit();
                (LocalReply::Invoke(InvokeResponse::from(outcome)), should_exit)
            }
        }
    }

    pub fn serve<R: Read, W: Write>(
        &mut self,
        mut reader: R,
        mut writer: W,
    ) -> Result<ServeExit, FrameError> {
        while let Some(body) = read_frame_bytes(&mut reader)? {
            let call = match serde_json::from_slice::<LocalCall>(&body) {
                Ok(call) => call,
                Err(error) => {
                    if let Some(reply) = undecodable_call_reply(&body, &error) {
                        write_frame(&mut writer, &reply)?;
                    }
                    continue;
                }
            };
            let request_id = match &call {
                LocalCall::Invoke(invocation) => Some(invocation.request_id.clone()),
                LocalCall::Ping(_) => None,
            };

            let (reply, stop) = self.handle_call(call);
            write_frame(&mut writer, &reply)?;

            if stop {
                return Ok(ServeExit::HandlerRequestedExit {
                    request_id: request_id.unwrap_or_default(),
                });
            }
        }
        Ok(ServeExit::EndOfInput)
    }
}

/// Caller side of the local call encoding.
pub struct LocalClient<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> LocalClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn ping(&mut self) -> Result<(), FrameError> {
        match self.call(&LocalCall::Ping(PingRequest {}))? {
            LocalReply::Ping(PingResponse {}) => Ok(()),
            LocalReply::Invoke(_) => Err(FrameError::MismatchedReply {
                expected: "Function.Ping",
            }),
        }
    }

    pub fn invoke(&mut self, invocation: Invocation) -> Result<Outcome, FrameError> {
        match self.call(&LocalCall::Invoke(invocation))? {
            LocalReply::Invoke(response) => Ok(response.into_outcome()),
            LocalReply::Ping(_) => Err(FrameError::MismatchedReply {
                expected: "Function.Invoke",
            }),
        }
    }

    fn call(&mut self, call: &LocalCall) -> Result<LocalReply, FrameError> {
        write_frame(&mut self.writer, call)?;
        read_frame(&mut self.reader)?.ok_or(FrameError::Closed)
    }
}

/// A complete frame that does not decode as a call. Invokes whose request id
/// can still be read get a `SerializationError` reply; anything else is logged
/// and skipped.
fn undecodable_call_reply(body: &[u8], error: &serde_json::Error) -> Option<LocalReply> {
    let request_id = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .filter(|call| call["method"] == "Function.Invoke")
        .and_then(|call| call["params"]["RequestId"].as_str().map(str::to_string));

    tracing::error!(
        component = "local_channel",
        event = "protocol_error",
        request_id = request_id.as_deref().unwrap_or_default(),
        frame_bytes = body.len(),
        %error,
        "call frame could not be decoded"
    );

    request_id.map(|_| {
        let error = InvokeError::serialization(format!("failed to decode invocation: {error}"));
        LocalReply::Invoke(InvokeResponse::from(Outcome::Failure(error)))
    })
}

fn log_outcome(invocation: &Invocation, outcome: &Outcome) {
    match outcome {
        Outcome::Success(payload) => tracing::info!(
            component = "local_channel",
            event = "invocation_succeeded",
            request_id = %invocation.request_id,
            result_bytes = payload.len(),
            "handler succeeded"
        ),
        Outcome::Failure(error) => tracing::error!(
            component = "local_channel",
            event = "invocation_failed",
            request_id = %invocation.request_id,
            error_type = %error.error_type,
            error_message = %error.message,
            should_exit = error.should_exit,
            "handler failed"
        ),
    }
}
