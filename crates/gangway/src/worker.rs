//! One-shot serve loop run inside a plugin worker process
//!
//! The forwarder spawns a fresh worker per call, so serving is a single
//! read-dispatch-write exchange. Stdout belongs to the wire protocol;
//! workers log to stderr only. Entry point failures and panics are caught
//! and reported as structured [`CallOutcome::Failure`] responses so the
//! caller never has to parse a crash out of a broken pipe.

use crate::protocol::{
    CallOutcome, CallProtocol, CallRequest, FailureKind, MessageType, ProtocolError, RemoteFailure,
};
use crate::registry::{Args, CallError, Registry};
use std::any::Any;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while serving a call
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Expected a call request, got {0:?}")]
    UnexpectedMessage(MessageType),
}

/// Serve one call over stdin and stdout, then return
pub fn serve(registry: &Registry) -> Result<(), ServeError> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_connection(registry, &mut stdin.lock(), &mut stdout.lock())
}

/// Serve one call over an arbitrary reader and writer pair
///
/// Split out from [`serve`] so the exchange can be tested against in-memory
/// buffers without spawning a process.
pub fn serve_connection<R: Read, W: Write>(
    registry: &Registry,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), ServeError> {
    let protocol = CallProtocol::default();

    let message = protocol.read_message(reader)?;
    if message.kind != MessageType::Request {
        return Err(ServeError::UnexpectedMessage(message.kind));
    }
    let request = protocol.deserialize_request(&message.payload)?;
    info!(
        "Serving {}.{} with {} args",
        request.library,
        request.function,
        request.args.len()
    );

    let outcome = dispatch(registry, &request);
    let response = protocol.serialize_outcome(&outcome)?;
    protocol.write_message(writer, &response)?;

    debug!("Response written, worker done");
    Ok(())
}

/// Run one request against the registry, mapping every failure mode to an
/// outcome that can travel back over the pipe
fn dispatch(registry: &Registry, request: &CallRequest) -> CallOutcome {
    if request.library != registry.library() {
        warn!(
            "Library mismatch: serving '{}', request names '{}'",
            registry.library(),
            request.library
        );
        return CallOutcome::Failure(RemoteFailure::new(
            FailureKind::LibraryMismatch,
            format!(
                "this worker serves '{}', not '{}'",
                registry.library(),
                request.library
            ),
        ));
    }

    let entry = match registry.resolve(&request.function) {
        Some(entry) => entry,
        None => {
            warn!("Unknown function '{}'", request.function);
            return CallOutcome::Failure(
                RemoteFailure::new(
                    FailureKind::UnknownFunction,
                    format!(
                        "no function '{}' in library '{}'",
                        request.function, request.library
                    ),
                )
                .with_available(registry.function_names()),
            );
        }
    };

    let args = Args::new(&request.args);
    match panic::catch_unwind(AssertUnwindSafe(|| entry(&args))) {
        Ok(Ok(value)) => CallOutcome::Success(value),
        Ok(Err(err)) => {
            let kind = match err {
                CallError::WrongArgumentCount { .. } | CallError::BadArgument { .. } => {
                    FailureKind::BadArguments
                }
                CallError::Failed(_) => FailureKind::Failed,
            };
            warn!("Entry point {} failed: {}", request.function, err);
            CallOutcome::Failure(RemoteFailure::new(kind, err.to_string()))
        }
        Err(payload) => {
            let message = format!(
                "entry point '{}' panicked: {}",
                request.function,
                panic_message(payload.as_ref())
            );
            warn!("{}", message);
            CallOutcome::Failure(RemoteFailure::new(FailureKind::Panicked, message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::io::Cursor;

    fn test_registry() -> Registry {
        let mut registry = Registry::new("testlib").unwrap();
        registry
            .register("add", |args: &Args<'_>| {
                args.expect_len(2)?;
                Ok(Value::Int(args.int(0)? + args.int(1)?))
            })
            .unwrap();
        registry
            .register("boom", |_args: &Args<'_>| panic!("kaboom"))
            .unwrap();
        registry
    }

    /// Run one request through serve_connection over in-memory buffers
    fn exchange(registry: &Registry, request: &CallRequest) -> CallOutcome {
        let protocol = CallProtocol::default();
        let message = protocol.serialize_request(request).unwrap();
        let mut input = Vec::new();
        protocol.write_message(&mut input, &message).unwrap();

        let mut output = Vec::new();
        serve_connection(registry, &mut Cursor::new(input), &mut output).unwrap();

        let response = protocol.read_message(&mut Cursor::new(output)).unwrap();
        assert_eq!(response.kind, MessageType::Response);
        protocol.deserialize_outcome(&response.payload).unwrap()
    }

    #[test]
    fn test_serves_a_successful_call() {
        let registry = test_registry();
        let request = CallRequest::new("testlib", "add", vec![Value::Int(2), Value::Int(3)]);
        match exchange(&registry, &request) {
            CallOutcome::Success(value) => assert_eq!(value, Value::Int(5)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function_reports_available_names() {
        let registry = test_registry();
        let request = CallRequest::new("testlib", "mul", vec![]);
        match exchange(&registry, &request) {
            CallOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::UnknownFunction);
                assert_eq!(failure.available, vec!["add", "boom"]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_library_mismatch_is_refused() {
        let registry = test_registry();
        let request = CallRequest::new("otherlib", "add", vec![Value::Int(1), Value::Int(2)]);
        match exchange(&registry, &request) {
            CallOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::LibraryMismatch);
                assert!(failure.message.contains("testlib"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_bad_arguments_are_reported() {
        let registry = test_registry();
        let request = CallRequest::new("testlib", "add", vec![Value::Int(2)]);
        match exchange(&registry, &request) {
            CallOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::BadArguments);
                assert!(failure.message.contains("2 arguments"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_panics_become_failure_outcomes() {
        let registry = test_registry();
        let request = CallRequest::new("testlib", "boom", vec![]);
        match exchange(&registry, &request) {
            CallOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Panicked);
                assert!(failure.message.contains("kaboom"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_non_request_frame_is_rejected() {
        let registry = test_registry();
        let protocol = CallProtocol::default();
        let message = protocol
            .serialize_outcome(&CallOutcome::Success(Value::Bool(true)))
            .unwrap();
        let mut input = Vec::new();
        protocol.write_message(&mut input, &message).unwrap();

        let mut output = Vec::new();
        let err = serve_connection(&registry, &mut Cursor::new(input), &mut output)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ServeError::UnexpectedMessage(MessageType::Response)
        ));
        assert!(output.is_empty());
    }
}
