//! Bridge between an interactive 3D editor and out-of-process geometry plugins
//!
//! This crate provides two independent utilities for editor tooling. Mesh
//! sessions ([`MeshSession`]) marshal a mesh's vertex and triangle buffers
//! into plain numeric arrays and back, bracketing the exchange with editor
//! mode switches. The call forwarder ([`Library`]) runs plugin functions in
//! a fresh worker process per call, so rebuilt plugin binaries are picked up
//! without restarting the editor.

pub mod forwarder;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod value;
pub mod worker;

// Re-export commonly used types
pub use forwarder::{
    ForwarderConfig, InvokeError, Library, DEFAULT_RESPONSE_TIMEOUT, LIBRARY_PATH_ENV,
};
pub use host::{EditorHost, EditorMode, MemoryHost, MeshId, ObjectId, ObjectKind};
pub use protocol::{
    CallOutcome, CallProtocol, CallRequest, FailureKind, MessageType, ProtocolError, RemoteFailure,
    WireFormat, WireMessage, CALL_PROTOCOL_VERSION, DEFAULT_MAX_MESSAGE_SIZE,
};
pub use registry::{Args, CallError, EntryPoint, Registry, RegistryError};
pub use session::{scope, scope_active, MeshSession, SessionError};
pub use value::{Matrix, Value};
pub use worker::{serve, serve_connection, ServeError};
