//! Wire protocol for forwarded plugin calls
//!
//! This module defines the framing used between the forwarder and a plugin
//! worker process. A worker serves exactly one call: it reads a framed
//! [`CallRequest`] from stdin, writes a framed [`CallOutcome`] to stdout and
//! exits. Every frame carries a fixed header so both sides can bound their
//! reads:
//!
//! ```text
//! [version: u16 LE][message type: u8][payload length: u32 LE][payload]
//! ```

use crate::value::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;
use tracing::{debug, trace};

/// Protocol version for compatibility checking
pub const CALL_PROTOCOL_VERSION: u16 = 1;

/// Maximum message size (100MB by default)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Message types in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Call request, forwarder to worker
    Request = 0x01,
    /// Call outcome, worker to forwarder
    Response = 0x02,
}

impl MessageType {
    /// Convert from u8 representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Wire format for payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Binary format using bincode
    Bincode,
    /// JSON format for debugging
    #[cfg(feature = "json")]
    Json,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self::Bincode
    }
}

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[cfg(feature = "json")]
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid protocol version: expected {expected}, got {received}")]
    InvalidVersion { expected: u16, received: u16 },

    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Message too large: {size} bytes exceeds maximum {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Message envelope containing type and payload
#[derive(Debug, Clone)]
pub struct WireMessage {
    /// Protocol version
    pub version: u16,
    /// Message type
    pub kind: MessageType,
    /// Serialized payload
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Create a new wire message
    pub fn new(kind: MessageType, payload: Vec<u8>) -> Self {
        Self {
            version: CALL_PROTOCOL_VERSION,
            kind,
            payload,
        }
    }

    /// Get the total size of the message when framed
    pub fn encoded_len(&self) -> usize {
        // Version (2) + Type (1) + Length (4) + Payload
        2 + 1 + 4 + self.payload.len()
    }
}

/// One forwarded call: target library, function and arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    /// Library the worker is expected to serve
    pub library: String,
    /// Registered function to invoke
    pub function: String,
    /// Argument values, in order
    pub args: Vec<Value>,
}

impl CallRequest {
    /// Create a new call request
    pub fn new(library: impl Into<String>, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            library: library.into(),
            function: function.into(),
            args,
        }
    }
}

/// Why a worker could not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The worker serves a different library than the request names
    LibraryMismatch,
    /// The function is not registered in the worker
    UnknownFunction,
    /// The arguments did not match the entry point's signature
    BadArguments,
    /// The entry point ran and returned an error
    Failed,
    /// The entry point panicked; the panic was caught and reported
    Panicked,
}

/// Structured failure sent back instead of a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
    /// Registered function names, filled for [`FailureKind::UnknownFunction`]
    pub available: Vec<String>,
}

impl RemoteFailure {
    /// Create a new failure with an empty function list
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            available: Vec::new(),
        }
    }

    /// Attach the list of registered function names
    pub fn with_available(mut self, names: Vec<String>) -> Self {
        self.available = names;
        self
    }
}

/// What came back from a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallOutcome {
    /// The entry point returned a value
    Success(Value),
    /// The worker reports a structured failure
    Failure(RemoteFailure),
}

/// Protocol handler for reading and writing call messages
#[derive(Debug, Clone, Copy)]
pub struct CallProtocol {
    format: WireFormat,
    max_message_size: usize,
}

impl Default for CallProtocol {
    fn default() -> Self {
        Self {
            format: WireFormat::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl CallProtocol {
    /// Create a new protocol handler
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// The payload encoding in use
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a call request
    pub fn serialize_request(&self, request: &CallRequest) -> Result<WireMessage, ProtocolError> {
        debug!(
            "Serializing call request: {}.{} with {} args",
            request.library,
            request.function,
            request.args.len()
        );

        let payload = self.encode(request)?;
        self.check_size(payload.len())?;
        Ok(WireMessage::new(MessageType::Request, payload))
    }

    /// Deserialize a call request
    pub fn deserialize_request(&self, payload: &[u8]) -> Result<CallRequest, ProtocolError> {
        trace!("Deserializing call request from {} bytes", payload.len());
        self.decode(payload)
    }

    /// Serialize a call outcome
    pub fn serialize_outcome(&self, outcome: &CallOutcome) -> Result<WireMessage, ProtocolError> {
        let payload = self.encode(outcome)?;
        self.check_size(payload.len())?;
        debug!("Serialized call outcome: {} bytes", payload.len());
        Ok(WireMessage::new(MessageType::Response, payload))
    }

    /// Deserialize a call outcome
    pub fn deserialize_outcome(&self, payload: &[u8]) -> Result<CallOutcome, ProtocolError> {
        trace!("Deserializing call outcome from {} bytes", payload.len());
        self.decode(payload)
    }

    /// Write a message to a stream
    pub fn write_message<W: Write>(
        &self,
        writer: &mut W,
        message: &WireMessage,
    ) -> Result<(), ProtocolError> {
        use byteorder::{LittleEndian, WriteBytesExt};

        debug!(
            "Writing message: type={:?}, payload_size={}",
            message.kind,
            message.payload.len()
        );
        self.check_size(message.payload.len())?;

        // Write header
        writer.write_u16::<LittleEndian>(message.version)?;
        writer.write_u8(message.kind as u8)?;
        writer.write_u32::<LittleEndian>(message.payload.len() as u32)?;

        // Write payload
        writer.write_all(&message.payload)?;
        writer.flush()?;

        trace!("Message written successfully");
        Ok(())
    }

    /// Read a message from a stream
    ///
    /// A peer that closes the stream mid-frame surfaces as
    /// [`ProtocolError::UnexpectedEof`] rather than a bare IO error.
    pub fn read_message<R: Read>(&self, reader: &mut R) -> Result<WireMessage, ProtocolError> {
        use byteorder::{LittleEndian, ReadBytesExt};

        trace!("Reading message header");

        // Read header
        let version = reader.read_u16::<LittleEndian>().map_err(eof_as_protocol)?;
        if version != CALL_PROTOCOL_VERSION {
            return Err(ProtocolError::InvalidVersion {
                expected: CALL_PROTOCOL_VERSION,
                received: version,
            });
        }

        let kind_raw = reader.read_u8().map_err(eof_as_protocol)?;
        let kind =
            MessageType::from_u8(kind_raw).ok_or(ProtocolError::InvalidMessageType(kind_raw))?;

        let payload_size = reader.read_u32::<LittleEndian>().map_err(eof_as_protocol)? as usize;

        debug!(
            "Message header: version={}, type={:?}, size={}",
            version, kind, payload_size
        );
        self.check_size(payload_size)?;

        // Read payload
        let mut payload = vec![0u8; payload_size];
        reader.read_exact(&mut payload).map_err(eof_as_protocol)?;

        trace!("Message read successfully");

        Ok(WireMessage { version, kind, payload })
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max_size: self.max_message_size,
            });
        }
        Ok(())
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        match self.format {
            WireFormat::Bincode => Ok(bincode::serialize(value)?),
            #[cfg(feature = "json")]
            WireFormat::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, ProtocolError> {
        match self.format {
            WireFormat::Bincode => Ok(bincode::deserialize(payload)?),
            #[cfg(feature = "json")]
            WireFormat::Json => Ok(serde_json::from_slice(payload)?),
        }
    }
}

fn eof_as_protocol(err: std::io::Error) -> ProtocolError {
    if err.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::UnexpectedEof
    } else {
        ProtocolError::Io(err)
    }
}
