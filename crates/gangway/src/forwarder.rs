//! Out-of-process call forwarding to plugin workers
//!
//! Every call spawns a fresh worker process: the executable is resolved from
//! the search path again, loaded from scratch, handed one framed request on
//! stdin and reaped after it answers on stdout. Nothing is cached between
//! calls, so replacing a worker binary on disk takes effect on the very next
//! call. The price is process startup per call; these calls are expected to
//! be rare and heavy, not a hot loop.
//!
//! The pipe exchange runs on a helper thread feeding a channel, which is
//! what makes the response wait boundable: the calling thread blocks on the
//! channel with a timeout instead of on the pipe itself.

use crate::protocol::{
    CallOutcome, CallProtocol, CallRequest, FailureKind, MessageType, ProtocolError, WireFormat,
    WireMessage, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::value::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Environment variable holding extra worker search directories,
/// PATH-style separated
pub const LIBRARY_PATH_ENV: &str = "GANGWAY_LIBRARY_PATH";

/// Default bound on the wait for a worker's response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while forwarding a call
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("'{name}' is not a valid library name")]
    InvalidLibraryName { name: String },

    #[error("Library '{name}' not found, searched {searched:?}")]
    LibraryNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Library '{library}' has no function '{function}', available: {available:?}")]
    FunctionNotFound {
        library: String,
        function: String,
        available: Vec<String>,
    },

    #[error("Worker at {}: {message}", .path.display())]
    LibraryMismatch { path: PathBuf, message: String },

    #[error("Call {library}.{function} failed in worker: {message}")]
    Remote {
        library: String,
        function: String,
        message: String,
    },

    #[error("Worker for '{library}' exited without a response ({status})")]
    WorkerExited { library: String, status: String },

    #[error("No response from '{library}' worker within {timeout:?}")]
    ResponseTimeout { library: String, timeout: Duration },

    #[error("Failed to spawn worker {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration for the call forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Directories searched for worker executables, in order
    pub search_dirs: Vec<PathBuf>,
    /// Also search the directories named by [`LIBRARY_PATH_ENV`]
    pub use_env_path: bool,
    /// Bound on the wait for a response; `None` waits indefinitely
    pub response_timeout: Option<Duration>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Wire format to use
    pub format: WireFormat,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            use_env_path: true,
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE, // 100MB
            format: WireFormat::default(),
        }
    }
}

/// Handle to a named plugin library served by worker processes
///
/// The handle holds no process and no file: it is just the library name and
/// the forwarding configuration. Each [`invoke`](Self::invoke) resolves and
/// spawns a fresh worker.
#[derive(Debug, Clone)]
pub struct Library {
    name: String,
    config: ForwarderConfig,
}

impl Library {
    /// Create a handle with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ForwarderConfig::default())
    }

    /// Create a handle with custom configuration
    pub fn with_config(name: impl Into<String>, config: ForwarderConfig) -> Self {
        Self { name: name.into(), config }
    }

    /// Library name this handle forwards to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The forwarding configuration
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Locate the worker executable for this library
    ///
    /// Resolution runs on every call, so a freshly replaced binary is picked
    /// up without restarting the caller.
    pub fn resolve(&self) -> Result<PathBuf, InvokeError> {
        if self.name.is_empty() || self.name.chars().any(std::path::is_separator) {
            return Err(InvokeError::InvalidLibraryName {
                name: self.name.clone(),
            });
        }

        let file_name = format!("{}{}", self.name, std::env::consts::EXE_SUFFIX);
        let mut searched = Vec::new();

        let mut dirs = self.config.search_dirs.clone();
        if self.config.use_env_path {
            if let Some(paths) = std::env::var_os(LIBRARY_PATH_ENV) {
                dirs.extend(std::env::split_paths(&paths));
            }
        }

        for dir in dirs {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                trace!("Resolved library '{}' to {}", self.name, candidate.display());
                return Ok(candidate);
            }
            searched.push(dir);
        }

        Err(InvokeError::LibraryNotFound {
            name: self.name.clone(),
            searched,
        })
    }

    /// Forward one call to a fresh worker process and wait for its result
    pub fn invoke(&self, function: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        let path = self.resolve()?;
        let protocol = CallProtocol::new(self.config.format)
            .with_max_message_size(self.config.max_message_size);

        // Serialize before spawning so an oversized request costs no process
        let request = CallRequest::new(self.name.clone(), function, args);
        let message = protocol.serialize_request(&request)?;

        debug!(
            "Invoking {}.{} via {} ({} bytes)",
            self.name,
            function,
            path.display(),
            message.encoded_len()
        );

        // stderr stays inherited so worker logs reach the caller's terminal
        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                path: path.clone(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InvokeError::Spawn {
                    path,
                    source: std::io::Error::new(ErrorKind::Other, "worker stdio was not piped"),
                });
            }
        };

        // The pipe exchange runs off-thread: a wedged worker can block the
        // write or the read forever, and the channel below is what keeps the
        // caller's wait boundable.
        let (tx, rx) = mpsc::channel();
        let io_thread = thread::spawn(move || {
            let _ = tx.send(exchange(protocol, message, stdin, stdout));
        });

        let result = match self.config.response_timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!(
                        "No response from '{}' worker within {:?}, killing it",
                        self.name, timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = io_thread.join();
                    return Err(InvokeError::ResponseTimeout {
                        library: self.name.clone(),
                        timeout,
                    });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    let _ = child.kill();
                    let status = reap(&mut child);
                    return Err(InvokeError::WorkerExited {
                        library: self.name.clone(),
                        status,
                    });
                }
            },
            None => match rx.recv() {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill();
                    let status = reap(&mut child);
                    return Err(InvokeError::WorkerExited {
                        library: self.name.clone(),
                        status,
                    });
                }
            },
        };
        let _ = io_thread.join();

        let outcome = match result {
            Ok(outcome) => {
                // A worker that answered exits on its own right after
                match child.wait() {
                    Ok(status) if !status.success() => {
                        warn!("Worker for '{}' exited with {}", self.name, status)
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Failed to reap worker for '{}': {}", self.name, err),
                }
                outcome
            }
            Err(ProtocolError::UnexpectedEof) => {
                let status = reap(&mut child);
                return Err(InvokeError::WorkerExited {
                    library: self.name.clone(),
                    status,
                });
            }
            Err(ProtocolError::Io(err)) if err.kind() == ErrorKind::BrokenPipe => {
                let status = reap(&mut child);
                return Err(InvokeError::WorkerExited {
                    library: self.name.clone(),
                    status,
                });
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InvokeError::Protocol(err));
            }
        };

        trace!("Worker for '{}' answered", self.name);

        match outcome {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Failure(failure) => Err(match failure.kind {
                FailureKind::UnknownFunction => InvokeError::FunctionNotFound {
                    library: self.name.clone(),
                    function: function.to_string(),
                    available: failure.available,
                },
                FailureKind::LibraryMismatch => InvokeError::LibraryMismatch {
                    path,
                    message: failure.message,
                },
                FailureKind::BadArguments | FailureKind::Failed | FailureKind::Panicked => {
                    InvokeError::Remote {
                        library: self.name.clone(),
                        function: function.to_string(),
                        message: failure.message,
                    }
                }
            }),
        }
    }
}

/// Write the request, close stdin to mark it complete, read the response
fn exchange(
    protocol: CallProtocol,
    message: WireMessage,
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
) -> Result<CallOutcome, ProtocolError> {
    protocol.write_message(&mut stdin, &message)?;
    drop(stdin);

    let response = protocol.read_message(&mut stdout)?;
    if response.kind != MessageType::Response {
        return Err(ProtocolError::InvalidMessageType(response.kind as u8));
    }
    protocol.deserialize_outcome(&response.payload)
}

/// Wait for the worker and render its exit status for error reporting
fn reap(child: &mut Child) -> String {
    match child.wait() {
        Ok(status) => status.to_string(),
        Err(err) => format!("wait failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_forwarder_config_default() {
        let library = Library::new("anylib");
        assert_eq!(library.name(), "anylib");

        let config = library.config();
        assert!(config.search_dirs.is_empty());
        assert!(config.use_env_path);
        assert_eq!(config.response_timeout, Some(DEFAULT_RESPONSE_TIMEOUT));
        assert_eq!(config.max_message_size, 100 * 1024 * 1024);
    }

    #[test]
    fn test_resolve_finds_worker_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file_name = format!("mylib{}", std::env::consts::EXE_SUFFIX);
        File::create(dir.path().join(file_name)).unwrap();

        let library = Library::with_config(
            "mylib",
            ForwarderConfig {
                search_dirs: vec![dir.path().to_path_buf()],
                use_env_path: false,
                ..Default::default()
            },
        );
        let path = library.resolve().unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
    }

    #[test]
    fn test_resolve_reports_searched_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::with_config(
            "missing",
            ForwarderConfig {
                search_dirs: vec![dir.path().to_path_buf()],
                use_env_path: false,
                ..Default::default()
            },
        );
        match library.resolve() {
            Err(InvokeError::LibraryNotFound { name, searched }) => {
                assert_eq!(name, "missing");
                assert_eq!(searched, vec![dir.path().to_path_buf()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_rejects_path_like_names() {
        let library = Library::new("../escape");
        assert!(matches!(
            library.resolve(),
            Err(InvokeError::InvalidLibraryName { .. })
        ));

        let empty = Library::new("");
        assert!(matches!(
            empty.resolve(),
            Err(InvokeError::InvalidLibraryName { .. })
        ));
    }

    #[test]
    fn test_search_dirs_take_precedence_over_env() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let file_name = format!("duallib{}", std::env::consts::EXE_SUFFIX);
        File::create(first.path().join(&file_name)).unwrap();
        File::create(second.path().join(&file_name)).unwrap();

        std::env::set_var(LIBRARY_PATH_ENV, second.path());
        let library = Library::with_config(
            "duallib",
            ForwarderConfig {
                search_dirs: vec![first.path().to_path_buf()],
                ..Default::default()
            },
        );
        let path = library.resolve().unwrap();
        assert_eq!(path.parent().unwrap(), first.path());
        std::env::remove_var(LIBRARY_PATH_ENV);
    }
}
