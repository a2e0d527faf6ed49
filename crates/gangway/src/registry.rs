//! Named entry points served by a plugin worker
//!
//! A worker declares its callable surface up front: every entry point is
//! registered under a validated name before the worker starts serving, so a
//! bad function name fails at load time rather than somewhere inside a
//! forwarded call.

use crate::value::{Matrix, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a plugin entry point
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Expected {expected} arguments, got {actual}")]
    WrongArgumentCount { expected: usize, actual: usize },

    #[error("Argument {index}: expected {expected}, got {got}")]
    BadArgument {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

impl CallError {
    /// Entry point failure with a free-form message
    pub fn failed(message: impl Into<String>) -> Self {
        CallError::Failed(message.into())
    }
}

/// Errors raised while building a registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("'{name}' is not a valid entry point name")]
    InvalidName { name: String },

    #[error("Entry point '{name}' registered twice")]
    Duplicate { name: String },
}

/// Positional arguments handed to an entry point
///
/// Extractors return [`CallError::BadArgument`] with the expected and actual
/// kinds, so argument mistakes come back to the caller with enough detail to
/// fix the call site.
pub struct Args<'a> {
    values: &'a [Value],
}

impl<'a> Args<'a> {
    /// Wrap a value slice
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Require an exact argument count
    pub fn expect_len(&self, expected: usize) -> Result<(), CallError> {
        if self.values.len() != expected {
            return Err(CallError::WrongArgumentCount {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(())
    }

    /// Argument at `index`, of any kind
    ///
    /// The returned borrow lives as long as the underlying value slice, not
    /// this wrapper, so extractors can hand out `&'a str` and matrix views.
    pub fn value(&self, index: usize) -> Result<&'a Value, CallError> {
        self.values
            .get(index)
            .ok_or(CallError::WrongArgumentCount {
                expected: index + 1,
                actual: self.values.len(),
            })
    }

    pub fn bool(&self, index: usize) -> Result<bool, CallError> {
        let value = self.value(index)?;
        value.as_bool().ok_or(CallError::BadArgument {
            index,
            expected: "bool",
            got: value.kind(),
        })
    }

    pub fn int(&self, index: usize) -> Result<i64, CallError> {
        let value = self.value(index)?;
        value.as_int().ok_or(CallError::BadArgument {
            index,
            expected: "int",
            got: value.kind(),
        })
    }

    /// Numeric argument; integers widen to `f64`
    pub fn float(&self, index: usize) -> Result<f64, CallError> {
        let value = self.value(index)?;
        value.as_float().ok_or(CallError::BadArgument {
            index,
            expected: "float",
            got: value.kind(),
        })
    }

    pub fn text(&self, index: usize) -> Result<&'a str, CallError> {
        let value = self.value(index)?;
        value.as_text().ok_or(CallError::BadArgument {
            index,
            expected: "text",
            got: value.kind(),
        })
    }

    pub fn float_matrix(&self, index: usize) -> Result<&'a Matrix<f64>, CallError> {
        let value = self.value(index)?;
        value.as_float_matrix().ok_or(CallError::BadArgument {
            index,
            expected: "float matrix",
            got: value.kind(),
        })
    }

    pub fn int_matrix(&self, index: usize) -> Result<&'a Matrix<i32>, CallError> {
        let value = self.value(index)?;
        value.as_int_matrix().ok_or(CallError::BadArgument {
            index,
            expected: "int matrix",
            got: value.kind(),
        })
    }
}

/// A registered entry point
pub type EntryPoint = Box<dyn Fn(&Args<'_>) -> Result<Value, CallError> + Send + Sync>;

/// The callable surface of one plugin library
pub struct Registry {
    library: String,
    entries: BTreeMap<String, EntryPoint>,
}

impl Registry {
    /// Create an empty registry for the named library
    pub fn new(library: impl Into<String>) -> Result<Self, RegistryError> {
        let library = library.into();
        if !is_valid_name(&library) {
            return Err(RegistryError::InvalidName { name: library });
        }
        Ok(Self {
            library,
            entries: BTreeMap::new(),
        })
    }

    /// Register an entry point under a unique, identifier-like name
    pub fn register<F>(&mut self, name: impl Into<String>, entry: F) -> Result<(), RegistryError>
    where
        F: Fn(&Args<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(RegistryError::InvalidName { name });
        }
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        debug!("Registered entry point {}.{}", self.library, name);
        self.entries.insert(name, Box::new(entry));
        Ok(())
    }

    /// Library this registry serves
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Look up an entry point by name
    pub fn resolve(&self, name: &str) -> Option<&EntryPoint> {
        self.entries.get(name)
    }

    /// Registered names in sorted order
    pub fn function_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifier rules: ASCII letter or underscore, then letters, digits and
/// underscores
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
