//! Error taxonomy for store operations.
//!
//! Container failures are translated into this taxonomy at the session
//! boundary; raw container status codes never surface directly, but the
//! stable code is preserved inside [`Error::Storage`] and shown by its
//! `Display` output.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use crate::container::StorageError;

/// Errors surfaced by [`PropertyStore`] operations.
///
/// Every mutation either fully succeeds (collection updated, durable commit
/// observed) or fails with one of these and leaves the collection unchanged.
///
/// [`PropertyStore`]: crate::PropertyStore
#[derive(Debug)]
pub enum Error {
    /// Bad input to a public entry point.
    InvalidArgument(String),
    /// The document path did not resolve to an openable container.
    DocumentNotFound(PathBuf),
    /// Write access to the document's property set was refused.
    AccessDenied(PathBuf),
    /// A property with this name already exists.
    DuplicateProperty(String),
    /// No property with this name exists.
    PropertyNotFound(String),
    /// Any other container failure, including sharing violations.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::DocumentNotFound(path) => {
                write!(f, "document '{}' not found", path.display())
            }
            Error::AccessDenied(path) => {
                write!(f, "write access to '{}' was denied", path.display())
            }
            Error::DuplicateProperty(name) => {
                write!(f, "property '{name}' already exists")
            }
            Error::PropertyNotFound(name) => write!(f, "property '{name}' not found"),
            Error::Storage(err) => {
                write!(f, "storage failure ({:#010x}): {err}", err.status())
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Storage(err) => Some(err),
            _ => None,
        }
    }
}
