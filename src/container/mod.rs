//! Container storage boundary.
//!
//! The compound-document engine that physically stores property sets sits
//! behind the trait family in this module. A container resolves a document
//! path to a root handle, a root hands out property-set handles, and a
//! property-set handle reads, writes, and deletes raw property records and
//! makes pending mutations durable on [`commit`].
//!
//! Records are opaque at this boundary: the container stores and returns the
//! byte records produced by [`crate::variant`] without interpreting them.
//! Property ids 0 and 1 are reserved by the record format for the name
//! dictionary and the codepage entry; enumeration never yields them and
//! writes may not address them.
//!
//! Two implementations ship with the crate: [`FileContainer`], a single-file
//! container with OS advisory locking, and [`InMemoryContainer`] for tests.
//!
//! [`commit`]: PropertySetStorage::commit

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;

use uuid::Uuid;

use crate::spec::PropertySpec;

mod file;
mod memory;
mod table;

pub use file::{FORMAT_VERSION, FileContainer, MAGIC_NUMBER};
pub use memory::InMemoryContainer;

/// Reserved property id of the name dictionary record.
pub const DICTIONARY_ID: u32 = 0;

/// Reserved property id of the codepage record.
pub const CODEPAGE_ID: u32 = 1;

/// First property id available to user properties.
pub const MIN_PROPERTY_ID: u32 = 2;

/// Stable status codes reported through [`StorageError::status`].
pub mod status {
    /// Target object does not exist.
    pub const NOT_FOUND: u32 = 0x8003_0002;
    /// Access to the object was refused.
    pub const ACCESS_DENIED: u32 = 0x8003_0005;
    /// An existing handle conflicts with the requested sharing mode.
    pub const SHARING_VIOLATION: u32 = 0x8003_0020;
    /// A write addressed a reserved property id.
    pub const RESERVED_ID: u32 = 0x8003_0057;
    /// Container data failed validation.
    pub const CORRUPTED: u32 = 0x8003_00fb;
    /// Underlying I/O failure.
    pub const IO_FAILURE: u32 = 0x8003_001d;
}

/// Sharing and access mode for opening a container root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access, deny-none sharing. Used for loads.
    ReadShared,
    /// Read-write access, exclusive sharing. Used for mutations.
    ReadWriteExclusive,
}

/// One enumeration entry: the persisted id, the dictionary name when the
/// container chose to include it, and the record's type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyStat {
    /// Persisted numeric property id.
    pub id: u32,
    /// Dictionary name, if the container includes names in stats.
    pub name: Option<String>,
    /// On-disk type tag of the stored record.
    pub tag: u16,
}

/// Failures reported by a container implementation.
///
/// These are translated into the public error taxonomy at the session
/// boundary and never surface raw.
#[derive(Debug)]
pub enum StorageError {
    /// The addressed object (document, property set, or property) does not
    /// exist.
    NotFound,
    /// Access to the object was refused.
    AccessDenied,
    /// An existing handle conflicts with the requested sharing mode.
    SharingViolation,
    /// A write addressed one of the reserved property ids.
    ReservedId(u32),
    /// Container data failed validation.
    Corrupted(String),
    /// Underlying I/O failure.
    Io(io::Error),
}

impl StorageError {
    /// Returns the stable native status code for this failure.
    pub fn status(&self) -> u32 {
        match self {
            StorageError::NotFound => status::NOT_FOUND,
            StorageError::AccessDenied => status::ACCESS_DENIED,
            StorageError::SharingViolation => status::SHARING_VIOLATION,
            StorageError::ReservedId(_) => status::RESERVED_ID,
            StorageError::Corrupted(_) => status::CORRUPTED,
            StorageError::Io(_) => status::IO_FAILURE,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "object not found"),
            StorageError::AccessDenied => write!(f, "access denied"),
            StorageError::SharingViolation => {
                write!(f, "sharing violation: a conflicting handle is open")
            }
            StorageError::ReservedId(id) => write!(f, "property id {id} is reserved"),
            StorageError::Corrupted(msg) => write!(f, "corrupted container data: {msg}"),
            StorageError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound,
            io::ErrorKind::PermissionDenied => StorageError::AccessDenied,
            _ => StorageError::Io(err),
        }
    }
}

/// A compound-document container that can open document roots.
pub trait ContainerStorage: fmt::Debug + Send + Sync {
    /// Opens the document at `path` in the given mode.
    ///
    /// # Errors
    ///
    /// `NotFound` if the path does not resolve to a document,
    /// `SharingViolation` if an existing handle conflicts with `mode`,
    /// `Corrupted` if the document fails validation.
    fn open_root(&self, path: &Path, mode: AccessMode)
    -> Result<Box<dyn RootStorage>, StorageError>;
}

/// An open document root. Dropping the handle releases its share of the
/// document.
pub trait RootStorage {
    /// Opens an existing property set for reading.
    ///
    /// # Errors
    ///
    /// `NotFound` if the set does not exist in this document.
    fn open_property_set(&self, set_id: Uuid) -> Result<Box<dyn PropertySetStorage>, StorageError>;

    /// Opens a property set for exclusive read-write, creating it if absent.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the root was not opened for writing or the document
    /// refuses set creation.
    fn create_property_set(
        &mut self,
        set_id: Uuid,
    ) -> Result<Box<dyn PropertySetStorage>, StorageError>;
}

/// An open property set.
///
/// Mutations accumulate in the handle and become durable on [`commit`];
/// dropping the handle without committing discards them.
///
/// [`commit`]: PropertySetStorage::commit
pub trait PropertySetStorage {
    /// Starts an enumeration of the set's user properties.
    ///
    /// Reserved ids (dictionary, codepage) are never yielded. Entry order is
    /// implementation-defined but stable while the handle is open.
    fn enum_stats(&self) -> Result<Box<dyn StatCursor>, StorageError>;

    /// Reads the raw record addressed by `spec`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no property matches the spec.
    fn read(&self, spec: &PropertySpec) -> Result<Vec<u8>, StorageError>;

    /// Stores `record` under `spec`, assigning a fresh id of at least
    /// `min_id` when the spec names a property the set does not contain yet.
    ///
    /// # Errors
    ///
    /// `ReservedId` if the spec addresses id 0 or 1, `AccessDenied` if the
    /// handle is read-only.
    fn write(&mut self, spec: &PropertySpec, record: &[u8], min_id: u32)
    -> Result<(), StorageError>;

    /// Removes the property addressed by `spec` and its dictionary entry.
    ///
    /// # Errors
    ///
    /// `NotFound` if no property matches the spec, `AccessDenied` if the
    /// handle is read-only.
    fn delete(&mut self, spec: &PropertySpec) -> Result<(), StorageError>;

    /// Looks up the dictionary name for a persisted id. Absence of a mapping
    /// is `Ok(None)`, not an error.
    fn name_of(&self, id: u32) -> Result<Option<String>, StorageError>;

    /// Makes pending writes and deletes durable.
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Cursor over enumeration entries. `Ok(None)` terminates the sequence.
pub trait StatCursor {
    /// Fetches the next entry.
    fn next(&mut self) -> Result<Option<PropertyStat>, StorageError>;
}

/// Ready-made cursor over a snapshot of stats, for container implementations
/// that gather entries up front.
pub struct StatList {
    entries: std::vec::IntoIter<PropertyStat>,
}

impl StatList {
    /// Wraps a snapshot of enumeration entries.
    pub fn new(entries: Vec<PropertyStat>) -> Self {
        StatList {
            entries: entries.into_iter(),
        }
    }
}

impl StatCursor for StatList {
    fn next(&mut self) -> Result<Option<PropertyStat>, StorageError> {
        Ok(self.entries.next())
    }
}
