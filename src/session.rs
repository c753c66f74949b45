//! Property-set session protocol.
//!
//! A session binds one container, one document path, and one property-set
//! identity. It has no long-lived handle: every operation runs its own
//! open, act, commit, close cycle, and every handle acquired along the way
//! is released when the operation returns, success or failure.
//!
//! Loads open the root read-only with deny-none sharing; mutations open it
//! exclusively. An absent property set on load means "no custom properties",
//! not an error; a denied set creation on a mutation fails loudly with
//! [`Error::AccessDenied`].

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::collection::PropertyCollection;
use crate::container::{
    AccessMode, ContainerStorage, PropertySetStorage, RootStorage, StorageError,
};
use crate::error::Error;
use crate::spec::{self, PropertySpec};
use crate::variant;

/// One store's connection to its document: container, path, and set identity.
#[derive(Debug)]
pub(crate) struct Session {
    container: Box<dyn ContainerStorage>,
    path: PathBuf,
    set_id: Uuid,
}

/// Keeps the exclusive root handle open for the lifetime of a mutation.
/// Fields drop in order: the set handle closes before the root releases the
/// document.
struct WriteHandle {
    set: Box<dyn PropertySetStorage>,
    _root: Box<dyn RootStorage>,
}

impl Session {
    pub(crate) fn new(container: Box<dyn ContainerStorage>, path: PathBuf, set_id: Uuid) -> Self {
        Session {
            container,
            path,
            set_id,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_id(&self) -> Uuid {
        self.set_id
    }

    /// Opens the document read-only and loads every property in the
    /// user-defined set, in enumeration order.
    ///
    /// A document without the set (or with read access to it denied) yields
    /// an empty collection. Individual entries whose record cannot be read or
    /// decoded degrade to the `Unsupported` pass-through value; only a
    /// failure to open the document or the set at all is fatal.
    pub(crate) fn load(&self) -> Result<PropertyCollection, Error> {
        let root = self
            .container
            .open_root(&self.path, AccessMode::ReadShared)
            .map_err(|err| self.open_failure(err))?;

        let mut collection = PropertyCollection::new();
        let set = match root.open_property_set(self.set_id) {
            Ok(set) => set,
            Err(StorageError::NotFound | StorageError::AccessDenied) => {
                #[cfg(feature = "logging")]
                log::debug!(
                    "document '{}' has no user-defined property set",
                    self.path.display()
                );
                return Ok(collection);
            }
            Err(err) => return Err(Error::Storage(err)),
        };

        let mut cursor = set.enum_stats().map_err(Error::Storage)?;
        while let Some(stat) = cursor.next().map_err(Error::Storage)? {
            let name = spec::resolve_name(set.as_ref(), &stat);
            let value = match set.read(&spec::spec_for_stat(&stat)) {
                Ok(record) => variant::decode(&record).unwrap_or_else(|_err| {
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "property id {} (tag {}): undecodable record, keeping raw bytes: {_err}",
                        stat.id,
                        stat.tag
                    );
                    variant::unsupported_record(&record)
                }),
                Err(_err) => {
                    #[cfg(feature = "logging")]
                    log::warn!("property id {}: record unreadable, listing as unsupported: {_err}", stat.id);
                    variant::unsupported_record(&[])
                }
            };
            collection.push_loaded(self.set_id, name, stat.id, value);
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "loaded {} properties from '{}'",
            collection.len(),
            self.path.display()
        );
        Ok(collection)
    }

    /// Writes one encoded record under `spec` and commits.
    ///
    /// Both the write and the commit must succeed before the caller may touch
    /// its in-memory mirror.
    pub(crate) fn write(
        &self,
        property_spec: &PropertySpec,
        record: &[u8],
        min_id: u32,
    ) -> Result<(), Error> {
        let mut handle = self.open_for_write()?;
        handle
            .set
            .write(property_spec, record, min_id)
            .map_err(Error::Storage)?;
        handle.set.commit().map_err(Error::Storage)?;
        #[cfg(feature = "logging")]
        log::debug!("committed write of {property_spec:?} to '{}'", self.path.display());
        Ok(())
    }

    /// Deletes the property addressed by `spec` and commits.
    pub(crate) fn delete(&self, property_spec: &PropertySpec) -> Result<(), Error> {
        let mut handle = self.open_for_write()?;
        handle.set.delete(property_spec).map_err(Error::Storage)?;
        handle.set.commit().map_err(Error::Storage)?;
        #[cfg(feature = "logging")]
        log::debug!("committed delete of {property_spec:?} from '{}'", self.path.display());
        Ok(())
    }

    /// Opens the root exclusively and create-or-opens the set for writing.
    fn open_for_write(&self) -> Result<WriteHandle, Error> {
        let mut root = self
            .container
            .open_root(&self.path, AccessMode::ReadWriteExclusive)
            .map_err(|err| self.open_failure(err))?;
        let set = match root.create_property_set(self.set_id) {
            Ok(set) => set,
            Err(StorageError::AccessDenied) => {
                return Err(Error::AccessDenied(self.path.clone()));
            }
            Err(err) => return Err(Error::Storage(err)),
        };
        Ok(WriteHandle { set, _root: root })
    }

    /// Maps a root-open failure into the public taxonomy: an unresolvable
    /// path is `DocumentNotFound`, everything else keeps its native status
    /// inside `Storage`.
    fn open_failure(&self, err: StorageError) -> Error {
        match err {
            StorageError::NotFound => Error::DocumentNotFound(self.path.clone()),
            other => Error::Storage(other),
        }
    }
}
