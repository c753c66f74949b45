//! Public store façade.
//!
//! [`PropertyStore`] opens one document, mirrors its user-defined property
//! set in memory, and exposes add/update/delete/list over it. Every mutation
//! runs a full open, act, commit, close round trip against the container;
//! the mirror is only touched after the commit succeeded, so readers always
//! observe durably committed state.

use std::ops::Index;
use std::path::Path;

use uuid::Uuid;

use crate::collection::{Property, PropertyCollection};
use crate::container::{ContainerStorage, FileContainer};
use crate::error::Error;
use crate::session::Session;
use crate::spec::PropertySpec;
use crate::value::PropertyValue;
use crate::variant;

/// Format identifier of the user-defined property set.
///
/// This is the single well-known set the store addresses; the format reserves
/// it for document-author custom properties.
pub const USER_DEFINED_PROPERTIES: Uuid =
    Uuid::from_u128(0xd5cd_d505_2e9c_101b_9397_0800_2b2c_f9ae);

/// Builder for configuring and opening a property store.
///
/// # Example
///
/// ```ignore
/// use docprops::PropertyStore;
/// use docprops::container::InMemoryContainer;
///
/// let container = InMemoryContainer::new();
/// container.create_document("report.doc");
/// let store = PropertyStore::builder()
///     .container(container)
///     .open("report.doc")?;
/// ```
#[derive(Debug, Default)]
pub struct PropertyStoreBuilder {
    container: Option<Box<dyn ContainerStorage>>,
}

impl PropertyStoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the container implementation backing the store.
    ///
    /// Default: [`FileContainer`].
    #[must_use]
    pub fn container(mut self, container: impl ContainerStorage + 'static) -> Self {
        self.container = Some(Box::new(container));
        self
    }

    /// Opens the document at `path` and loads its custom properties.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the path is empty, `DocumentNotFound` if it does
    /// not resolve to an openable container, `Storage` for any other open
    /// failure. A document without a user-defined property set opens with an
    /// empty collection.
    pub fn open(self, path: impl AsRef<Path>) -> Result<PropertyStore, Error> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(
                "document path must not be empty".to_string(),
            ));
        }
        let container = self
            .container
            .unwrap_or_else(|| Box::new(FileContainer::new()));
        let session = Session::new(container, path.to_path_buf(), USER_DEFINED_PROPERTIES);
        let collection = session.load()?;
        Ok(PropertyStore {
            session,
            collection,
        })
    }
}

/// The custom properties of one document.
///
/// Mutators take `&mut self`; access from multiple threads must be
/// serialized by the caller. Two stores bound to the same path within one
/// process are not protected against each other beyond the container's own
/// sharing modes.
#[derive(Debug)]
pub struct PropertyStore {
    session: Session,
    collection: PropertyCollection,
}

impl PropertyStore {
    /// Opens the document at `path` with the default file container.
    ///
    /// See [`PropertyStoreBuilder::open`] for the failure modes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::builder().open(path)
    }

    /// Returns a builder for selecting a container implementation.
    pub fn builder() -> PropertyStoreBuilder {
        PropertyStoreBuilder::new()
    }

    /// Adds a new property.
    ///
    /// # Errors
    ///
    /// `DuplicateProperty` if the name already exists (checked in memory,
    /// never delegated to the container), `AccessDenied` if the document
    /// refuses write access to the set, `Storage` for other container
    /// failures. On error the collection is unchanged.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.collection.contains(&name) {
            return Err(Error::DuplicateProperty(name));
        }
        let value = value.into();
        let record = variant::encode(&value).map_err(|err| Error::InvalidArgument(err.to_string()))?;
        self.session.write(
            &PropertySpec::Name(name.clone()),
            &record,
            self.collection.id_hint(),
        )?;
        self.collection
            .push_added(self.session.set_id(), name, value);
        Ok(())
    }

    /// Replaces the value of an existing property.
    ///
    /// # Errors
    ///
    /// `PropertyNotFound` if no property has this name; never silently
    /// creates. On error the collection is unchanged.
    pub fn update(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), Error> {
        let spec = match self.collection.get(name) {
            Some(property) => property.spec(),
            None => return Err(Error::PropertyNotFound(name.to_string())),
        };
        let value = value.into();
        let record = variant::encode(&value).map_err(|err| Error::InvalidArgument(err.to_string()))?;
        self.session
            .write(&spec, &record, self.collection.id_hint())?;
        self.collection.set_value(name, value);
        Ok(())
    }

    /// Removes a property.
    ///
    /// # Errors
    ///
    /// `PropertyNotFound` if no property has this name. On error the
    /// collection is unchanged.
    pub fn delete(&mut self, name: &str) -> Result<(), Error> {
        let spec = match self.collection.get(name) {
            Some(property) => property.spec(),
            None => return Err(Error::PropertyNotFound(name.to_string())),
        };
        self.session.delete(&spec)?;
        self.collection.remove(name);
        Ok(())
    }

    /// Looks up a property by name, case-sensitively.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.collection.get(name)
    }

    /// Iterates properties in stored order: load order for entries read at
    /// open, then insertion order for entries added since.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.collection.iter()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Returns true if the document has no custom properties.
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Path of the underlying document.
    pub fn path(&self) -> &Path {
        self.session.path()
    }

    /// Discards the in-memory mirror and re-runs the full load.
    pub fn reload(&mut self) -> Result<(), Error> {
        self.collection = self.session.load()?;
        Ok(())
    }
}

impl Index<&str> for PropertyStore {
    type Output = PropertyValue;

    /// Indexer-style lookup by name.
    ///
    /// # Panics
    ///
    /// Panics if no property has this name; use [`get`] for fallible lookup.
    ///
    /// [`get`]: PropertyStore::get
    fn index(&self, name: &str) -> &PropertyValue {
        match self.collection.get(name) {
            Some(property) => property.value(),
            None => panic!("no property named '{name}'"),
        }
    }
}
