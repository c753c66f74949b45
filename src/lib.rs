//! Typed custom properties for compound document files.
//!
//! A document's user-defined property set is a named group of typed
//! key/value entries persisted inside a container storage. This crate
//! provides the typed-variant marshalling between the container's tagged
//! on-disk records and [`PropertyValue`], and the session protocol that
//! locates, enumerates, and atomically commits the set.
//!
//! [`PropertyStore`] is the entry point: it opens one document, mirrors the
//! set in memory, and exposes add/update/delete/list. Every mutation is one
//! open, write, commit, close cycle against the container; the in-memory
//! mirror only changes after the commit succeeded.
//!
//! The container itself sits behind the trait family in [`container`]. Two
//! implementations ship with the crate: [`container::FileContainer`], a
//! single-file container with CRC-checked pages and OS advisory locking,
//! and [`container::InMemoryContainer`] for tests.
//!
//! # Example
//!
//! ```ignore
//! use docprops::PropertyStore;
//!
//! let mut store = PropertyStore::open("report.doc")?;
//! store.add("Author", "Jane")?;
//! store.update("Author", "Jane Doe")?;
//! assert_eq!(store["Author"].as_str(), Some("Jane Doe"));
//! for property in store.properties() {
//!     println!("{:?} = {:?}", property.name(), property.value());
//! }
//! ```

pub mod container;
pub mod value;
pub mod variant;

mod collection;
mod error;
mod session;
mod spec;
mod store;

pub use collection::Property;
pub use error::Error;
pub use spec::PropertySpec;
pub use store::{PropertyStore, PropertyStoreBuilder, USER_DEFINED_PROPERTIES};
pub use value::{Currency, Decimal, PropertyValue};
