//! In-process container for tests.
//!
//! Documents live in a path-keyed map behind a shared mutex; cloning the
//! container clones the handle, not the documents, so a test can hold one
//! clone to inspect state while a store works through another. Sharing modes
//! are enforced through a per-document handle count, and a per-document
//! write-deny switch exercises the access-denied paths.
//!
//! Enumeration stats deliberately omit names: loads must resolve them
//! through the reverse dictionary lookup, the same way they would against a
//! container that only stats ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::table::PropertyTable;
use super::{
    AccessMode, ContainerStorage, PropertySetStorage, RootStorage, StatCursor, StatList,
    StorageError,
};
use crate::spec::PropertySpec;

/// In-process container storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContainer {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<PathBuf, Document>,
    handles: HashMap<PathBuf, HandleCount>,
}

#[derive(Debug, Default)]
struct Document {
    sets: HashMap<Uuid, PropertyTable>,
    deny_writes: bool,
}

/// Open handles on one document, for sharing-mode enforcement.
#[derive(Debug, Default)]
struct HandleCount {
    readers: usize,
    exclusive: bool,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document at `path`. Opening a path that was never
    /// created fails with `NotFound`.
    pub fn create_document(&self, path: impl AsRef<Path>) {
        self.lock()
            .documents
            .entry(path.as_ref().to_path_buf())
            .or_default();
    }

    /// Switches write access to the document's property sets on or off.
    /// While denied, `create_property_set` fails with `AccessDenied`.
    pub fn deny_writes(&self, path: impl AsRef<Path>, deny: bool) {
        if let Some(document) = self.lock().documents.get_mut(path.as_ref()) {
            document.deny_writes = deny;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContainerStorage for InMemoryContainer {
    fn open_root(
        &self,
        path: &Path,
        mode: AccessMode,
    ) -> Result<Box<dyn RootStorage>, StorageError> {
        let mut inner = self.lock();
        if !inner.documents.contains_key(path) {
            return Err(StorageError::NotFound);
        }
        let count = inner.handles.entry(path.to_path_buf()).or_default();
        match mode {
            AccessMode::ReadShared => {
                if count.exclusive {
                    return Err(StorageError::SharingViolation);
                }
                count.readers += 1;
            }
            AccessMode::ReadWriteExclusive => {
                if count.exclusive || count.readers > 0 {
                    return Err(StorageError::SharingViolation);
                }
                count.exclusive = true;
            }
        }
        Ok(Box::new(MemoryRoot {
            container: self.clone(),
            path: path.to_path_buf(),
            mode,
        }))
    }
}

struct MemoryRoot {
    container: InMemoryContainer,
    path: PathBuf,
    mode: AccessMode,
}

impl RootStorage for MemoryRoot {
    fn open_property_set(&self, set_id: Uuid) -> Result<Box<dyn PropertySetStorage>, StorageError> {
        let inner = self.container.lock();
        let table = inner
            .documents
            .get(&self.path)
            .and_then(|document| document.sets.get(&set_id))
            .cloned()
            .ok_or(StorageError::NotFound)?;
        Ok(Box::new(MemorySet {
            container: self.container.clone(),
            path: self.path.clone(),
            set_id,
            table,
            writable: false,
        }))
    }

    fn create_property_set(
        &mut self,
        set_id: Uuid,
    ) -> Result<Box<dyn PropertySetStorage>, StorageError> {
        if self.mode != AccessMode::ReadWriteExclusive {
            return Err(StorageError::AccessDenied);
        }
        let inner = self.container.lock();
        let document = inner.documents.get(&self.path).ok_or(StorageError::NotFound)?;
        if document.deny_writes {
            return Err(StorageError::AccessDenied);
        }
        let table = document.sets.get(&set_id).cloned().unwrap_or_default();
        Ok(Box::new(MemorySet {
            container: self.container.clone(),
            path: self.path.clone(),
            set_id,
            table,
            writable: true,
        }))
    }
}

impl Drop for MemoryRoot {
    fn drop(&mut self) {
        let mut inner = self.container.lock();
        if let Some(count) = inner.handles.get_mut(&self.path) {
            match self.mode {
                AccessMode::ReadShared => count.readers = count.readers.saturating_sub(1),
                AccessMode::ReadWriteExclusive => count.exclusive = false,
            }
        }
    }
}

/// A property-set handle working on a private copy of the table; commit
/// publishes the copy, dropping without commit discards it.
struct MemorySet {
    container: InMemoryContainer,
    path: PathBuf,
    set_id: Uuid,
    table: PropertyTable,
    writable: bool,
}

impl PropertySetStorage for MemorySet {
    fn enum_stats(&self) -> Result<Box<dyn StatCursor>, StorageError> {
        Ok(Box::new(StatList::new(self.table.stats(false))))
    }

    fn read(&self, spec: &PropertySpec) -> Result<Vec<u8>, StorageError> {
        self.table.read(spec)
    }

    fn write(
        &mut self,
        spec: &PropertySpec,
        record: &[u8],
        min_id: u32,
    ) -> Result<(), StorageError> {
        if !self.writable {
            return Err(StorageError::AccessDenied);
        }
        self.table.write(spec, record, min_id)
    }

    fn delete(&mut self, spec: &PropertySpec) -> Result<(), StorageError> {
        if !self.writable {
            return Err(StorageError::AccessDenied);
        }
        self.table.delete(spec)
    }

    fn name_of(&self, id: u32) -> Result<Option<String>, StorageError> {
        Ok(self.table.name_of(id))
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.writable {
            return Err(StorageError::AccessDenied);
        }
        let mut inner = self.container.lock();
        let document = inner
            .documents
            .get_mut(&self.path)
            .ok_or(StorageError::NotFound)?;
        document.sets.insert(self.set_id, self.table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET: Uuid = Uuid::from_u128(0xd5cd_d505_2e9c_101b_9397_0800_2b2c_f9ae);
    const DOC: &str = "report.doc";

    fn record() -> Vec<u8> {
        vec![0x03, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00]
    }

    fn seeded() -> InMemoryContainer {
        let container = InMemoryContainer::new();
        container.create_document(DOC);
        container
    }

    #[test]
    fn test_missing_document_not_found() {
        let container = InMemoryContainer::new();
        assert!(matches!(
            container.open_root(Path::new(DOC), AccessMode::ReadShared),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn test_sharing_modes_enforced() {
        let container = seeded();
        let reader = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        // A second reader is fine, a writer is not.
        let _reader2 = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        assert!(matches!(
            container.open_root(Path::new(DOC), AccessMode::ReadWriteExclusive),
            Err(StorageError::SharingViolation)
        ));

        drop(reader);
        assert!(matches!(
            container.open_root(Path::new(DOC), AccessMode::ReadWriteExclusive),
            Err(StorageError::SharingViolation)
        ));
    }

    #[test]
    fn test_exclusive_blocks_readers_until_dropped() {
        let container = seeded();
        let writer = container
            .open_root(Path::new(DOC), AccessMode::ReadWriteExclusive)
            .unwrap();
        assert!(matches!(
            container.open_root(Path::new(DOC), AccessMode::ReadShared),
            Err(StorageError::SharingViolation)
        ));
        drop(writer);
        assert!(container.open_root(Path::new(DOC), AccessMode::ReadShared).is_ok());
    }

    #[test]
    fn test_uncommitted_mutations_discarded() {
        let container = seeded();
        {
            let mut root = container
                .open_root(Path::new(DOC), AccessMode::ReadWriteExclusive)
                .unwrap();
            let mut set = root.create_property_set(SET).unwrap();
            set.write(&PropertySpec::Name("A".to_string()), &record(), 2)
                .unwrap();
            // Dropped without commit.
        }
        let root = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        assert!(matches!(
            root.open_property_set(SET),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn test_commit_publishes_and_survives_reopen() {
        let container = seeded();
        {
            let mut root = container
                .open_root(Path::new(DOC), AccessMode::ReadWriteExclusive)
                .unwrap();
            let mut set = root.create_property_set(SET).unwrap();
            set.write(&PropertySpec::Name("A".to_string()), &record(), 2)
                .unwrap();
            set.commit().unwrap();
        }
        let root = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        let set = root.open_property_set(SET).unwrap();
        let mut cursor = set.enum_stats().unwrap();
        let stat = cursor.next().unwrap().unwrap();
        assert_eq!(stat.name, None);
        assert_eq!(set.name_of(stat.id).unwrap(), Some("A".to_string()));
        assert_eq!(set.read(&PropertySpec::Id(stat.id)).unwrap(), record());
    }

    #[test]
    fn test_read_only_set_refuses_writes() {
        let container = seeded();
        {
            let mut root = container
                .open_root(Path::new(DOC), AccessMode::ReadWriteExclusive)
                .unwrap();
            let mut set = root.create_property_set(SET).unwrap();
            set.write(&PropertySpec::Name("A".to_string()), &record(), 2)
                .unwrap();
            set.commit().unwrap();
        }
        let root = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        let mut set = root.open_property_set(SET).unwrap();
        assert!(matches!(
            set.write(&PropertySpec::Name("B".to_string()), &record(), 2),
            Err(StorageError::AccessDenied)
        ));
        assert!(matches!(set.commit(), Err(StorageError::AccessDenied)));
    }

    #[test]
    fn test_deny_writes_refuses_set_creation() {
        let container = seeded();
        container.deny_writes(DOC, true);
        let mut root = container
            .open_root(Path::new(DOC), AccessMode::ReadWriteExclusive)
            .unwrap();
        assert!(matches!(
            root.create_property_set(SET),
            Err(StorageError::AccessDenied)
        ));
    }

    #[test]
    fn test_create_requires_exclusive_root() {
        let container = seeded();
        let _shared = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        // The trait needs &mut; reopen as a fresh shared root to exercise it.
        drop(_shared);
        let mut root = container
            .open_root(Path::new(DOC), AccessMode::ReadShared)
            .unwrap();
        assert!(matches!(
            root.create_property_set(SET),
            Err(StorageError::AccessDenied)
        ));
    }
}
