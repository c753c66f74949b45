//! Shared record table for the shipped container implementations.
//!
//! Both [`FileContainer`] and [`InMemoryContainer`] keep one property set as
//! a map of persisted ids to raw records plus the id-to-name dictionary; the
//! spec-resolution, id-allocation, and reserved-id rules live here so the two
//! backends cannot drift apart.
//!
//! [`FileContainer`]: super::FileContainer
//! [`InMemoryContainer`]: super::InMemoryContainer

use std::collections::BTreeMap;

use super::{MIN_PROPERTY_ID, PropertyStat, StorageError};
use crate::spec::PropertySpec;
use crate::variant::vt;

/// One property set: persisted records keyed by id, plus the name dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PropertyTable {
    records: BTreeMap<u32, Vec<u8>>,
    names: BTreeMap<u32, String>,
}

impl PropertyTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enumeration snapshot in ascending id order. Reserved ids are never
    /// present in `records`. `with_names` controls whether stats carry the
    /// dictionary name or leave resolution to the reverse lookup.
    pub(crate) fn stats(&self, with_names: bool) -> Vec<PropertyStat> {
        self.records
            .iter()
            .map(|(id, record)| PropertyStat {
                id: *id,
                name: if with_names {
                    self.names.get(id).cloned()
                } else {
                    None
                },
                tag: record_tag(record),
            })
            .collect()
    }

    pub(crate) fn read(&self, spec: &PropertySpec) -> Result<Vec<u8>, StorageError> {
        let id = self.resolve(spec).ok_or(StorageError::NotFound)?;
        self.records
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Stores `record` under the spec, allocating a fresh id of at least
    /// `min_id` for a name the set does not contain yet.
    pub(crate) fn write(
        &mut self,
        spec: &PropertySpec,
        record: &[u8],
        min_id: u32,
    ) -> Result<(), StorageError> {
        match spec {
            PropertySpec::Id(id) if *id < MIN_PROPERTY_ID => Err(StorageError::ReservedId(*id)),
            PropertySpec::Id(id) => {
                self.records.insert(*id, record.to_vec());
                Ok(())
            }
            PropertySpec::Name(name) => {
                let id = self
                    .id_of(name)
                    .unwrap_or_else(|| self.allocate(min_id));
                self.records.insert(id, record.to_vec());
                self.names.insert(id, name.clone());
                Ok(())
            }
        }
    }

    /// Removes the record and its dictionary entry.
    pub(crate) fn delete(&mut self, spec: &PropertySpec) -> Result<(), StorageError> {
        let id = self.resolve(spec).ok_or(StorageError::NotFound)?;
        if self.records.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        self.names.remove(&id);
        Ok(())
    }

    pub(crate) fn name_of(&self, id: u32) -> Option<String> {
        self.names.get(&id).cloned()
    }

    /// Raw records in id order, for serialization.
    pub(crate) fn records(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.records.iter().map(|(id, record)| (*id, record.as_slice()))
    }

    /// Dictionary entries in id order, for serialization.
    pub(crate) fn names(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Installs a record during deserialization, bypassing the spec rules.
    pub(crate) fn insert_record(&mut self, id: u32, record: Vec<u8>) {
        self.records.insert(id, record);
    }

    /// Installs a dictionary entry during deserialization.
    pub(crate) fn insert_name(&mut self, id: u32, name: String) {
        self.names.insert(id, name);
    }

    fn resolve(&self, spec: &PropertySpec) -> Option<u32> {
        match spec {
            PropertySpec::Name(name) => self.id_of(name),
            PropertySpec::Id(id) if *id >= MIN_PROPERTY_ID => Some(*id),
            PropertySpec::Id(_) => None,
        }
    }

    fn id_of(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .find(|(_, entry)| entry.as_str() == name)
            .map(|(id, _)| *id)
    }

    /// First unused id at or above `min_id`, floored at the first
    /// non-reserved id.
    fn allocate(&self, min_id: u32) -> u32 {
        let mut id = min_id.max(MIN_PROPERTY_ID);
        while self.records.contains_key(&id) {
            id += 1;
        }
        id
    }
}

/// Type tag of a raw record, or the illegal marker when it is headless.
fn record_tag(record: &[u8]) -> u16 {
    if record.len() >= 2 {
        u16::from_le_bytes([record[0], record[1]])
    } else {
        vt::ILLEGAL
    }
}
