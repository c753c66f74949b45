//! In-memory property collection.
//!
//! The collection mirrors the durably committed state of one property set:
//! entries loaded at open plus entries added since, in that order. It owns
//! every [`Property`] it holds and is only mutated after the corresponding
//! container commit succeeded, so callers always observe committed state.

use uuid::Uuid;

use crate::container::MIN_PROPERTY_ID;
use crate::spec::PropertySpec;
use crate::value::PropertyValue;

/// One custom property: the in-memory mirror of one persisted entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    set_id: Uuid,
    name: Option<String>,
    stored_id: Option<u32>,
    ordinal: u32,
    value: PropertyValue,
}

impl Property {
    /// Entry read from the container during load. The persisted id comes
    /// from the enumeration stat; the name may be absent when the set's
    /// dictionary has no mapping.
    pub(crate) fn loaded(
        set_id: Uuid,
        name: Option<String>,
        stored_id: u32,
        ordinal: u32,
        value: PropertyValue,
    ) -> Self {
        Property {
            set_id,
            name,
            stored_id: Some(stored_id),
            ordinal,
            value,
        }
    }

    /// Entry created by a committed add. The container assigns the persisted
    /// id on its side; this mirror does not learn it.
    pub(crate) fn added(set_id: Uuid, name: String, ordinal: u32, value: PropertyValue) -> Self {
        Property {
            set_id,
            name: Some(name),
            stored_id: None,
            ordinal,
            value,
        }
    }

    /// Identifier of the property set this entry belongs to.
    pub fn set_id(&self) -> Uuid {
        self.set_id
    }

    /// Dictionary name, absent for entries persisted without one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Persisted numeric id, known only for entries read from the container.
    pub fn stored_id(&self) -> Option<u32> {
        self.stored_id
    }

    /// The typed value.
    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Builds the container spec addressing this entry: by name when one is
    /// known, else by persisted id.
    pub(crate) fn spec(&self) -> PropertySpec {
        match (&self.name, self.stored_id) {
            (Some(name), _) => PropertySpec::Name(name.clone()),
            (None, Some(id)) => PropertySpec::Id(id),
            (None, None) => unreachable!("property has neither name nor persisted id"),
        }
    }
}

/// Ordered collection of properties with unique, case-sensitively matched
/// names.
///
/// The ordinal counter starts at the loaded-entry count, increments on add,
/// and decrements on delete. It is session-local bookkeeping, used only as
/// the minimum-id hint for container writes; it is not collision-free across
/// add/delete/add cycles and never identifies a property across sessions.
#[derive(Debug, Default)]
pub(crate) struct PropertyCollection {
    entries: Vec<Property>,
    next_ordinal: u32,
}

impl PropertyCollection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an entry during load, in enumeration order.
    pub(crate) fn push_loaded(
        &mut self,
        set_id: Uuid,
        name: Option<String>,
        stored_id: u32,
        value: PropertyValue,
    ) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.entries
            .push(Property::loaded(set_id, name, stored_id, ordinal, value));
    }

    /// Appends a committed add.
    pub(crate) fn push_added(&mut self, set_id: Uuid, name: String, value: PropertyValue) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.entries
            .push(Property::added(set_id, name, ordinal, value));
    }

    /// Replaces the value of the named entry after a committed update.
    /// Returns false if no entry matches.
    pub(crate) fn set_value(&mut self, name: &str, value: PropertyValue) -> bool {
        match self.position(name) {
            Some(index) => {
                self.entries[index].value = value;
                true
            }
            None => false,
        }
    }

    /// Removes the named entry after a committed delete.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Property> {
        let index = self.position(name)?;
        self.next_ordinal = self.next_ordinal.saturating_sub(1);
        Some(self.entries.remove(index))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Property> {
        self.position(name).map(|index| &self.entries[index])
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Minimum-id hint for container writes, floored at the first
    /// non-reserved id.
    pub(crate) fn id_hint(&self) -> u32 {
        self.next_ordinal.max(MIN_PROPERTY_ID)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.as_deref() == Some(name))
    }
}
