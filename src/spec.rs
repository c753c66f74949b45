//! Property addressing.
//!
//! A property is addressed in container calls either by its dictionary name
//! or by its persisted numeric id. Loads prefer the name when the
//! enumeration entry carries one, because names survive rewrites while ids
//! are container-assigned.

use crate::container::{PropertySetStorage, PropertyStat};

/// Addresses one property in a read, write, or delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySpec {
    /// Address by dictionary name, matched case-sensitively.
    Name(String),
    /// Address by persisted numeric id.
    Id(u32),
}

/// Builds the spec for an enumeration entry: by name when the stat carries
/// one, else by persisted id.
pub(crate) fn spec_for_stat(stat: &PropertyStat) -> PropertySpec {
    match &stat.name {
        Some(name) => PropertySpec::Name(name.clone()),
        None => PropertySpec::Id(stat.id),
    }
}

/// Resolves the name for an enumeration entry.
///
/// Uses the stat's own name when present, otherwise asks the container for a
/// reverse id-to-name mapping. A missing mapping and a failed lookup both
/// yield `None`; an unnamed property is listed, not an error.
pub(crate) fn resolve_name(set: &dyn PropertySetStorage, stat: &PropertyStat) -> Option<String> {
    if let Some(name) = &stat.name {
        return Some(name.clone());
    }
    set.name_of(stat.id).ok().flatten()
}
