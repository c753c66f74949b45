//! Single-file container.
//!
//! A document is one file: a CRC-checked header page holding the magic
//! number, format version, and property-set directory, followed by one
//! page-aligned stream per property set. Each stream carries the fixed
//! property-set record layout: byte-order marker, stream version, one
//! section with a (property-id, offset) table, the name dictionary at
//! reserved id 0, the codepage record at reserved id 1, and the 4-byte
//! aligned variant records.
//!
//! The whole image is read on open and rewritten on commit, followed by
//! `sync_data`; property sets are small, so no incremental update is
//! attempted. A zero-length file is a valid empty container, which lets a
//! store adopt a freshly created document file.
//!
//! Cross-process sharing uses OS advisory locks: shared for loads, exclusive
//! for mutations, released when the last handle on the file drops. A lock
//! that cannot be acquired immediately surfaces as `SharingViolation`.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use super::table::PropertyTable;
use super::{
    AccessMode, CODEPAGE_ID, ContainerStorage, DICTIONARY_ID, PropertySetStorage, RootStorage,
    StatCursor, StatList, StorageError,
};
use crate::spec::PropertySpec;
use crate::variant::vt;

/// Magic number identifying a property container file.
///
/// The sequence includes DOS/Unix line ending detection bytes (0x1A, 0x0A)
/// to help detect text-mode corruption.
pub const MAGIC_NUMBER: [u8; 8] = *b"dprops\x1A\x0A";

/// Current format version for the header page.
pub const FORMAT_VERSION: u8 = 1;

/// Size of one page in bytes (4KB). The header must fit within a single page.
pub(crate) const PAGE_SIZE: usize = 4096;

/// Directory entry size: set id (16) | offset (8) | length (8) | CRC32 (4).
const DIRECTORY_ENTRY_LEN: usize = 36;

/// Offset of the set directory within the header page, after
/// magic (8) | version (1) | reserved (3) | set count (4).
const DIRECTORY_OFFSET: usize = 16;

/// Byte-order marker opening every property-set stream.
const BYTE_ORDER_MARKER: u16 = 0xfffe;

/// Property-set stream format version.
const STREAM_VERSION: u16 = 0;

/// Unicode codepage stored in every written stream's codepage record.
const CODEPAGE_UNICODE: u16 = 1200;

fn corrupted(msg: impl Into<String>) -> StorageError {
    StorageError::Corrupted(msg.into())
}

/// File-backed container storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileContainer;

impl FileContainer {
    pub fn new() -> Self {
        FileContainer
    }
}

impl ContainerStorage for FileContainer {
    fn open_root(
        &self,
        path: &Path,
        mode: AccessMode,
    ) -> Result<Box<dyn RootStorage>, StorageError> {
        let file = match mode {
            AccessMode::ReadShared => OpenOptions::new().read(true).open(path),
            AccessMode::ReadWriteExclusive => OpenOptions::new().read(true).write(true).open(path),
        }
        .map_err(StorageError::from)?;

        let locked = match mode {
            AccessMode::ReadShared => file.try_lock_shared(),
            AccessMode::ReadWriteExclusive => file.try_lock(),
        };
        match locked {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(StorageError::SharingViolation),
            Err(TryLockError::Error(err)) => return Err(StorageError::from(err)),
        }

        let mut data = Vec::new();
        (&file).read_to_end(&mut data).map_err(StorageError::from)?;
        let image = DocumentImage::from_bytes(&data)?;
        Ok(Box::new(FileRoot {
            file: Arc::new(file),
            mode,
            image,
        }))
    }
}

/// An open document file. The advisory lock is released when the last handle
/// sharing the [`File`] drops.
#[derive(Debug)]
struct FileRoot {
    file: Arc<File>,
    mode: AccessMode,
    image: DocumentImage,
}

impl RootStorage for FileRoot {
    fn open_property_set(&self, set_id: Uuid) -> Result<Box<dyn PropertySetStorage>, StorageError> {
        let table = self.image.get(set_id).ok_or(StorageError::NotFound)?.clone();
        Ok(Box::new(FileSet {
            file: Arc::clone(&self.file),
            image: self.image.clone(),
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
        let table = self.image.get(set_id).cloned().unwrap_or_default();
        Ok(Box::new(FileSet {
            file: Arc::clone(&self.file),
            image: self.image.clone(),
            set_id,
            table,
            writable: true,
        }))
    }
}

/// A property-set handle working on a private copy of the table; commit
/// rewrites the document image, dropping without commit discards the copy.
struct FileSet {
    file: Arc<File>,
    image: DocumentImage,
    set_id: Uuid,
    table: PropertyTable,
    writable: bool,
}

impl PropertySetStorage for FileSet {
    fn enum_stats(&self) -> Result<Box<dyn StatCursor>, StorageError> {
        Ok(Box::new(StatList::new(self.table.stats(true))))
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
        self.image.put(self.set_id, self.table.clone());
        let bytes = self.image.to_bytes()?;
        let mut file = &*self.file;
        file.seek(SeekFrom::Start(0)).map_err(StorageError::from)?;
        file.write_all(&bytes).map_err(StorageError::from)?;
        file.set_len(bytes.len() as u64).map_err(StorageError::from)?;
        file.sync_data().map_err(StorageError::from)?;
        Ok(())
    }
}

/// Parsed document: header directory plus one table per property set, in
/// directory order.
#[derive(Debug, Clone, Default)]
struct DocumentImage {
    sets: Vec<(Uuid, PropertyTable)>,
}

impl DocumentImage {
    fn get(&self, set_id: Uuid) -> Option<&PropertyTable> {
        self.sets
            .iter()
            .find(|(id, _)| *id == set_id)
            .map(|(_, table)| table)
    }

    fn put(&mut self, set_id: Uuid, table: PropertyTable) {
        match self.sets.iter_mut().find(|(id, _)| *id == set_id) {
            Some((_, existing)) => *existing = table,
            None => self.sets.push((set_id, table)),
        }
    }

    /// Parses a whole container file. A zero-length image is an empty
    /// container.
    ///
    /// # Errors
    ///
    /// `Corrupted` on a bad magic number, unknown version, checksum
    /// mismatch, or a directory entry pointing outside the file.
    fn from_bytes(data: &[u8]) -> Result<Self, StorageError> {
        if data.is_empty() {
            return Ok(DocumentImage::default());
        }
        if data.len() < PAGE_SIZE {
            return Err(corrupted("file too short for a header page"));
        }
        if data[0..MAGIC_NUMBER.len()] != MAGIC_NUMBER {
            return Err(corrupted("not a property container file: bad magic number"));
        }
        let version = data[MAGIC_NUMBER.len()];
        if version > FORMAT_VERSION {
            return Err(corrupted(format!("unsupported format version {version}")));
        }

        // Validate the header checksum before parsing the directory.
        let stored_crc = u32::from_le_bytes(
            data[PAGE_SIZE - 4..PAGE_SIZE]
                .try_into()
                .expect("slice length is 4"),
        );
        let computed_crc = crc32fast::hash(&data[0..PAGE_SIZE - 4]);
        if stored_crc != computed_crc {
            return Err(corrupted(format!(
                "header checksum mismatch: expected {stored_crc:#x}, got {computed_crc:#x}"
            )));
        }

        let set_count = u32::from_le_bytes(
            data[12..16].try_into().expect("slice length is 4"),
        ) as usize;
        if DIRECTORY_OFFSET + set_count * DIRECTORY_ENTRY_LEN > PAGE_SIZE - 4 {
            return Err(corrupted(format!("set count {set_count} exceeds the header page")));
        }

        let mut sets = Vec::with_capacity(set_count);
        for index in 0..set_count {
            let entry = &data[DIRECTORY_OFFSET + index * DIRECTORY_ENTRY_LEN..];
            let set_id = Uuid::from_bytes(
                entry[0..16].try_into().expect("slice length is 16"),
            );
            let offset =
                u64::from_le_bytes(entry[16..24].try_into().expect("slice length is 8")) as usize;
            let length =
                u64::from_le_bytes(entry[24..32].try_into().expect("slice length is 8")) as usize;
            let stream_crc = u32::from_le_bytes(entry[32..36].try_into().expect("slice length is 4"));

            let end = offset
                .checked_add(length)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| corrupted("property-set stream extends past end of file"))?;
            let stream = &data[offset..end];
            let computed = crc32fast::hash(stream);
            if stream_crc != computed {
                return Err(corrupted(format!(
                    "stream checksum mismatch for set {set_id}"
                )));
            }
            sets.push((set_id, parse_stream(stream)?));
        }
        Ok(DocumentImage { sets })
    }

    /// Serializes the header page and one page-aligned stream per set.
    fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        if DIRECTORY_OFFSET + self.sets.len() * DIRECTORY_ENTRY_LEN > PAGE_SIZE - 4 {
            return Err(corrupted("too many property sets for the header page"));
        }

        let mut image = vec![0u8; PAGE_SIZE];
        image[0..MAGIC_NUMBER.len()].copy_from_slice(&MAGIC_NUMBER);
        image[MAGIC_NUMBER.len()] = FORMAT_VERSION;
        image[12..16].copy_from_slice(&(self.sets.len() as u32).to_le_bytes());

        for (index, (set_id, table)) in self.sets.iter().enumerate() {
            let stream = stream_to_bytes(table);
            let offset = image.len();
            let entry_at = DIRECTORY_OFFSET + index * DIRECTORY_ENTRY_LEN;
            image[entry_at..entry_at + 16].copy_from_slice(set_id.as_bytes());
            image[entry_at + 16..entry_at + 24]
                .copy_from_slice(&(offset as u64).to_le_bytes());
            image[entry_at + 24..entry_at + 32]
                .copy_from_slice(&(stream.len() as u64).to_le_bytes());
            image[entry_at + 32..entry_at + 36]
                .copy_from_slice(&crc32fast::hash(&stream).to_le_bytes());

            image.extend_from_slice(&stream);
            while image.len() % PAGE_SIZE != 0 {
                image.push(0);
            }
        }

        let crc = crc32fast::hash(&image[0..PAGE_SIZE - 4]);
        image[PAGE_SIZE - 4..PAGE_SIZE].copy_from_slice(&crc.to_le_bytes());
        Ok(image)
    }
}

/// Serializes one property set: byte-order marker, stream version, then the
/// section with its (id, offset) table followed by the payloads. Offsets are
/// relative to the section start.
fn stream_to_bytes(table: &PropertyTable) -> Vec<u8> {
    let mut entries: Vec<(u32, Vec<u8>)> = vec![
        (DICTIONARY_ID, dictionary_to_bytes(table)),
        (CODEPAGE_ID, codepage_record()),
    ];
    for (id, record) in table.records() {
        entries.push((id, record.to_vec()));
    }

    let mut stream = Vec::new();
    stream.extend_from_slice(&BYTE_ORDER_MARKER.to_le_bytes());
    stream.extend_from_slice(&STREAM_VERSION.to_le_bytes());

    // Section: count, offset table, payloads.
    stream.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    let mut payload_offset = 4 + 8 * entries.len();
    for (id, payload) in &entries {
        stream.extend_from_slice(&id.to_le_bytes());
        stream.extend_from_slice(&(payload_offset as u32).to_le_bytes());
        payload_offset += payload.len();
    }
    for (_, payload) in &entries {
        stream.extend_from_slice(payload);
    }
    stream
}

fn parse_stream(stream: &[u8]) -> Result<PropertyTable, StorageError> {
    if stream.len() < 8 {
        return Err(corrupted("property-set stream too short"));
    }
    let marker = u16::from_le_bytes([stream[0], stream[1]]);
    if marker != BYTE_ORDER_MARKER {
        return Err(corrupted(format!("bad byte-order marker {marker:#06x}")));
    }
    let version = u16::from_le_bytes([stream[2], stream[3]]);
    if version > STREAM_VERSION {
        return Err(corrupted(format!("unsupported stream version {version}")));
    }

    let section = &stream[4..];
    let count = u32::from_le_bytes(section[0..4].try_into().expect("slice length is 4")) as usize;
    let table_end = 4usize
        .checked_add(count.checked_mul(8).ok_or_else(|| corrupted("offset table overflow"))?)
        .filter(|end| *end <= section.len())
        .ok_or_else(|| corrupted("offset table extends past end of stream"))?;

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let at = 4 + index * 8;
        let id = u32::from_le_bytes(section[at..at + 4].try_into().expect("slice length is 4"));
        let offset =
            u32::from_le_bytes(section[at + 4..at + 8].try_into().expect("slice length is 4"))
                as usize;
        if offset < table_end || offset > section.len() {
            return Err(corrupted(format!("record offset {offset} outside section")));
        }
        entries.push((id, offset));
    }

    // Payload lengths run from each offset to the next-larger offset.
    let mut boundaries: Vec<usize> = entries.iter().map(|(_, offset)| *offset).collect();
    boundaries.sort_unstable();
    boundaries.push(section.len());

    let mut table = PropertyTable::new();
    for (id, offset) in entries {
        let end = boundaries
            .iter()
            .find(|boundary| **boundary > offset)
            .copied()
            .unwrap_or(section.len());
        let payload = &section[offset..end];
        match id {
            DICTIONARY_ID => parse_dictionary(payload, &mut table)?,
            CODEPAGE_ID => {} // decoded codepage is always Unicode for written streams
            _ => table.insert_record(id, payload.to_vec()),
        }
    }
    Ok(table)
}

/// Dictionary payload: entry count, then (id, character count including the
/// terminator, UTF-16 name) per entry, each padded to a 4-byte boundary.
fn dictionary_to_bytes(table: &PropertyTable) -> Vec<u8> {
    let entries: Vec<(u32, &str)> = table.names().collect();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (id, name) in entries {
        let units: Vec<u16> = name.encode_utf16().collect();
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes.extend_from_slice(&((units.len() + 1) as u32).to_le_bytes());
        for unit in &units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
    }
    bytes
}

fn parse_dictionary(payload: &[u8], table: &mut PropertyTable) -> Result<(), StorageError> {
    if payload.len() < 4 {
        return Err(corrupted("dictionary payload too short"));
    }
    let count = u32::from_le_bytes(payload[0..4].try_into().expect("slice length is 4")) as usize;
    let mut at = 4;
    for _ in 0..count {
        if at + 8 > payload.len() {
            return Err(corrupted("dictionary entry truncated"));
        }
        let id = u32::from_le_bytes(payload[at..at + 4].try_into().expect("slice length is 4"));
        let unit_count =
            u32::from_le_bytes(payload[at + 4..at + 8].try_into().expect("slice length is 4"))
                as usize;
        at += 8;
        let byte_len = unit_count
            .checked_mul(2)
            .filter(|len| at + len <= payload.len())
            .ok_or_else(|| corrupted("dictionary name truncated"))?;
        let mut units: Vec<u16> = payload[at..at + byte_len]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if units.last() == Some(&0) {
            units.pop();
        }
        let name = String::from_utf16(&units)
            .map_err(|_| corrupted("dictionary name is not valid UTF-16"))?;
        table.insert_name(id, name);
        at += byte_len;
        at += (4 - at % 4) % 4;
    }
    Ok(())
}

/// Codepage record: a 16-bit integer variant holding the Unicode codepage.
fn codepage_record() -> Vec<u8> {
    let mut record = vt::I2.to_le_bytes().to_vec();
    record.extend_from_slice(&[0, 0]);
    record.extend_from_slice(&CODEPAGE_UNICODE.to_le_bytes());
    record.extend_from_slice(&[0, 0]);
    record
}
