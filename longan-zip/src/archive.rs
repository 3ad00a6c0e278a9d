//! In-memory model of a decoded container.

use crate::errors::{ErrorKind, Result};
use crate::headers::CompressionMethod;
use std::collections::HashMap;

/// One named part of a container, held decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    data: Vec<u8>,
    original_uncompressed_len: u64,
    method: Option<CompressionMethod>,
}

impl Entry {
    /// Create an entry that did not come from a decoded container.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let original_uncompressed_len = data.len() as u64;
        Self {
            name: name.into(),
            data,
            original_uncompressed_len,
            method: None,
        }
    }

    pub(crate) fn decoded(name: String, data: Vec<u8>, method: CompressionMethod) -> Self {
        let original_uncompressed_len = data.len() as u64;
        Self {
            name,
            data,
            original_uncompressed_len,
            method: Some(method),
        }
    }

    /// Entry name, e.g. `word/document.xml`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decompressed payload.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the payload.
    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Replace the payload.
    #[inline]
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Consume the entry, returning its payload.
    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Uncompressed length declared when the entry was decoded (or created).
    #[inline]
    pub fn original_uncompressed_len(&self) -> u64 {
        self.original_uncompressed_len
    }

    /// Compression method the entry was stored with, if it was decoded.
    #[inline]
    pub fn method(&self) -> Option<CompressionMethod> {
        self.method
    }

    /// Whether the entry is a directory marker (`name` ends with `/`).
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Ordered collection of uniquely named entries.
///
/// Insertion order is preserved and is the order entries are encoded in.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, failing if the name is already present.
    ///
    /// A leading `/` is dropped from the name, as in [`Archive::insert`].
    pub fn push(&mut self, mut entry: Entry) -> Result<()> {
        if let Some(name) = entry.name.strip_prefix('/') {
            entry.name = name.to_string();
        }
        if self.index.contains_key(entry.name()) {
            return Err(ErrorKind::DuplicateEntry(entry.name).into());
        }
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Insert or replace an entry's payload.
    ///
    /// Replacing keeps the entry at its original position.
    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        let name = normalize(name);
        match self.index.get(name) {
            Some(&i) => self.entries[i].set_data(data),
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(Entry::new(name, data));
            },
        }
    }

    /// Remove an entry by name, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        let i = self.index.remove(normalize(name))?;
        let entry = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(entry)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(normalize(name))
    }

    /// Look up an entry. A leading `/` on `name` is ignored.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.index.get(normalize(name)).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entry> {
        match self.index.get(normalize(name)) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Payload of the named entry, or `FileNotFound`.
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        self.get(name)
            .map(Entry::data)
            .ok_or_else(|| ErrorKind::FileNotFound(normalize(name).to_string()).into())
    }

    /// Entry names in encoding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Entry::name)
    }

    /// Entries in encoding order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Consume the archive, returning its entries in order.
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

#[inline]
fn normalize(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_position() {
        let mut archive = Archive::new();
        archive.insert("[Content_Types].xml", b"<Types/>".to_vec());
        archive.insert("word/document.xml", b"<w:document/>".to_vec());
        archive.insert("/[Content_Types].xml", b"<Types></Types>".to_vec());

        let names: Vec<_> = archive.names().collect();
        assert_eq!(names, ["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(archive.read("[Content_Types].xml").unwrap(), b"<Types></Types>");
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut archive = Archive::new();
        archive.push(Entry::new("a.xml", Vec::new())).unwrap();
        let err = archive.push(Entry::new("a.xml", Vec::new())).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateEntry(name) if name == "a.xml"));
    }

    #[test]
    fn test_push_normalizes_leading_slash() {
        let mut archive = Archive::new();
        archive.push(Entry::new("/word/document.xml", b"<w:document/>".to_vec())).unwrap();

        assert_eq!(archive.names().collect::<Vec<_>>(), ["word/document.xml"]);
        assert_eq!(archive.read("word/document.xml").unwrap(), b"<w:document/>");
        assert!(archive.contains("/word/document.xml"));

        let err = archive.push(Entry::new("word/document.xml", Vec::new())).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateEntry(_)));
    }

    #[test]
    fn test_remove_reindexes() {
        let mut archive = Archive::new();
        archive.insert("a", b"1".to_vec());
        archive.insert("b", b"2".to_vec());
        archive.insert("c", b"3".to_vec());

        let removed = archive.remove("/a").unwrap();
        assert_eq!(removed.data(), b"1");
        assert_eq!(archive.read("c").unwrap(), b"3");
        assert!(archive.get("a").is_none());
        assert!(matches!(
            archive.read("a").unwrap_err().kind(),
            ErrorKind::FileNotFound(_)
        ));
    }

    #[test]
    fn test_directory_entries() {
        let entry = Entry::new("word/", Vec::new());
        assert!(entry.is_dir());
        assert_eq!(entry.original_uncompressed_len(), 0);
        assert_eq!(entry.method(), None);
    }
}
