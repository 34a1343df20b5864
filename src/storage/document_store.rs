//! Embedded document store backing a single save file.
//!
//! A store file holds named collections of documents. The whole file is read
//! on open and rewritten atomically on flush (temp file in the same
//! directory, then rename), so a crashed save never leaves a torn file.

use crate::core::{Document, Result, SaveLoadError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Field used as record identity by [`Collection::upsert`].
pub const ID_FIELD: &str = "_id";

const STORE_FORMAT_VERSION: u16 = 1;

/// Equality predicates over a document's top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    All,
    Eq(String, Value),
}

impl Query {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq(field.into(), value.into())
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Query::All => true,
            Query::Eq(field, expected) => document.get(field) == Some(expected),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    records: Vec<Document>,
}

impl Collection {
    pub fn find_one(&self, query: &Query) -> Option<&Document> {
        self.records.iter().find(|doc| query.matches(doc))
    }

    pub fn find_all(&self) -> &[Document] {
        &self.records
    }

    pub fn exists(&self, query: &Query) -> bool {
        self.find_one(query).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts the document, replacing a stored document with the same `_id`.
    /// Returns `true` if an existing record was replaced.
    pub fn upsert(&mut self, document: Document) -> bool {
        if let Some(id) = document.get(ID_FIELD) {
            if let Some(slot) = self
                .records
                .iter_mut()
                .find(|existing| existing.get(ID_FIELD) == Some(id))
            {
                *slot = document;
                return true;
            }
        }
        self.records.push(document);
        false
    }

    /// Upserts each document and returns how many were newly inserted.
    pub fn upsert_many<I: IntoIterator<Item = Document>>(&mut self, documents: I) -> usize {
        let mut inserted = 0;
        for document in documents {
            if !self.upsert(document) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Deletes every matching record and returns how many were removed.
    pub fn delete(&mut self, query: &Query) -> usize {
        let before = self.records.len();
        self.records.retain(|doc| !query.matches(doc));
        before - self.records.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    format_version: u16,
    collections: BTreeMap<String, Collection>,
}

/// An open store file. Changes stay in memory until [`DocumentStore::close`].
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    collections: BTreeMap<String, Collection>,
    dirty: bool,
}

impl DocumentStore {
    /// Opens the store at `path`. A missing file opens as an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            let mut file = File::open(&path)
                .map_err(|e| SaveLoadError::store_io("Failed to open save file", e))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| SaveLoadError::store_io("Failed to read save file", e))?;
            let stored: StoreFile = rmp_serde::from_slice(&data)
                .map_err(|e| SaveLoadError::store_io("Failed to decode save file", e))?;
            if stored.format_version != STORE_FORMAT_VERSION {
                return Err(SaveLoadError::StoreIoFailed(format!(
                    "Unsupported save file format version {}",
                    stored.format_version
                )));
            }
            stored.collections
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            collections,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Mutable access to a collection, creating it if needed. Marks the store dirty.
    pub fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.dirty = true;
        self.collections.entry(name.to_string()).or_default()
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Writes pending changes, if any, and releases the store.
    pub fn close(self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write_atomically()
    }

    fn write_atomically(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| SaveLoadError::store_io("Failed to create save directory", e))?;

        let stored = StoreFile {
            format_version: STORE_FORMAT_VERSION,
            collections: self.collections.clone(),
        };
        let serialized = rmp_serde::to_vec_named(&stored)
            .map_err(|e| SaveLoadError::store_io("Failed to encode save file", e))?;

        let temp = NamedTempFile::new_in(&parent)
            .map_err(|e| SaveLoadError::store_io("Failed to create temp file", e))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer
                .write_all(&serialized)
                .map_err(|e| SaveLoadError::store_io("Failed to write save file", e))?;
            writer
                .flush()
                .map_err(|e| SaveLoadError::store_io("Failed to flush save file", e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| SaveLoadError::store_io("Failed to sync save file", e))?;
        temp.persist(&self.path)
            .map_err(|e| SaveLoadError::store_io("Failed to replace save file", e))?;
        Ok(())
    }
}
