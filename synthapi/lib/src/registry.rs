//! Registry of known APIs and their initialization status.
//!
//! Storage sits behind the [`RegistryStore`] trait so the JSON file backend
//! can be swapped for a transactional store without touching callers. The
//! [`Registry`] facade implements the add / list / mark-initialized / reset
//! operations on top of any store.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::workspace::SpecWorkspace;

/// Status of one registered API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub initialized: bool,
}

/// On-disk layout: `{"apis": {<name>: {"initialized": <bool>}}}`.
#[derive(Debug, Default, Serialize)]
struct RegistryDocument {
    #[serde(default)]
    apis: BTreeMap<String, RegistryEntry>,
}

/// Trait for registry storage backends.
pub trait RegistryStore {
    /// Returns the entry for `name`, if registered.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError>;

    /// Inserts or replaces the entry for `name`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn put(&self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError>;

    /// Returns every entry, ordered by name.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list(&self) -> Result<BTreeMap<String, RegistryEntry>, RegistryError>;

    /// Removes every entry.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<(), RegistryError>;
}

/// JSON file registry storage.
///
/// The whole file is rewritten on every mutation while an exclusive `fs2`
/// lock is held. A missing or unparsable file reads as an empty registry;
/// ill-typed entries are skipped.
#[derive(Debug, Clone)]
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the path to the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decodes each entry on its own so one ill-typed entry does not cost
    /// the rest of the registry.
    fn parse(&self, contents: &[u8]) -> RegistryDocument {
        if contents.iter().all(u8::is_ascii_whitespace) {
            return RegistryDocument::default();
        }

        let value: Value = match serde_json::from_slice(contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Registry file {} is corrupt ({}); treating it as empty",
                    self.path.display(),
                    e
                );
                return RegistryDocument::default();
            }
        };

        let apis = match value.get("apis") {
            Some(Value::Object(apis)) => apis,
            None => return RegistryDocument::default(),
            Some(_) => {
                warn!(
                    "Registry file {} has no `apis` object; treating it as empty",
                    self.path.display()
                );
                return RegistryDocument::default();
            }
        };

        let mut document = RegistryDocument::default();
        for (name, entry) in apis {
            match RegistryEntry::deserialize(entry) {
                Ok(entry) => {
                    document.apis.insert(name.clone(), entry);
                }
                Err(e) => warn!(
                    "Skipping malformed registry entry '{}' in {} ({})",
                    name,
                    self.path.display(),
                    e
                ),
            }
        }
        document
    }

    fn read(&self) -> Result<RegistryDocument, RegistryError> {
        if !self.path.exists() {
            return Ok(RegistryDocument::default());
        }

        let mut file = File::open(&self.path)?;
        file.lock_shared().map_err(|_| RegistryError::Lock)?;

        let mut contents = Vec::new();
        let read = file.read_to_end(&mut contents);

        file.unlock().map_err(|_| RegistryError::Lock)?;
        read?;

        Ok(self.parse(&contents))
    }

    /// Applies `change` to the document under an exclusive lock and rewrites
    /// the file.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut RegistryDocument) -> T,
    ) -> Result<T, RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        file.lock_exclusive().map_err(|_| RegistryError::Lock)?;
        let result = self.rewrite(&mut file, change);
        file.unlock().map_err(|_| RegistryError::Lock)?;

        result
    }

    fn rewrite<T>(
        &self,
        file: &mut File,
        change: impl FnOnce(&mut RegistryDocument) -> T,
    ) -> Result<T, RegistryError> {
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut document = self.parse(&contents);
        let result = change(&mut document);

        let json = serde_json::to_string_pretty(&document)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{json}")?;
        file.flush()?;

        Ok(result)
    }
}

impl RegistryStore for JsonFileRegistryStore {
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.read()?.apis.get(name).copied())
    }

    fn put(&self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError> {
        self.mutate(|doc| {
            doc.apis.insert(name.to_string(), entry);
        })
    }

    fn list(&self) -> Result<BTreeMap<String, RegistryEntry>, RegistryError> {
        Ok(self.read()?.apis)
    }

    fn clear(&self) -> Result<(), RegistryError> {
        self.mutate(|doc| doc.apis.clear())
    }
}

/// In-memory registry storage, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.entries().get(name).copied())
    }

    fn put(&self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError> {
        self.entries().insert(name.to_string(), entry);
        Ok(())
    }

    fn list(&self) -> Result<BTreeMap<String, RegistryEntry>, RegistryError> {
        Ok(self.entries().clone())
    }

    fn clear(&self) -> Result<(), RegistryError> {
        self.entries().clear();
        Ok(())
    }
}

/// Returns `true` for names that are non-empty and contain no whitespace.
pub fn is_valid_api_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

/// API registry operations over a [`RegistryStore`].
///
/// ## Examples
///
/// ```
/// use synthapi_lib::{MemoryRegistryStore, Registry};
///
/// let registry = Registry::new(MemoryRegistryStore::new());
/// registry.add("yelp").unwrap();
/// assert_eq!(registry.list_available().unwrap(), vec!["yelp".to_string()]);
///
/// assert!(registry.mark_initialized("yelp").unwrap());
/// assert!(registry.list_available().unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct Registry<S> {
    store: S,
}

impl<S: RegistryStore> Registry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers `name` as not yet initialized.
    ///
    /// Adding a name that is already present is a no-op and returns `false`.
    ///
    /// ## Errors
    ///
    /// Returns [`RegistryError::InvalidName`] for empty names or names with
    /// whitespace, or a storage error.
    pub fn add(&self, name: &str) -> Result<bool, RegistryError> {
        if !is_valid_api_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.store.get(name)?.is_some() {
            debug!("API {} is already registered", name);
            return Ok(false);
        }
        self.store.put(name, RegistryEntry::default())?;
        info!("Registered API {}", name);
        Ok(true)
    }

    /// Names of registered APIs that have not been initialized.
    pub fn list_available(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|(_, entry)| !entry.initialized)
            .map(|(name, _)| name)
            .collect())
    }

    /// Every registered API with its initialization flag.
    pub fn list_all(&self) -> Result<BTreeMap<String, bool>, RegistryError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|(name, entry)| (name, entry.initialized))
            .collect())
    }

    /// Returns the initialization flag of `name`, or `None` if unregistered.
    pub fn status(&self, name: &str) -> Result<Option<bool>, RegistryError> {
        Ok(self.store.get(name)?.map(|entry| entry.initialized))
    }

    /// Marks `name` as initialized. Returns `false` if it is not registered.
    pub fn mark_initialized(&self, name: &str) -> Result<bool, RegistryError> {
        if self.store.get(name)?.is_none() {
            return Ok(false);
        }
        self.store.put(name, RegistryEntry { initialized: true })?;
        info!("Marked API {} as initialized", name);
        Ok(true)
    }

    /// Clears every entry and deletes all generated specification files.
    ///
    /// Returns the number of files removed.
    pub fn reset(&self, workspace: &SpecWorkspace) -> Result<usize, RegistryError> {
        self.store.clear()?;
        let removed = workspace.clear()?;
        info!("Registry reset, removed {} generated files", removed);
        Ok(removed)
    }
}
