//! Versioned, read-only view of collection and field metadata.
//!
//! Readers take an [`Arc<RegistrySnapshot>`] and keep using it for as long as
//! they like. Reloads build the replacement entry outside the lock and then
//! swap a new snapshot in under a short write lock, so a reader sees either
//! the old entry or the new one, never a partial field list.

use crate::config::RegistryConfig;
use crate::db_operations::MetadataStore;
use crate::error::RectusResult;
use crate::schema::types::{Collection, Field};
use log::{debug, info, warn};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A collection with all of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionEntry {
    pub collection: Collection,
    pub fields: BTreeMap<String, Field>,
}

impl CollectionEntry {
    pub fn new(collection: Collection, fields: Vec<Field>) -> Self {
        Self {
            collection,
            fields: fields.into_iter().map(|f| (f.field.clone(), f)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.collection.collection
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Fields backed by a physical column.
    pub fn physical_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| !f.is_virtual())
    }
}

/// Immutable registry state at one version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    version: u64,
    collections: BTreeMap<String, Arc<CollectionEntry>>,
}

impl RegistrySnapshot {
    pub fn new(version: u64, entries: Vec<CollectionEntry>) -> Self {
        Self {
            version,
            collections: entries
                .into_iter()
                .map(|e| (e.name().to_string(), Arc::new(e)))
                .collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<CollectionEntry>> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<CollectionEntry>> {
        self.collections.values()
    }

    pub fn field(&self, collection: &str, field: &str) -> Option<&Field> {
        self.collection(collection).and_then(|e| e.field(field))
    }

    /// Fields of any collection whose foreign key targets `collection`, and
    /// `column` when given.
    pub fn relations_to(&self, collection: &str, column: Option<&str>) -> Vec<&Field> {
        self.collections
            .values()
            .flat_map(|e| e.fields.values())
            .filter(|f| {
                f.foreign_key().map_or(false, |fk| {
                    fk.table == collection && column.map_or(true, |c| fk.column == c)
                })
            })
            .collect()
    }

    fn with_entries(&self, entries: Vec<(String, Option<CollectionEntry>)>) -> Self {
        let mut collections = self.collections.clone();
        for (name, entry) in entries {
            match entry {
                Some(entry) => {
                    collections.insert(name, Arc::new(entry));
                }
                None => {
                    collections.remove(&name);
                }
            }
        }
        Self {
            version: self.version + 1,
            collections,
        }
    }
}

/// Bounded exponential backoff with jitter for registry reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        (capped + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for RetryPolicy {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            max_attempts: config.reload_max_attempts.max(1),
            base_delay: Duration::from_millis(config.reload_base_delay_millis),
            max_delay: Duration::from_millis(config.reload_max_delay_millis),
        }
    }
}

/// Cache of all collection metadata, rebuilt from the metadata store.
pub struct CollectionRegistry {
    store: Arc<dyn MetadataStore>,
    current: RwLock<Arc<RegistrySnapshot>>,
    retry: RetryPolicy,
}

impl CollectionRegistry {
    /// Builds the registry from every collection in `store`.
    pub fn load(store: Arc<dyn MetadataStore>, retry: RetryPolicy) -> RectusResult<Self> {
        let registry = Self {
            store,
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            retry,
        };
        registry.reload_all()?;
        Ok(registry)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get_collection(&self, name: &str) -> Option<Arc<CollectionEntry>> {
        self.snapshot().collection(name).cloned()
    }

    pub fn list_collections(&self) -> Vec<Arc<CollectionEntry>> {
        self.snapshot().collections().cloned().collect()
    }

    pub fn get_field(&self, collection: &str, field: &str) -> Option<Field> {
        self.snapshot().field(collection, field).cloned()
    }

    /// Re-reads one collection and swaps it into a new snapshot. A collection
    /// that no longer exists is removed.
    pub fn reload_collection(&self, name: &str) -> RectusResult<Arc<RegistrySnapshot>> {
        self.reload_collections(&[name])
    }

    /// Re-reads several collections and swaps all of them in with a single
    /// snapshot, so readers never see one updated without the others.
    pub fn reload_collections(&self, names: &[&str]) -> RectusResult<Arc<RegistrySnapshot>> {
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let entry = self.with_retry(name, || {
                let Some(collection) = self.store.load_collection(name)? else {
                    return Ok(None);
                };
                let fields = self.store.load_fields(name)?;
                Ok(Some(CollectionEntry::new(collection, fields)))
            })?;
            entries.push((name.to_string(), entry));
        }

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(guard.with_entries(entries));
        *guard = Arc::clone(&next);
        debug!(
            "Registry reloaded {} at version {}",
            names.join(", "),
            next.version()
        );
        Ok(next)
    }

    /// Rebuilds the whole registry.
    pub fn reload_all(&self) -> RectusResult<Arc<RegistrySnapshot>> {
        let entries = self.with_retry("*", || {
            self.store
                .load_collections()?
                .into_iter()
                .map(|c| {
                    let fields = self.store.load_fields(&c.collection)?;
                    Ok(CollectionEntry::new(c, fields))
                })
                .collect::<RectusResult<Vec<_>>>()
        })?;

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(RegistrySnapshot::new(guard.version() + 1, entries));
        *guard = Arc::clone(&next);
        info!(
            "Registry loaded {} collections at version {}",
            next.collections.len(),
            next.version()
        );
        Ok(next)
    }

    /// Runs a read, retrying transient failures.
    fn with_retry<T, F>(&self, target: &str, read: F) -> RectusResult<T>
    where
        F: Fn() -> RectusResult<T>,
    {
        let mut attempt = 1;
        loop {
            match read() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "Registry read of '{}' failed on attempt {} ({}), retrying in {:?}",
                        target, attempt, e, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
