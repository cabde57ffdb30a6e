//! In-process store with KV v2 listing semantics.
//!
//! Every write appends a version; listings are derived from the stored paths
//! the way Vault derives them from metadata, so an intermediate node exists
//! only while some secret lives below it.

use crate::error::StoreResult;
use crate::path::RelPath;
use crate::store::{KvStore, Listing, Secret, SecretData, WriteReceipt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Versions = Vec<SecretData>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    mounts: Mutex<BTreeMap<String, BTreeMap<RelPath, Versions>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret, returning the version it was stored as.
    pub fn insert(&self, mount: &str, path: impl Into<RelPath>, data: SecretData) -> u64 {
        self.append(mount, path.into(), data)
    }

    pub fn latest(&self, mount: &str, path: impl Into<RelPath>) -> Option<SecretData> {
        let path = path.into();
        self.lock()
            .get(mount_key(mount))
            .and_then(|paths| paths.get(&path))
            .and_then(|versions| versions.last().cloned())
    }

    pub fn version_count(&self, mount: &str, path: impl Into<RelPath>) -> usize {
        let path = path.into();
        self.lock()
            .get(mount_key(mount))
            .and_then(|paths| paths.get(&path))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every secret path stored under `mount`, sorted.
    pub fn paths(&self, mount: &str) -> Vec<RelPath> {
        self.lock()
            .get(mount_key(mount))
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest field mapping of every secret under `mount`.
    pub fn snapshot(&self, mount: &str) -> BTreeMap<RelPath, SecretData> {
        self.lock()
            .get(mount_key(mount))
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|(path, versions)| {
                        versions.last().map(|data| (path.clone(), data.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn append(&self, mount: &str, path: RelPath, data: SecretData) -> u64 {
        let mut guard = self.lock();
        let versions = guard
            .entry(mount_key(mount).to_string())
            .or_default()
            .entry(path)
            .or_default();
        versions.push(data);
        versions.len() as u64
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<RelPath, Versions>>> {
        self.mounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for MemoryStore {
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        let guard = self.lock();
        let Some(paths) = guard.get(mount_key(mount)) else {
            return Ok(None);
        };
        let mut children = BTreeSet::new();
        for stored in paths.keys() {
            let mut segments = stored.segments();
            if !path.segments().all(|parent| segments.next() == Some(parent)) {
                continue;
            }
            let Some(child) = segments.next() else {
                continue;
            };
            if segments.next().is_some() {
                children.insert(format!("{child}/"));
            } else {
                children.insert(child.to_string());
            }
        }
        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(Listing::from_keys(children)))
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        let guard = self.lock();
        Ok(guard
            .get(mount_key(mount))
            .and_then(|paths| paths.get(path))
            .and_then(|versions| {
                versions
                    .last()
                    .map(|data| Secret::new(data.clone()).with_version(versions.len() as u64))
            }))
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        let version = self.append(mount, path.clone(), data.clone());
        Ok(Some(WriteReceipt { version }))
    }
}

fn mount_key(mount: &str) -> &str {
    mount.trim_matches('/')
}
