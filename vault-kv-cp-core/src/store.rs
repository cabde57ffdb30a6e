use crate::error::{ListingShapeError, StoreResult};
use crate::path::RelPath;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field mapping held by a secret. Passed through the copy untouched.
pub type SecretData = Map<String, Value>;

/// Latest version of a secret as returned by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Secret {
    pub data: SecretData,
    pub version: Option<u64>,
}

impl Secret {
    pub fn new(data: SecretData) -> Self {
        Self {
            data,
            version: None,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Confirmation that a store accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub version: u64,
}

/// Payload of a successful list request.
///
/// Stores hand back the raw `data` object; nothing about its shape is
/// trusted until [`Listing::child_names`] has checked it.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    data: Value,
}

impl Listing {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// Build a well-formed listing from child names.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|key| Value::String(key.into()))
            .collect();
        let mut data = Map::new();
        data.insert("keys".into(), Value::Array(keys));
        Self::new(Value::Object(data))
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Child names in store order, directory markers included (`db/`).
    pub fn child_names(&self) -> Result<Vec<&str>, ListingShapeError> {
        let data = self
            .data
            .as_object()
            .ok_or(ListingShapeError::MissingData)?;
        let keys = data.get("keys").ok_or(ListingShapeError::MissingKeys)?;
        let keys = keys.as_array().ok_or(ListingShapeError::KeysNotArray)?;
        keys.iter()
            .enumerate()
            .map(|(index, key)| {
                let name = key.as_str().ok_or_else(|| ListingShapeError::NonStringKey {
                    index,
                    value: key.to_string(),
                })?;
                if is_plain_name(name) {
                    Ok(name)
                } else {
                    Err(ListingShapeError::InvalidKey {
                        index,
                        value: name.to_string(),
                    })
                }
            })
            .collect()
    }
}

// A single segment, optionally carrying a trailing directory marker. Anything
// else would make the joined child path collapse onto its parent or escape it.
fn is_plain_name(name: &str) -> bool {
    let name = name.strip_suffix('/').unwrap_or(name);
    !name.is_empty() && !name.contains('/') && name != "." && name != ".."
}

/// Capability bound to one secret store.
///
/// `list` answers `None` when there is no intermediate node at `path`, which
/// is the only signal that `path` is a leaf secret. `get_latest` answers
/// `None` when nothing is readable there and `put` answers `None` when the
/// store accepted the request without confirming a new version.
pub trait KvStore: Send + Sync {
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>>;
    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>>;
    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>>;
}

impl<T> KvStore for &T
where
    T: KvStore + ?Sized,
{
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        (**self).list(mount, path)
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        (**self).get_latest(mount, path)
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        (**self).put(mount, path, data)
    }
}

impl<T> KvStore for Box<T>
where
    T: KvStore + ?Sized,
{
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        (**self).list(mount, path)
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        (**self).get_latest(mount, path)
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        (**self).put(mount, path, data)
    }
}

impl<T> KvStore for Arc<T>
where
    T: KvStore + ?Sized,
{
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        (**self).list(mount, path)
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        (**self).get_latest(mount, path)
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        (**self).put(mount, path, data)
    }
}

/// A store handle paired with the mount it is used under.
pub struct Endpoint<'a, S: ?Sized> {
    pub store: &'a S,
    pub mount: &'a str,
}

impl<'a, S: ?Sized> Endpoint<'a, S> {
    pub fn new(store: &'a S, mount: &'a str) -> Self {
        Self { store, mount }
    }
}

impl<S: ?Sized> Clone for Endpoint<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Endpoint<'_, S> {}
