use crate::error::{Error, Result};
use crate::path::RelPath;
use crate::store::{Endpoint, KvStore, WriteReceipt};
use tracing::info;

/// Copy the latest version of one secret from `source` to `destination`.
///
/// The field mapping is written verbatim as a new version, replacing whatever
/// the destination held at that path.
pub fn copy_secret<S, D>(
    source: Endpoint<'_, S>,
    source_path: &RelPath,
    destination: Endpoint<'_, D>,
    destination_path: &RelPath,
) -> Result<WriteReceipt>
where
    S: KvStore + ?Sized,
    D: KvStore + ?Sized,
{
    info!(
        source_mount = source.mount,
        source_path = %source_path,
        destination_mount = destination.mount,
        destination_path = %destination_path,
        "copying secret"
    );

    let secret = source
        .store
        .get_latest(source.mount, source_path)
        .map_err(|err| Error::Read {
            path: source_path.clone(),
            source: err,
        })?
        .ok_or_else(|| Error::MissingSecret {
            path: source_path.clone(),
        })?;

    destination
        .store
        .put(destination.mount, destination_path, &secret.data)
        .map_err(|err| Error::Write {
            path: destination_path.clone(),
            source: err,
        })?
        .ok_or_else(|| Error::Unconfirmed {
            path: destination_path.clone(),
        })
}
