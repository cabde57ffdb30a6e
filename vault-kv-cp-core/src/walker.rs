use crate::copier::copy_secret;
use crate::error::{Error, Result};
use crate::path::RelPath;
use crate::store::{Endpoint, KvStore};
use tracing::{debug, warn};

/// Counters collected while walking a source tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Intermediate nodes that answered with a listing.
    pub directories: usize,
    /// Leaf secrets copied to the destination.
    pub secrets: usize,
}

/// Copy every leaf secret below `source_path` to the same relative location
/// below `destination_path`.
///
/// A path whose listing is absent is a leaf and is copied; any other path is
/// a directory whose children are visited depth first in the order the store
/// listed them. The first error of any kind stops the walk.
pub fn walk<S, D>(
    source: Endpoint<'_, S>,
    source_path: RelPath,
    destination: Endpoint<'_, D>,
    destination_path: RelPath,
) -> Result<WalkSummary>
where
    S: KvStore + ?Sized,
    D: KvStore + ?Sized,
{
    let mut summary = WalkSummary::default();
    let mut pending = vec![(source_path, destination_path)];

    while let Some((source_path, destination_path)) = pending.pop() {
        let listing = source
            .store
            .list(source.mount, &source_path)
            .map_err(|err| Error::List {
                path: source_path.clone(),
                source: err,
            })?;

        let Some(listing) = listing else {
            copy_secret(source, &source_path, destination, &destination_path)?;
            summary.secrets += 1;
            continue;
        };

        let children = listing
            .child_names()
            .map_err(|reason| Error::MalformedListing {
                path: source_path.clone(),
                reason,
            })?;
        summary.directories += 1;
        debug!(
            mount = source.mount,
            path = %source_path,
            keys = ?children,
            "listed source directory"
        );

        if children.is_empty() {
            warn!(mount = source.mount, path = %source_path, "source directory lists no keys");
            continue;
        }

        // Reversed so the stack pops children in store order.
        for child in children.iter().rev() {
            pending.push((source_path.join(child), destination_path.join(child)));
        }
    }

    Ok(summary)
}

/// Walk the whole source mount into the destination mount.
pub fn migrate<S, D>(source: Endpoint<'_, S>, destination: Endpoint<'_, D>) -> Result<WalkSummary>
where
    S: KvStore + ?Sized,
    D: KvStore + ?Sized,
{
    walk(source, RelPath::root(), destination, RelPath::root())
}
