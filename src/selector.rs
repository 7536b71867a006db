use std::sync::Arc;

use crate::catalog::CatalogClient;
use crate::domain::{ArchiveKind, Query};
use crate::error::DicomError;

/// Marker `iquest` prints instead of rows when a query matches nothing.
pub const NO_ROWS_MARKER: &str = "CAT_NO_ROWS_FOUND";

/// Picks the files to download from one collection listing.
///
/// Every `.zip` is taken and the scan continues. The first file of any other kind is taken and
/// ends the scan: such collections hold one archive per series and one of them is enough.
pub fn select_from_listing<I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut selected = Vec::new();
    for row in rows {
        if row.contains(NO_ROWS_MARKER) || row.trim().is_empty() {
            continue;
        }
        let kind = ArchiveKind::classify(&row);
        selected.push(row);
        if kind != ArchiveKind::ZipArchive {
            break;
        }
    }
    selected
}

pub struct FileSelector<C: CatalogClient> {
    client: Arc<C>,
}

impl<C: CatalogClient> FileSelector<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Lists `collection` and returns the files chosen for download.
    ///
    /// A listing that fails part way is logged; the rows received before the failure are
    /// still considered.
    pub fn select(&self, collection: &str) -> Result<Vec<String>, DicomError> {
        let query = Query::FilesIn {
            collection: collection.to_string(),
        };
        let mut rows = Vec::new();
        for row in self.client.list_matching(&query)? {
            match row {
                Ok(row) => rows.push(row),
                // iquest exits non-zero on an empty result as well
                Err(err) if rows.iter().any(|row| row.contains(NO_ROWS_MARKER)) => {
                    tracing::debug!(collection, error = %err, "collection is empty");
                    break;
                }
                Err(err) => {
                    tracing::error!(collection, error = %err, "listing collection failed");
                    break;
                }
            }
        }
        Ok(select_from_listing(rows))
    }
}
