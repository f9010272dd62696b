use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};

use crate::errors::SheetError;
use crate::record::RawRow;

#[cfg(test)]
pub(crate) mod mock;

/// The tabular backing store. The only primitives the community
/// spreadsheet offers are "read everything" and "replace everything";
/// there is no append, no versioning, and therefore an accepted
/// lost-update hazard between concurrent writers.
pub trait Sheet: Send + Sync {
    /// Reads the full dataset, in stored order.
    fn read(&self) -> BoxFuture<'_, Result<Vec<RawRow>, SheetError>>;

    /// Replaces the full dataset with the given rows.
    fn write(&self, rows: Vec<RawRow>) -> BoxFuture<'_, Result<(), SheetError>>;
}

/// A sheet kept as a CSV file on disk.
pub struct CsvSheet {
    path: PathBuf,
}

impl CsvSheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSheet { path: path.into() }
    }
}

impl Sheet for CsvSheet {
    fn read(&self) -> BoxFuture<'_, Result<Vec<RawRow>, SheetError>> {
        read_rows(self.path.clone()).boxed()
    }

    fn write(&self, rows: Vec<RawRow>) -> BoxFuture<'_, Result<(), SheetError>> {
        write_rows(self.path.clone(), rows).boxed()
    }
}

async fn read_rows(path: PathBuf) -> Result<Vec<RawRow>, SheetError> {
    // A dataset that does not exist yet reads as empty, so a fresh
    // deployment works before the first save.
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader =
        csv::Reader::from_path(&path).map_err(|source| SheetError::Malformed { source })?;

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: RawRow = result.map_err(|source| SheetError::Malformed { source })?;
        rows.push(row);
    }

    Ok(rows)
}

async fn write_rows(path: PathBuf, rows: Vec<RawRow>) -> Result<(), SheetError> {
    // The rows go to a sibling file first and are renamed into place,
    // so a write that dies partway (disk full, I/O error) leaves the
    // previous dataset on disk instead of a truncated one.
    let staging = staging_path(&path);

    if let Err(e) = write_rows_to(&staging, &rows) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    fs::rename(&staging, &path).map_err(|source| SheetError::Io { source })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("sheet"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_rows_to(path: &Path, rows: &[RawRow]) -> Result<(), SheetError> {
    let file = File::create(path).map_err(|source| SheetError::Io { source })?;
    let mut writer = csv::Writer::from_writer(file);

    for row in rows {
        writer
            .serialize(row)
            .map_err(|source| SheetError::Malformed { source })?;
    }

    writer.flush().map_err(|source| SheetError::Io { source })
}
