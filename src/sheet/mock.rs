use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};

use crate::errors::SheetError;
use crate::record::RawRow;
use crate::sheet::Sheet;

/// In-memory sheet for tests. Can be told to reject writes so that
/// store-failure handling is testable.
#[derive(Default)]
pub(crate) struct MockSheet {
    rows: RwLock<Vec<RawRow>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MockSheet {
    pub(crate) fn new() -> Self {
        MockSheet::default()
    }

    pub(crate) fn with_rows(rows: Vec<RawRow>) -> Self {
        MockSheet {
            rows: RwLock::new(rows),
            ..MockSheet::default()
        }
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn rows(&self) -> Vec<RawRow> {
        self.rows.read().unwrap().clone()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Sheet for MockSheet {
    fn read(&self) -> BoxFuture<'_, Result<Vec<RawRow>, SheetError>> {
        futures::future::ready(Ok(self.rows())).boxed()
    }

    fn write(&self, rows: Vec<RawRow>) -> BoxFuture<'_, Result<(), SheetError>> {
        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(SheetError::Rejected)
        } else {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.rows.write().unwrap() = rows;
            Ok(())
        };

        futures::future::ready(result).boxed()
    }
}
