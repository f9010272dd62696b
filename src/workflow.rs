use std::sync::Arc;

use slog::{debug, Logger};
use time::OffsetDateTime;

use crate::coords::{self, Coordinate};
use crate::dedup;
use crate::errors::WorkflowError;
use crate::geocode::{self, Geocoder};
use crate::normalization::normalize_name;
use crate::record::{BarRecord, Marker, RawRow, ServiceFormat};
use crate::sheet::Sheet;

/// Where the registration flow currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// No location pending.
    Idle,
    /// A location has been captured and the form is open.
    PointChosen,
}

/// Transient, session-scoped state: the candidate point awaiting form
/// completion. Lives from "point chosen" until save or cancel.
#[derive(Clone, Debug)]
pub struct PendingSelection {
    pub point: Coordinate,
    pub suggested_name: String,
}

/// What the flow learned when a point was captured; handed back to the
/// form surface so it can pre-fill fields and show the duplicate hint.
#[derive(Clone, Debug)]
pub struct Capture {
    pub point: Coordinate,
    /// Name of the closest existing bar within the match radius, if
    /// any. Advisory only; it never blocks registration.
    pub duplicate_of: Option<String>,
    /// Best-effort reverse-geocoded name; empty when the service is
    /// unavailable or knows nothing useful.
    pub suggested_name: String,
}

/// The remaining attributes collected through the form.
#[derive(Clone, Debug, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub brand: String,
    pub format: ServiceFormat,
    pub notes: String,
}

/// The location-capture and deduplication-aware registration flow.
///
/// One instance per user session. Each interaction runs synchronously
/// to completion and re-reads the sheet before acting, so duplicate
/// checks never work from a stale snapshot. What this deliberately
/// does not do is merge concurrent writers: the sheet only offers
/// read-all/write-all, so two sessions saving at once can lose one
/// append. At single-digit community scale that trade is accepted.
pub struct RegistrationWorkflow {
    logger: Arc<Logger>,
    sheet: Arc<dyn Sheet>,
    geocoder: Arc<dyn Geocoder>,
    epsilon: f64,
    pending: Option<PendingSelection>,
}

impl RegistrationWorkflow {
    pub fn new(
        logger: Arc<Logger>,
        sheet: Arc<dyn Sheet>,
        geocoder: Arc<dyn Geocoder>,
        epsilon: f64,
    ) -> Self {
        RegistrationWorkflow {
            logger,
            sheet,
            geocoder,
            epsilon,
            pending: None,
        }
    }

    pub fn state(&self) -> State {
        match self.pending {
            Some(_) => State::PointChosen,
            None => State::Idle,
        }
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    /// Handles a location-capture event (map tap or confirmed map
    /// center). Replaces any previously pending selection; the last
    /// capture wins.
    pub async fn capture_point(
        &mut self,
        lat_raw: &str,
        lon_raw: &str,
    ) -> Result<Capture, WorkflowError> {
        let point = coords::parse_pair(lat_raw, lon_raw)?;

        let rows = self
            .sheet
            .read()
            .await
            .map_err(|source| WorkflowError::StoreRead { source })?;
        let bars = self.working_copy(&rows);

        let duplicate_of =
            dedup::best_match(point, &bars, self.epsilon).map(|bar| bar.name.clone());

        let suggested_name = match self.geocoder.lookup(point).await {
            Ok(address) => geocode::suggest_name(&address),
            Err(e) => {
                debug!(self.logger, "name suggestion unavailable";
                       "error" => format!("{}", e));
                String::new()
            }
        };

        self.pending = Some(PendingSelection {
            point,
            suggested_name: suggested_name.clone(),
        });

        debug!(self.logger, "point captured";
               "lat" => point.lat, "lon" => point.lon,
               "duplicate_of" => duplicate_of.clone().unwrap_or_default());

        Ok(Capture {
            point,
            duplicate_of,
            suggested_name,
        })
    }

    /// Saves the pending selection with the form's attributes,
    /// appending exactly one row. On validation or write failure the
    /// pending selection is kept so the user can retry.
    pub async fn save(&mut self, form: &RegistrationForm) -> Result<BarRecord, WorkflowError> {
        let pending = self
            .pending
            .as_ref()
            .ok_or(WorkflowError::NoPendingSelection)?;

        let name = normalize_name(&form.name);
        if name.is_empty() {
            return Err(WorkflowError::EmptyName);
        }

        let record = BarRecord {
            name,
            lat: pending.point.lat,
            lon: pending.point.lon,
            brand: form.brand.trim().to_owned(),
            format: form.format,
            registered_on: Some(OffsetDateTime::now_utc().date()),
            notes: form.notes.trim().to_owned(),
        };

        // The sheet only supports whole-dataset writes, so the append
        // is a fresh read plus a write of everything.
        let mut rows = self
            .sheet
            .read()
            .await
            .map_err(|source| WorkflowError::StoreRead { source })?;
        rows.push(RawRow::from(&record));

        self.sheet
            .write(rows)
            .await
            .map_err(|source| WorkflowError::StoreWrite { source })?;

        debug!(self.logger, "bar registered"; "name" => record.name.clone());
        self.pending = None;

        Ok(record)
    }

    /// Discards the pending selection and any entered form data. Never
    /// touches the store.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Produces the markers for the map surface: every stored row with
    /// a valid coordinate, freshly read.
    pub async fn markers(&self) -> Result<Vec<Marker>, WorkflowError> {
        let rows = self
            .sheet
            .read()
            .await
            .map_err(|source| WorkflowError::StoreRead { source })?;

        Ok(self.working_copy(&rows).iter().map(Marker::from).collect())
    }

    /// Interprets the raw rows, dropping the ones without a usable
    /// coordinate. A bad row is filtered, not fatal.
    fn working_copy(&self, rows: &[RawRow]) -> Vec<BarRecord> {
        rows.iter()
            .filter_map(|row| match row.to_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(self.logger, "skipping row without a usable coordinate";
                           "name" => row.name.clone(), "error" => format!("{}", e));
                    None
                }
            })
            .collect()
    }
}
