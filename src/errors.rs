use thiserror::Error;
use warp::reject;

/// Enumerates high-level errors returned by the registration workflow.
///
/// Every collaborator failure is converted into one of these at the
/// workflow boundary; nothing below this layer is surfaced raw.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A latitude/longitude pair that could not be normalized into a
    /// canonical coordinate. For stored rows this is a per-row filter,
    /// never a fatal error.
    #[error("invalid coordinate {raw:?}")]
    InvalidCoordinate { raw: String },

    /// The bar name was empty after normalization.
    #[error("name must not be empty")]
    EmptyName,

    /// Save was requested while no location was pending.
    #[error("no location has been chosen")]
    NoPendingSelection,

    /// The backing sheet could not be read.
    #[error("could not read the sheet")]
    StoreRead { source: SheetError },

    /// The backing sheet rejected the write. The pending selection and
    /// form values survive so the user can retry.
    #[error("could not write the sheet")]
    StoreWrite { source: SheetError },
}

/// Enumerates errors returned by the tabular backing store.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Represents an I/O error on the underlying file.
    #[error("sheet I/O error")]
    Io { source: std::io::Error },

    /// Represents a row that could not be encoded or decoded.
    #[error("malformed sheet data")]
    Malformed { source: csv::Error },

    /// The store refused the write (e.g. permission denied).
    #[error("write rejected by the sheet")]
    Rejected,
}

/// Enumerates errors returned by the reverse-geocoding collaborator.
///
/// These never reach the user-visible layer; the workflow degrades to
/// an empty name suggestion instead.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The service endpoint could not be derived from the base URL.
    #[error("bad geocoder endpoint")]
    BadEndpoint { source: url::ParseError },

    /// The lookup request failed or timed out.
    #[error("reverse geocoding request failed")]
    Request { source: reqwest::Error },

    /// The service answered with something other than the expected payload.
    #[error("unexpected reverse geocoding response")]
    Malformed { source: reqwest::Error },
}

impl reject::Reject for WorkflowError {}
