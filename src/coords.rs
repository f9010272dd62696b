use crate::errors::WorkflowError;

/// A canonical point on the map, always stored as dot-decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Rewrites a locale-specific decimal into canonical dot-decimal form.
/// Community members type coordinates with `,` as the separator; the
/// sheet and all numeric comparisons use `.`. Idempotent.
pub fn normalize_decimal(raw: &str) -> String {
    raw.trim().replace(',', ".")
}

/// Parses one axis of a coordinate, bounded to the given range.
pub fn parse_axis(raw: &str, min: f64, max: f64) -> Result<f64, WorkflowError> {
    let invalid = || WorkflowError::InvalidCoordinate {
        raw: raw.to_owned(),
    };

    let value: f64 = normalize_decimal(raw).parse().map_err(|_| invalid())?;

    if !value.is_finite() || value < min || value > max {
        return Err(invalid());
    }

    Ok(value)
}

/// Parses a raw latitude/longitude pair into a [`Coordinate`].
pub fn parse_pair(lat: &str, lon: &str) -> Result<Coordinate, WorkflowError> {
    Ok(Coordinate {
        lat: parse_axis(lat, -90.0, 90.0)?,
        lon: parse_axis(lon, -180.0, 180.0)?,
    })
}
