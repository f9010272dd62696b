use crate::coords::Coordinate;
use crate::record::BarRecord;

/// Per-axis match radius in decimal degrees, roughly 30 m at the
/// latitudes this map covers. One value for every call site; tunable
/// through `CIDERMAP_MATCH_EPSILON`.
pub const DEFAULT_MATCH_EPSILON: f64 = 0.0003;

/// Whether two points count as the same venue.
///
/// This is independent per-axis thresholding, not geodesic distance:
/// `|Δlat| < ε AND |Δlon| < ε`. It is not latitude-corrected, which is
/// fine at the scale of a single town and part of the contract here.
pub fn matches_within(a: Coordinate, b: Coordinate, epsilon: f64) -> bool {
    (a.lat - b.lat).abs() < epsilon && (a.lon - b.lon).abs() < epsilon
}

/// Returns the existing records within the match radius of `point`, in
/// their stored order.
pub fn find_nearby<'a>(
    point: Coordinate,
    records: &'a [BarRecord],
    epsilon: f64,
) -> Vec<&'a BarRecord> {
    records
        .iter()
        .filter(|record| matches_within(point, record.point(), epsilon))
        .collect()
}

/// Returns the best duplicate candidate for `point`: the nearby record
/// with the smallest summed absolute coordinate delta. Equal sums keep
/// the earliest-inserted row.
pub fn best_match<'a>(
    point: Coordinate,
    records: &'a [BarRecord],
    epsilon: f64,
) -> Option<&'a BarRecord> {
    let mut best: Option<(&BarRecord, f64)> = None;

    for record in find_nearby(point, records, epsilon) {
        let delta = (point.lat - record.lat).abs() + (point.lon - record.lon).abs();

        match best {
            Some((_, best_delta)) if delta >= best_delta => {}
            _ => best = Some((record, delta)),
        }
    }

    best.map(|(record, _)| record)
}
