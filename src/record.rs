use serde::{Deserialize, Serialize, Serializer};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::Date;

use crate::coords::{self, Coordinate};
use crate::errors::WorkflowError;
use crate::normalization::normalize_name;

/// Date layout used by the community sheet, e.g. `01/01/2024`.
const SHEET_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[day]/[month]/[year]");

/// How a venue serves its cider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ServiceFormat {
    /// Served poured, by the glass.
    #[serde(rename = "Pote/Vaso", alias = "poured")]
    Poured,

    /// Sold as whole bottles only.
    #[serde(rename = "Botella entera", alias = "bottle")]
    BottleOnly,
}

impl Default for ServiceFormat {
    fn default() -> Self {
        ServiceFormat::Poured
    }
}

impl ServiceFormat {
    /// The label stored in the sheet's `Formato` column.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceFormat::Poured => "Pote/Vaso",
            ServiceFormat::BottleOnly => "Botella entera",
        }
    }

    /// Parses a `Formato` cell. The sheet is community-edited, so
    /// anything unrecognized (including the legacy `Ambos` value)
    /// falls back to the poured default.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "Botella entera" => ServiceFormat::BottleOnly,
            _ => ServiceFormat::Poured,
        }
    }

    /// Marker color exposed to the map surface.
    pub fn marker_color(&self) -> &'static str {
        match self {
            ServiceFormat::BottleOnly => "green",
            ServiceFormat::Poured => "blue",
        }
    }
}

/// One persisted entry describing a venue's location and service attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BarRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub brand: String,
    pub format: ServiceFormat,
    #[serde(serialize_with = "serialize_sheet_date")]
    pub registered_on: Option<Date>,
    pub notes: String,
}

impl BarRecord {
    pub fn point(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// A row exactly as it sits in the sheet, column names included. Kept
/// textual so that rows this workflow does not understand survive a
/// read-modify-write untouched.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawRow {
    #[serde(rename = "Nombre", default)]
    pub name: String,

    #[serde(rename = "LAT", default)]
    pub lat: String,

    #[serde(rename = "LON", default)]
    pub lon: String,

    #[serde(rename = "Marca", default)]
    pub brand: String,

    #[serde(rename = "Formato", default)]
    pub format: String,

    #[serde(rename = "Fecha_registro", default)]
    pub registered_on: String,

    #[serde(rename = "Observaciones", default)]
    pub notes: String,
}

impl RawRow {
    /// Interprets the row as a [`BarRecord`]. Fails only on a
    /// malformed coordinate; every other cell degrades gracefully.
    pub fn to_record(&self) -> Result<BarRecord, WorkflowError> {
        let point = coords::parse_pair(&self.lat, &self.lon)?;

        Ok(BarRecord {
            name: normalize_name(&self.name),
            lat: point.lat,
            lon: point.lon,
            brand: self.brand.trim().to_owned(),
            format: ServiceFormat::from_label(&self.format),
            registered_on: parse_sheet_date(&self.registered_on),
            notes: self.notes.trim().to_owned(),
        })
    }
}

impl From<&BarRecord> for RawRow {
    fn from(record: &BarRecord) -> Self {
        RawRow {
            name: record.name.clone(),
            lat: record.lat.to_string(),
            lon: record.lon.to_string(),
            brand: record.brand.clone(),
            format: record.format.label().to_owned(),
            registered_on: record
                .registered_on
                .map(format_sheet_date)
                .unwrap_or_default(),
            notes: record.notes.clone(),
        }
    }
}

/// A pin handed to the map surface.
#[derive(Clone, Debug, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub color: &'static str,
    pub popup: String,
}

impl From<&BarRecord> for Marker {
    fn from(record: &BarRecord) -> Self {
        let popup = if record.brand.is_empty() {
            format!("{} ({})", record.name, record.format.label())
        } else {
            format!("{} - {} ({})", record.name, record.brand, record.format.label())
        };

        Marker {
            lat: record.lat,
            lon: record.lon,
            color: record.format.marker_color(),
            popup,
        }
    }
}

pub fn format_sheet_date(date: Date) -> String {
    date.format(&SHEET_DATE_FORMAT).expect("format sheet date")
}

pub fn parse_sheet_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), &SHEET_DATE_FORMAT).ok()
}

fn serialize_sheet_date<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match date {
        Some(date) => serializer.serialize_str(&format_sheet_date(*date)),
        None => serializer.serialize_none(),
    }
}
