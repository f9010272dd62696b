use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use url::Url;

use crate::coords::Coordinate;
use crate::errors::GeocodeError;

/// Address fields we care about, as returned by a Nominatim-style
/// reverse endpoint. Everything is optional; the service frequently
/// knows only some of them.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Address {
    /// Establishment name (`amenity` in Nominatim payloads).
    pub amenity: Option<String>,
    pub shop: Option<String>,
    pub road: Option<String>,
    pub house_number: Option<String>,
}

/// A best-effort reverse-geocoding capability. Implementations must
/// fail fast (bounded timeout) and never retry; the workflow treats
/// any error as "no suggestion".
pub trait Geocoder: Send + Sync {
    /// Looks up the address at the given point.
    fn lookup(&self, point: Coordinate) -> BoxFuture<'_, Result<Address, GeocodeError>>;
}

/// Derives a human-readable name suggestion from an address, applying
/// the fixed preference order: establishment, shop, street plus house
/// number, else empty.
pub fn suggest_name(address: &Address) -> String {
    if let Some(amenity) = nonempty(&address.amenity) {
        return amenity.to_owned();
    }

    if let Some(shop) = nonempty(&address.shop) {
        return shop.to_owned();
    }

    if let Some(road) = nonempty(&address.road) {
        return match nonempty(&address.house_number) {
            Some(number) => format!("{} {}", road, number),
            None => road.to_owned(),
        };
    }

    String::new()
}

fn nonempty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Reverse geocoder backed by a Nominatim-compatible HTTP service.
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpGeocoder {
    /// Creates a new instance. The timeout applies to the whole
    /// request; there is no retry on top of it.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, GeocodeError> {
        let endpoint = base_url
            .join("reverse")
            .map_err(|source| GeocodeError::BadEndpoint { source })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cidermap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| GeocodeError::Request { source })?;

        Ok(HttpGeocoder { client, endpoint })
    }
}

impl Geocoder for HttpGeocoder {
    fn lookup(&self, point: Coordinate) -> BoxFuture<'_, Result<Address, GeocodeError>> {
        reverse(self, point).boxed()
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Address,
}

async fn reverse(geocoder: &HttpGeocoder, point: Coordinate) -> Result<Address, GeocodeError> {
    let response = geocoder
        .client
        .get(geocoder.endpoint.clone())
        .query(&[
            ("format", "jsonv2".to_owned()),
            ("lat", point.lat.to_string()),
            ("lon", point.lon.to_string()),
        ])
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|source| GeocodeError::Request { source })?;

    let payload: ReverseResponse = response
        .json()
        .await
        .map_err(|source| GeocodeError::Malformed { source })?;

    Ok(payload.address)
}

/// Geocoder used when no service is configured: every lookup succeeds
/// with an empty address, so suggestions are simply empty.
pub struct NoopGeocoder;

impl Geocoder for NoopGeocoder {
    fn lookup(&self, _point: Coordinate) -> BoxFuture<'_, Result<Address, GeocodeError>> {
        futures::future::ready(Ok(Address::default())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::{suggest_name, Address};

    #[test]
    fn establishment_name_is_preferred() {
        let address = Address {
            amenity: Some("Sidrería Begoña".to_owned()),
            shop: Some("Ultramarinos Paca".to_owned()),
            road: Some("Calle Mayor".to_owned()),
            house_number: Some("12".to_owned()),
        };

        assert_eq!(suggest_name(&address), "Sidrería Begoña");
    }

    #[test]
    fn shop_beats_street() {
        let address = Address {
            amenity: None,
            shop: Some("Ultramarinos Paca".to_owned()),
            road: Some("Calle Mayor".to_owned()),
            house_number: Some("12".to_owned()),
        };

        assert_eq!(suggest_name(&address), "Ultramarinos Paca");
    }

    #[test]
    fn street_and_house_number_are_combined() {
        let address = Address {
            amenity: None,
            shop: None,
            road: Some("Calle Mayor".to_owned()),
            house_number: Some("12".to_owned()),
        };

        assert_eq!(suggest_name(&address), "Calle Mayor 12");
    }

    #[test]
    fn street_alone_still_suggests() {
        let address = Address {
            road: Some("Calle Mayor".to_owned()),
            ..Address::default()
        };

        assert_eq!(suggest_name(&address), "Calle Mayor");
    }

    #[test]
    fn blank_fields_are_skipped() {
        let address = Address {
            amenity: Some("  ".to_owned()),
            shop: Some(String::new()),
            road: None,
            house_number: None,
        };

        assert_eq!(suggest_name(&address), "");
    }
}
