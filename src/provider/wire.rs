//! Provider response shapes and their conversion into domain types.
//!
//! The provider is loose about its JSON: ids come as strings or numbers,
//! numbers sometimes arrive as strings, list payloads hide under one of
//! several keys and detail payloads may be wrapped. Everything here is
//! private to the provider layer; callers only see `types::*`.

use chrono::{DateTime, NaiveDate};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{CompRecord, PropertyDetails, PropertySummary, ScoutError};

/// Mean Earth radius in statute miles.
const EARTH_RADIUS_MI: f64 = 3958.8;

const SQFT_PER_ACRE: f64 = 43_560.0;

/// Keys a comp list may be found under, in lookup order.
const COMP_LIST_KEYS: [&str; 5] = ["comparables", "comp", "results", "props", "comps"];

/// Decode `body` as JSON into `R`, mapping failures to `SchemaViolation`.
pub fn decode_json<R: DeserializeOwned>(context: &str, body: &str) -> Result<R, ScoutError> {
    serde_json::from_str(body).map_err(|e| ScoutError::schema(context, e.to_string()))
}

// ---------------------------------------------------------------------------
// Lenient scalar decoding
// ---------------------------------------------------------------------------

fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '$' | ' ')).collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("expected a number, got {s:?}")))
        }
        Some(other) => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected an id, got {other}"))),
    }
}

/// Sale dates come as epoch milliseconds or as ISO date strings.
fn sale_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        Value::String(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        _ => None,
    }
}

fn non_negative_u32(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// Great-circle distance in miles.
pub fn haversine_mi(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MI * h.sqrt().min(1.0).asin()
}

// ---------------------------------------------------------------------------
// Listings (search results and recently-sold comps)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireListing {
    #[serde(default, deserialize_with = "opt_id")]
    zpid: Option<String>,
    #[serde(default)]
    address: Option<Value>,
    city: Option<String>,
    state: Option<String>,
    zipcode: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    price: Option<f64>,
    #[serde(default, alias = "beds", deserialize_with = "opt_number")]
    bedrooms: Option<f64>,
    #[serde(default, alias = "baths", deserialize_with = "opt_number")]
    bathrooms: Option<f64>,
    #[serde(default, alias = "sqft", deserialize_with = "opt_number")]
    living_area: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    lot_area_value: Option<f64>,
    lot_area_unit: Option<String>,
    home_type: Option<String>,
    #[serde(alias = "homeStatus")]
    listing_status: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    days_on_zillow: Option<f64>,
    #[serde(alias = "url")]
    detail_url: Option<String>,
    #[serde(default)]
    date_sold: Option<Value>,
}

impl WireListing {
    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    fn lot_sqft(&self) -> Option<f64> {
        let value = self.lot_area_value?;
        match self.lot_area_unit.as_deref() {
            Some(unit) if unit.eq_ignore_ascii_case("acres") => Some(value * SQFT_PER_ACRE),
            _ => Some(value),
        }
    }

    fn into_summary(self) -> Option<PropertySummary> {
        let address = self.address.as_ref().and_then(flatten_address);
        Some(PropertySummary {
            zpid: self.zpid?,
            address,
            city: self.city,
            state: self.state,
            zipcode: self.zipcode,
            latitude: self.latitude,
            longitude: self.longitude,
            price: self.price,
            beds: self.bedrooms,
            baths: self.bathrooms,
            sqft: self.living_area,
            status: self.listing_status,
            days_on_market: non_negative_u32(self.days_on_zillow),
            url: self.detail_url,
        })
    }

    fn into_comp(self, index: usize, subject: Option<(f64, f64)>) -> CompRecord {
        let distance_mi = match (subject, self.coordinates()) {
            (Some(a), Some(b)) => Some(haversine_mi(a, b)),
            _ => None,
        };
        CompRecord {
            id: self.zpid.clone().unwrap_or_else(|| format!("#{index}")),
            sale_price: self.price,
            sqft: self.living_area,
            beds: self.bedrooms,
            baths: self.bathrooms,
            lot_sqft: self.lot_sqft(),
            home_type: self.home_type,
            sale_date: self.date_sold.as_ref().and_then(sale_date),
            distance_mi,
        }
    }
}

/// Addresses are a plain string in search results and an object in
/// detail payloads.
fn flatten_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("streetAddress")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn address_part(value: &Option<Value>, key: &str) -> Option<String> {
    value
        .as_ref()
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// One decoded search page.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub listings: Vec<PropertySummary>,
    /// Listings in the payload, including ones dropped for lacking an id.
    pub raw_count: usize,
    pub total_pages: Option<u32>,
}

pub fn decode_search(body: &str) -> Result<SearchPage, ScoutError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WireSearch {
        #[serde(alias = "results")]
        props: Vec<WireListing>,
        total_pages: Option<u32>,
    }

    let page: WireSearch = decode_json("propertyExtendedSearch", body)?;
    let raw_count = page.props.len();
    let listings: Vec<PropertySummary> = page
        .props
        .into_iter()
        .filter_map(WireListing::into_summary)
        .collect();

    Ok(SearchPage {
        listings,
        raw_count,
        total_pages: page.total_pages,
    })
}

/// Decode a comp list. `subject` coordinates, when known, are used to
/// fill in each comp's distance.
pub fn decode_comps(
    context: &str,
    body: &str,
    subject: Option<(f64, f64)>,
) -> Result<Vec<CompRecord>, ScoutError> {
    let value: Value = decode_json(context, body)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => COMP_LIST_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                ScoutError::schema(
                    context,
                    format!("no comp list under any of {}", COMP_LIST_KEYS.join(", ")),
                )
            })?,
        other => {
            return Err(ScoutError::schema(
                context,
                format!("expected an object or array, got {}", json_kind(&other)),
            ))
        }
    };

    list.into_iter()
        .enumerate()
        .map(|(i, item)| {
            let listing: WireListing = serde_json::from_value(item)
                .map_err(|e| ScoutError::schema(context, format!("comp #{i}: {e}")))?;
            Ok(listing.into_comp(i, subject))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Property details
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetails {
    #[serde(default, deserialize_with = "opt_id")]
    zpid: Option<String>,
    #[serde(default)]
    address: Option<Value>,
    city: Option<String>,
    state: Option<String>,
    zipcode: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    longitude: Option<f64>,
    #[serde(alias = "hdpUrl")]
    url: Option<String>,
    home_status: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    days_on_zillow: Option<f64>,
    #[serde(default, alias = "monthlyHoaFee", deserialize_with = "opt_number")]
    hoa_fee: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    bedrooms: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    bathrooms: Option<f64>,
    #[serde(default, alias = "livingAreaValue", deserialize_with = "opt_number")]
    living_area: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    lot_size: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    lot_area_value: Option<f64>,
    lot_area_units: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    year_built: Option<f64>,
    home_type: Option<String>,
}

impl WireDetails {
    fn lot_sqft(&self) -> Option<f64> {
        if let Some(sqft) = self.lot_size {
            return Some(sqft);
        }
        let value = self.lot_area_value?;
        match self.lot_area_units.as_deref() {
            Some(unit) if unit.eq_ignore_ascii_case("acres") => Some(value * SQFT_PER_ACRE),
            _ => Some(value),
        }
    }
}

/// Unwrap `{"property": ...}` / `{"data": ...}` envelopes.
fn unwrap_details(value: Value) -> Value {
    let inner = match value {
        Value::Object(mut map) => match map.remove("property").or_else(|| map.remove("data")) {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) | None => Value::Object(map),
        },
        other => other,
    };
    match inner {
        Value::Object(mut map) if matches!(map.get("property"), Some(Value::Object(_))) => {
            map.remove("property").unwrap_or(Value::Object(map))
        }
        other => other,
    }
}

pub fn decode_details(body: &str) -> Result<PropertyDetails, ScoutError> {
    const CONTEXT: &str = "property";

    let value: Value = decode_json(CONTEXT, body)?;
    let value = unwrap_details(value);
    if !value.is_object() {
        return Err(ScoutError::schema(
            CONTEXT,
            format!("expected an object, got {}", json_kind(&value)),
        ));
    }
    let wire: WireDetails =
        serde_json::from_value(value).map_err(|e| ScoutError::schema(CONTEXT, e.to_string()))?;

    let lot_sqft = wire.lot_sqft();
    let mut missing = Vec::new();
    if wire.zpid.is_none() {
        missing.push("zpid");
    }
    if wire.price.is_none() {
        missing.push("price");
    }
    if wire.bedrooms.is_none() {
        missing.push("bedrooms");
    }
    if wire.bathrooms.is_none() {
        missing.push("bathrooms");
    }
    if wire.living_area.is_none() {
        missing.push("livingArea");
    }
    if wire.home_type.as_deref().map_or(true, |t| t.trim().is_empty()) {
        missing.push("homeType");
    }
    let (Some(zpid), Some(price), Some(beds), Some(baths), Some(sqft), Some(home_type)) = (
        wire.zpid,
        wire.price,
        wire.bedrooms,
        wire.bathrooms,
        wire.living_area,
        wire.home_type.filter(|t| !t.trim().is_empty()),
    ) else {
        return Err(ScoutError::schema(
            CONTEXT,
            format!("missing required field(s): {}", missing.join(", ")),
        ));
    };

    if !(sqft > 0.0) {
        return Err(ScoutError::schema(
            CONTEXT,
            format!("property {zpid} has non-positive living area {sqft}"),
        ));
    }

    Ok(PropertyDetails {
        city: wire.city.or_else(|| address_part(&wire.address, "city")),
        state: wire.state.or_else(|| address_part(&wire.address, "state")),
        zipcode: wire.zipcode.or_else(|| address_part(&wire.address, "zipcode")),
        address: wire.address.as_ref().and_then(flatten_address),
        zpid,
        latitude: wire.latitude,
        longitude: wire.longitude,
        url: wire.url,
        status: wire.home_status,
        days_on_market: non_negative_u32(wire.days_on_zillow),
        hoa_fee: wire.hoa_fee,
        price,
        beds,
        baths,
        sqft,
        lot_sqft,
        year_built: wire.year_built.filter(|y| y.is_finite()).map(|y| y.round() as i32),
        home_type,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
