//! The flattened output row for one property.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{ArvComputation, ProfitScenarios, PropertyDetails, ScoutError, SearchHit};

/// Prefix for detail URLs the provider returns as site-relative paths.
const SITE_ROOT: &str = "https://www.zillow.com";

/// One output row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRow {
    // Identification
    pub zpid: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub url: Option<String>,
    pub status: Option<String>,
    pub dom: Option<u32>,
    pub hoa: Option<f64>,
    // Specs
    pub list_price: f64,
    pub beds: f64,
    pub baths: f64,
    pub sqft: f64,
    pub lot_sqft: Option<f64>,
    pub year_built: Option<i32>,
    pub home_type: String,
    // ARV
    pub arv_estimate: f64,
    pub arv_ppsf: f64,
    pub comp_count: usize,
    pub comp_radius_mi: f64,
    pub comp_window_months: u32,
    pub arv_confidence: f64,
    // Deal
    pub list_to_arv_pct: f64,
    // Profit
    pub profit_conservative: Option<Decimal>,
    pub profit_median: Option<Decimal>,
    pub profit_optimistic: Option<Decimal>,
    // Operational
    pub search_geo: String,
    pub page: u32,
    pub ts_utc: String,
}

impl CsvRow {
    pub const HEADERS: [&'static str; 31] = [
        "zpid",
        "address",
        "city",
        "state",
        "zip",
        "latitude",
        "longitude",
        "url",
        "status",
        "dom",
        "hoa",
        "list_price",
        "beds",
        "baths",
        "sqft",
        "lot_sqft",
        "year_built",
        "home_type",
        "arv_estimate",
        "arv_ppsf",
        "comp_count",
        "comp_radius_mi",
        "comp_window_months",
        "arv_confidence",
        "list_to_arv_pct",
        "profit_conservative",
        "profit_median",
        "profit_optimistic",
        "search_geo",
        "page",
        "ts_utc",
    ];

    /// Assemble a row from the complete set of upstream results.
    ///
    /// Identification fields come from the details payload, falling back
    /// to the search summary where details left them empty.
    pub fn build(
        hit: &SearchHit,
        details: &PropertyDetails,
        arv: &ArvComputation,
        profit: Option<&ProfitScenarios>,
        ts_utc: &str,
    ) -> Result<Self, ScoutError> {
        let fail = |message: String| ScoutError::RowConstructionFailure {
            zpid: details.zpid.clone(),
            message,
        };

        if details.zpid != hit.summary.zpid || details.zpid != arv.zpid {
            return Err(fail(format!(
                "mismatched ids: search {}, details {}, arv {}",
                hit.summary.zpid, details.zpid, arv.zpid
            )));
        }
        if !arv.estimate.is_finite() || arv.estimate <= 0.0 {
            return Err(fail(format!(
                "ARV estimate {} leaves list-to-ARV undefined",
                arv.estimate
            )));
        }
        if !(0.0..=1.0).contains(&arv.confidence) {
            return Err(fail(format!("confidence {} outside [0, 1]", arv.confidence)));
        }
        if !details.price.is_finite() || details.price < 0.0 {
            return Err(fail(format!("invalid list price {}", details.price)));
        }

        let summary = &hit.summary;
        Ok(CsvRow {
            zpid: details.zpid.clone(),
            address: details.address.clone().or_else(|| summary.address.clone()),
            city: details.city.clone().or_else(|| summary.city.clone()),
            state: details.state.clone().or_else(|| summary.state.clone()),
            zip: details.zipcode.clone().or_else(|| summary.zipcode.clone()),
            latitude: details.latitude.or(summary.latitude),
            longitude: details.longitude.or(summary.longitude),
            url: details
                .url
                .as_deref()
                .or(summary.url.as_deref())
                .map(absolute_url),
            status: details.status.clone().or_else(|| summary.status.clone()),
            dom: details.days_on_market.or(summary.days_on_market),
            hoa: details.hoa_fee,
            list_price: details.price,
            beds: details.beds,
            baths: details.baths,
            sqft: details.sqft,
            lot_sqft: details.lot_sqft,
            year_built: details.year_built,
            home_type: details.home_type.clone(),
            arv_estimate: round_to(arv.estimate, 2),
            arv_ppsf: round_to(arv.ppsf, 2),
            comp_count: arv.comp_count,
            comp_radius_mi: arv.radius_mi,
            comp_window_months: arv.window_months,
            arv_confidence: round_to(arv.confidence, 3),
            list_to_arv_pct: round_to(details.price / arv.estimate, 4),
            profit_conservative: profit.map(|p| p.profit_conservative.round_dp(2)),
            profit_median: profit.map(|p| p.profit_median.round_dp(2)),
            profit_optimistic: profit.map(|p| p.profit_optimistic.round_dp(2)),
            search_geo: hit.geo.clone(),
            page: hit.page,
            ts_utc: ts_utc.to_string(),
        })
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn absolute_url(url: &str) -> String {
    if url.starts_with('/') {
        format!("{SITE_ROOT}{url}")
    } else {
        url.to_string()
    }
}
