//! Shared types for the ARV-SCOUT pipeline.
//!
//! These types form the data model used across all modules. Provider
//! responses are decoded into them by `provider::wire`; everything
//! downstream (valuation, engine) only ever sees these validated shapes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One listing as returned by the provider's search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub zpid: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: Option<f64>,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub sqft: Option<f64>,
    /// Listing status as reported by the provider ("FOR_SALE", ...).
    pub status: Option<String>,
    pub days_on_market: Option<u32>,
    pub url: Option<String>,
}

/// A search result together with where it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub summary: PropertySummary,
    /// The search geography ("Austin, TX", a zip code, ...).
    pub geo: String,
    /// 1-based result page.
    pub page: u32,
}

// ---------------------------------------------------------------------------
// Property details
// ---------------------------------------------------------------------------

/// Full attribute set for a single property.
///
/// The required fields are exactly the ones valuation cannot proceed
/// without; decoding fails with `ScoutError::SchemaViolation` when any
/// of them is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub zpid: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub url: Option<String>,
    pub status: Option<String>,
    pub days_on_market: Option<u32>,
    pub hoa_fee: Option<f64>,
    /// List price.
    pub price: f64,
    pub beds: f64,
    pub baths: f64,
    /// Living area in square feet, always > 0.
    pub sqft: f64,
    pub lot_sqft: Option<f64>,
    pub year_built: Option<i32>,
    pub home_type: String,
}

impl PropertyDetails {
    /// (latitude, longitude) when the provider supplied both.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Helper to build a sample subject with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        PropertyDetails {
            zpid: "1001".to_string(),
            address: Some("12 Elm St".to_string()),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zipcode: Some("78701".to_string()),
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            url: Some("https://www.zillow.com/homedetails/1001_zpid/".to_string()),
            status: Some("FOR_SALE".to_string()),
            days_on_market: Some(12),
            hoa_fee: None,
            price: 200_000.0,
            beds: 3.0,
            baths: 2.0,
            sqft: 1500.0,
            lot_sqft: Some(6000.0),
            year_built: Some(1978),
            home_type: "SINGLE_FAMILY".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparable sales
// ---------------------------------------------------------------------------

/// One comparable sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompRecord {
    pub id: String,
    /// Absent when the provider omitted or blanked the sale price.
    pub sale_price: Option<f64>,
    pub sqft: Option<f64>,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub lot_sqft: Option<f64>,
    pub home_type: Option<String>,
    pub sale_date: Option<NaiveDate>,
    /// Great-circle distance from the subject in miles, when known.
    pub distance_mi: Option<f64>,
}

impl CompRecord {
    /// Price per square foot. `None` for records that cannot yield one.
    pub fn ppsf(&self) -> Option<f64> {
        match (self.sale_price, self.sqft) {
            (Some(price), Some(sqft)) if price > 0.0 && sqft > 0.0 => Some(price / sqft),
            _ => None,
        }
    }

    /// Helper to build a comp with a given ppsf over `sqft`.
    #[cfg(test)]
    pub fn sample(id: &str, ppsf: f64, sqft: f64) -> Self {
        CompRecord {
            id: id.to_string(),
            sale_price: Some(ppsf * sqft),
            sqft: Some(sqft),
            beds: Some(3.0),
            baths: Some(2.0),
            lot_sqft: Some(6000.0),
            home_type: Some("SINGLE_FAMILY".to_string()),
            sale_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            distance_mi: Some(0.4),
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation outputs
// ---------------------------------------------------------------------------

/// The ARV estimate for one subject property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArvComputation {
    pub zpid: String,
    /// Adjusted ARV.
    pub estimate: f64,
    /// median(ppsf) × subject sqft, before bed/bath adjustment.
    pub baseline: f64,
    /// The median price per square foot the baseline was built from.
    pub ppsf: f64,
    /// Comps that passed selection, including lot-capped ones.
    pub comp_count: usize,
    /// Comps that contributed to the ppsf statistic.
    pub ppsf_sample_size: usize,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Search radius actually used for the comps.
    pub radius_mi: f64,
    /// Sold-in-last window actually used for the comps (months).
    pub window_months: u32,
}

/// Profit outcomes under three ARV scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitScenarios {
    pub arv_conservative: Decimal,
    pub arv_median: Decimal,
    pub arv_optimistic: Decimal,
    pub total_costs: Decimal,
    pub profit_conservative: Decimal,
    pub profit_median: Decimal,
    pub profit_optimistic: Decimal,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Exit status for a run that stopped because the daily call budget ran out.
pub const EXIT_BUDGET_EXHAUSTED: u8 = 3;

/// Exit status for every other fatal error.
pub const EXIT_FATAL: u8 = 1;

/// Domain-specific error types for ARV-SCOUT.
///
/// None of these are recovered from inside the pipeline apart from the
/// gateway's bounded retry on transient upstream failures.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("Schema violation ({context}): {message}")]
    SchemaViolation { context: String, message: String },

    #[error("Upstream unavailable ({endpoint}) after {attempts} attempt(s): {message}")]
    UpstreamUnavailable {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("Endpoint not supported by the current plan ({endpoint}): HTTP {status}")]
    EndpointUnsupported { endpoint: String, status: u16 },

    #[error("Daily call budget exhausted: {used}/{limit} calls used for {day}")]
    BudgetExhausted {
        day: NaiveDate,
        used: u32,
        limit: u32,
    },

    #[error("Insufficient comps for {zpid}: {message}")]
    InsufficientComps { zpid: String, message: String },

    #[error("Row construction failed for {zpid}: {message}")]
    RowConstructionFailure { zpid: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ScoutError {
    pub fn schema(context: impl Into<String>, message: impl Into<String>) -> Self {
        ScoutError::SchemaViolation {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, ScoutError::BudgetExhausted { .. })
    }
}

impl From<sqlx::Error> for ScoutError {
    fn from(e: sqlx::Error) -> Self {
        ScoutError::Storage(e.to_string())
    }
}

/// Pipeline stage, used to label fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Search,
    Details,
    Comps,
    Filter,
    Arv,
    Profit,
    Row,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Search => "search",
            Stage::Details => "details",
            Stage::Comps => "comps",
            Stage::Filter => "comp-filter",
            Stage::Arv => "arv",
            Stage::Profit => "profit",
            Stage::Row => "row",
            Stage::Sink => "sink",
        };
        write!(f, "{s}")
    }
}

/// A fatal pipeline error with the property and stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed{}: {error}", property_suffix(.property))]
pub struct PipelineFailure {
    /// zpid of the property being processed; `None` during search.
    pub property: Option<String>,
    pub stage: Stage,
    #[source]
    pub error: ScoutError,
}

fn property_suffix(property: &Option<String>) -> String {
    property
        .as_ref()
        .map(|p| format!(" for property {p}"))
        .unwrap_or_default()
}

impl PipelineFailure {
    pub fn new(property: Option<&str>, stage: Stage, error: ScoutError) -> Self {
        Self {
            property: property.map(str::to_string),
            stage,
            error,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        if self.error.is_budget_exhausted() {
            EXIT_BUDGET_EXHAUSTED
        } else {
            EXIT_FATAL
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
