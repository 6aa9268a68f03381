//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads the run's TOML file and deserializes it into strongly-typed
//! structs. Every section has defaults, so a file containing only
//! `[filters] geos = [...]` is a valid configuration. Secrets (the
//! provider API key) are referenced by env-var name and resolved at
//! runtime.
//!
//! A second, optional layer holds settings parsed from a free-text
//! prompt (JSON). It is merged *under* the strict file: whenever both
//! layers set the same key, the strict file wins.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;

/// Sections a free-text overlay is allowed to populate.
const OVERLAY_SECTIONS: [&str; 4] = ["filters", "arv", "profit", "deal_screen"];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub filters: Filters,
    pub api_mapping: ApiMapping,
    pub arv: ArvConfig,
    pub profit: ProfitConfig,
    pub deal_screen: DealScreen,
    /// Free-text intent the overlay was parsed from. Informational only.
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    /// RapidAPI host, also sent as `x-rapidapi-host`.
    pub host: String,
    /// Overrides `https://{host}`; handy for pointing at a local stub.
    pub base_url: Option<String>,
    /// Name of the env var holding the RapidAPI key.
    pub api_key_env: String,
    /// Outbound calls admitted per UTC day.
    pub daily_limit: u32,
    pub timeout_secs: u64,
    /// Total attempts per logical call, first try included.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Results per search page; a shorter page ends pagination.
    pub page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: "zillow-com1.p.rapidapi.com".to_string(),
            base_url: None,
            api_key_env: "RAPIDAPI_KEY".to_string(),
            daily_limit: 100,
            timeout_secs: 20,
            max_attempts: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 8000,
            page_size: 41,
        }
    }
}

impl ProviderConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.host))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the response cache lives in memory for this run only.
    pub enabled: bool,
    pub path: String,
    pub clear_before_run: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "cache.db".to_string(),
            clear_before_run: false,
        }
    }
}

/// Listing search filters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Filters {
    pub geos: Vec<String>,
    pub status: Vec<String>,
    pub home_types: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub beds_min: Option<u32>,
    pub baths_min: Option<u32>,
    pub min_sqft: Option<u32>,
    pub min_lot_sqft: Option<u32>,
    pub year_built_min: Option<i32>,
    pub max_dom: Option<u32>,
    pub hoa_max: Option<f64>,
    /// Maximum search pages fetched per geography.
    pub page_cap: u32,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            geos: Vec::new(),
            status: vec!["FOR_SALE".to_string()],
            home_types: vec!["SINGLE_FAMILY".to_string()],
            price_min: None,
            price_max: None,
            beds_min: None,
            baths_min: None,
            min_sqft: None,
            min_lot_sqft: None,
            year_built_min: None,
            max_dom: None,
            hoa_max: None,
            page_cap: 5,
        }
    }
}

/// Translation from internal filter vocabulary to provider parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiMapping {
    pub status_map: BTreeMap<String, String>,
    pub home_type_map: BTreeMap<String, String>,
    pub param_map: BTreeMap<String, String>,
}

impl Default for ApiMapping {
    fn default() -> Self {
        let pairs = |items: &[(&str, &str)]| -> BTreeMap<String, String> {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            status_map: pairs(&[
                ("FOR_SALE", "ForSale"),
                ("SOLD", "Sold"),
                ("RECENTLY_SOLD", "RecentlySold"),
                ("PENDING", "Pending"),
            ]),
            home_type_map: pairs(&[
                ("SINGLE_FAMILY", "SingleFamily"),
                ("CONDO", "Condo"),
                ("TOWNHOUSE", "Townhouse"),
                ("MULTI_FAMILY", "MultiFamily"),
                ("LOT", "Lot"),
                ("MOBILE", "Mobile"),
                ("FARM", "Farm"),
            ]),
            param_map: pairs(&[
                ("price_min", "minPrice"),
                ("price_max", "maxPrice"),
                ("beds_min", "bedsMin"),
                ("baths_min", "bathsMin"),
                ("min_sqft", "sqftMin"),
                ("min_lot_sqft", "lotSizeMin"),
                ("year_built_min", "buildYearMin"),
                ("max_dom", "daysOn"),
                ("hoa_max", "maxHOA"),
            ]),
        }
    }
}

impl ApiMapping {
    pub fn status(&self, status: &str) -> String {
        self.status_map
            .get(status)
            .cloned()
            .unwrap_or_else(|| status.to_string())
    }

    pub fn home_type(&self, home_type: &str) -> String {
        self.home_type_map
            .get(home_type)
            .cloned()
            .unwrap_or_else(|| home_type.to_string())
    }

    pub fn param<'a>(&'a self, internal: &'a str) -> &'a str {
        self.param_map
            .get(internal)
            .map(String::as_str)
            .unwrap_or(internal)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PpsfMethod {
    #[default]
    Median,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMethod {
    #[default]
    NIqr,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ArvAdjustments {
    /// ARV change per bedroom of difference from the comp median.
    pub bed_step_pct: f64,
    /// ARV change per bathroom of difference from the comp median.
    pub bath_step_pct: f64,
    /// Comps with lot > ratio × subject lot are kept out of the ppsf statistic.
    pub lot_size_cap_ratio: f64,
}

impl Default for ArvAdjustments {
    fn default() -> Self {
        Self {
            bed_step_pct: 0.04,
            bath_step_pct: 0.05,
            lot_size_cap_ratio: 2.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ArvConfig {
    pub comp_radius_mi: f64,
    pub comp_window_months: u32,
    /// Sold-in-last window (months) for the one re-request made when too
    /// few comps survive filtering. `None` disables the extension.
    pub extend_window_if_insufficient: Option<u32>,
    pub min_comps: usize,
    /// Comps requested from the primary comps endpoint.
    pub comp_count: u32,
    pub ppsf_method: PpsfMethod,
    pub confidence_method: ConfidenceMethod,
    pub adjustments: ArvAdjustments,
}

impl Default for ArvConfig {
    fn default() -> Self {
        Self {
            comp_radius_mi: 0.75,
            comp_window_months: 6,
            extend_window_if_insufficient: Some(12),
            min_comps: 3,
            comp_count: 25,
            ppsf_method: PpsfMethod::Median,
            confidence_method: ConfidenceMethod::NIqr,
            adjustments: ArvAdjustments::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProfitConfig {
    /// No budget means no profit scenarios are computed.
    pub rehab_budget: Option<Decimal>,
    pub closing_costs_pct: Decimal,
    pub selling_costs_pct: Decimal,
    pub misc_buffer_pct: Decimal,
    pub moe_pct_conservative: Decimal,
    pub moe_pct_optimistic: Decimal,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            rehab_budget: None,
            closing_costs_pct: dec!(0.03),
            selling_costs_pct: dec!(0.06),
            misc_buffer_pct: dec!(0.02),
            moe_pct_conservative: dec!(0.10),
            moe_pct_optimistic: dec!(0.03),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct DealScreen {
    /// Rows with list_price / ARV above this ratio are not written.
    pub max_list_to_arv_pct: Option<f64>,
}

impl AppConfig {
    /// Load configuration from a TOML file, optionally layering the JSON
    /// produced from a free-text prompt underneath it.
    pub fn load(path: &str, overlay_path: Option<&str>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;

        let overlay = match overlay_path {
            Some(p) => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("Failed to read overlay file: {p}"))?;
                let value: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse overlay file: {p}"))?;
                Some(value)
            }
            None => None,
        };

        Self::from_toml_str(&contents, overlay)
            .with_context(|| format!("Invalid configuration in {path}"))
    }

    /// Build a configuration from TOML text plus an optional parsed overlay.
    pub fn from_toml_str(contents: &str, overlay: Option<Value>) -> Result<Self> {
        let strict: Value = toml::from_str(contents).context("Failed to parse TOML")?;
        let parsed = overlay.map(prune_overlay).unwrap_or(Value::Null);

        let merged = merge(strict, parsed);
        let config: AppConfig =
            serde_json::from_value(merged).context("Configuration does not match the schema")?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks the types cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.filters.geos.is_empty() {
            bail!("filters.geos must list at least one search geography");
        }
        if self.filters.page_cap == 0 {
            bail!("filters.page_cap must be at least 1");
        }
        if self.provider.page_size == 0 {
            bail!("provider.page_size must be at least 1");
        }
        if self.provider.daily_limit == 0 {
            bail!("provider.daily_limit must be at least 1");
        }
        if self.provider.max_attempts == 0 {
            bail!("provider.max_attempts must be at least 1");
        }
        if self.arv.min_comps == 0 {
            bail!("arv.min_comps must be at least 1");
        }
        if !(self.arv.comp_radius_mi > 0.0) {
            bail!("arv.comp_radius_mi must be positive");
        }
        if self.arv.comp_window_months == 0 {
            bail!("arv.comp_window_months must be at least 1");
        }
        if let Some(ext) = self.arv.extend_window_if_insufficient {
            if ext <= self.arv.comp_window_months {
                bail!(
                    "arv.extend_window_if_insufficient ({ext}) must exceed comp_window_months ({})",
                    self.arv.comp_window_months
                );
            }
        }
        if !(self.arv.adjustments.lot_size_cap_ratio > 0.0) {
            bail!("arv.adjustments.lot_size_cap_ratio must be positive");
        }

        let p = &self.profit;
        for (name, value) in [
            ("closing_costs_pct", p.closing_costs_pct),
            ("selling_costs_pct", p.selling_costs_pct),
            ("misc_buffer_pct", p.misc_buffer_pct),
            ("moe_pct_conservative", p.moe_pct_conservative),
            ("moe_pct_optimistic", p.moe_pct_optimistic),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                bail!("profit.{name} must lie in [0, 1], got {value}");
            }
        }
        if matches!(p.rehab_budget, Some(b) if b < Decimal::ZERO) {
            bail!("profit.rehab_budget must not be negative");
        }
        if matches!(self.deal_screen.max_list_to_arv_pct, Some(r) if !(r > 0.0)) {
            bail!("deal_screen.max_list_to_arv_pct must be positive");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

/// Deep-merge two configuration layers. Keys present in `strict` always
/// win; nested tables are merged key by key.
pub fn merge(strict: Value, parsed: Value) -> Value {
    match (strict, parsed) {
        (Value::Object(strict), Value::Object(mut result)) => {
            for (key, value) in strict {
                let merged = match result.remove(&key) {
                    Some(existing) if value.is_object() && existing.is_object() => {
                        merge(value, existing)
                    }
                    _ => value,
                };
                result.insert(key, merged);
            }
            Value::Object(result)
        }
        (Value::Null, parsed) => parsed,
        (strict, _) => strict,
    }
}

/// Keep only the sections an overlay may set and drop its nulls, which
/// mean "unknown" rather than "unset the default".
fn prune_overlay(overlay: Value) -> Value {
    fn drop_nulls(value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k, drop_nulls(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    match overlay {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| OVERLAY_SECTIONS.contains(&k.as_str()))
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, drop_nulls(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}
