//! Typed provider operations on top of the retrying gateway.

use tracing::{debug, info, warn};

use super::gateway::{ProviderRequest, RetryingGateway};
use super::params::RequestParams;
use super::transport::Transport;
use super::wire::{self, SearchPage};
use crate::config::{ApiMapping, AppConfig, Filters};
use crate::types::{CompRecord, PropertyDetails, ScoutError, SearchHit};

const SEARCH_ENDPOINT: &str = "propertyExtendedSearch";
const SEARCH_PATH: &str = "/propertyExtendedSearch";
const DETAILS_ENDPOINT: &str = "property";
const DETAILS_PATH: &str = "/property";
const COMPS_ENDPOINT: &str = "propertyComps";
const COMPS_PATH: &str = "/propertyComps";
const SOLD_ENDPOINT: &str = "propertyExtendedSearch_sold";

/// Internal status used for the recently-sold comps search.
const RECENTLY_SOLD: &str = "RECENTLY_SOLD";

/// Position in the geography × page walk of a search.
#[derive(Debug, Clone)]
pub struct SearchCursor {
    geos: Vec<String>,
    geo_idx: usize,
    page: u32,
    page_cap: u32,
}

impl SearchCursor {
    pub fn new(filters: &Filters) -> Self {
        Self {
            geos: filters.geos.clone(),
            geo_idx: 0,
            page: 1,
            page_cap: filters.page_cap,
        }
    }

    pub fn is_done(&self) -> bool {
        self.geo_idx >= self.geos.len()
    }
}

pub struct ProviderClient<T: Transport> {
    gateway: RetryingGateway<T>,
    mapping: ApiMapping,
    page_size: u32,
    comp_radius_mi: f64,
    comp_window_months: u32,
    /// Set once the primary comps endpoint has answered 403/404.
    comps_unsupported: bool,
}

impl<T: Transport> ProviderClient<T> {
    pub fn new(gateway: RetryingGateway<T>, config: &AppConfig) -> Self {
        Self {
            gateway,
            mapping: config.api_mapping.clone(),
            page_size: config.provider.page_size,
            comp_radius_mi: config.arv.comp_radius_mi,
            comp_window_months: config.arv.comp_window_months,
            comps_unsupported: false,
        }
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Provider parameters for one search page.
    pub fn search_params(&self, filters: &Filters, geo: &str, page: u32) -> RequestParams {
        let m = &self.mapping;
        let mut p = RequestParams::new();
        p.insert("location", geo).insert("page", page);

        if !filters.status.is_empty() {
            let mapped: Vec<String> = filters.status.iter().map(|s| m.status(s)).collect();
            p.insert("status_type", mapped.join(","));
        }
        if !filters.home_types.is_empty() {
            let mapped: Vec<String> = filters.home_types.iter().map(|t| m.home_type(t)).collect();
            p.insert("home_type", mapped.join(","));
        }

        p.insert_opt(m.param("price_min"), filters.price_min.map(|v| v.round() as i64))
            .insert_opt(m.param("price_max"), filters.price_max.map(|v| v.round() as i64))
            .insert_opt(m.param("beds_min"), filters.beds_min)
            .insert_opt(m.param("baths_min"), filters.baths_min)
            .insert_opt(m.param("min_sqft"), filters.min_sqft)
            .insert_opt(m.param("min_lot_sqft"), filters.min_lot_sqft)
            .insert_opt(m.param("year_built_min"), filters.year_built_min)
            .insert_opt(m.param("max_dom"), filters.max_dom)
            .insert_opt(m.param("hoa_max"), filters.hoa_max);

        if filters.max_dom.is_some() {
            p.insert("sort", "days");
        }
        p
    }

    /// Fetch one page of search results for `geo`.
    async fn search_page(
        &mut self,
        filters: &Filters,
        geo: &str,
        page: u32,
    ) -> Result<SearchPage, ScoutError> {
        let request = ProviderRequest {
            entity_id: geo.to_string(),
            endpoint: SEARCH_ENDPOINT,
            path: SEARCH_PATH,
            params: self.search_params(filters, geo, page),
        };
        let result = self.gateway.call(&request, wire::decode_search).await?;

        if result.listings.len() < result.raw_count {
            debug!(
                geo,
                page,
                skipped = result.raw_count - result.listings.len(),
                "Skipped search results without zpid"
            );
        }
        info!(geo, page, found = result.raw_count, "Search page fetched");
        Ok(result)
    }

    /// Whether pagination for a geography should stop after `page`.
    fn is_last_page(&self, result: &SearchPage, page: u32) -> bool {
        result.raw_count < self.page_size as usize
            || result.total_pages.is_some_and(|total| page >= total)
    }

    /// Fetch the page under `cursor` and advance it. `None` once every
    /// geography has been walked to its last page or the page cap.
    pub async fn next_page(
        &mut self,
        filters: &Filters,
        cursor: &mut SearchCursor,
    ) -> Result<Option<Vec<SearchHit>>, ScoutError> {
        if cursor.is_done() {
            return Ok(None);
        }
        let geo = cursor.geos[cursor.geo_idx].clone();
        let page = cursor.page;
        if page == 1 {
            info!(geo = %geo, "Searching");
        }

        let result = self.search_page(filters, &geo, page).await?;
        if self.is_last_page(&result, page) || page >= cursor.page_cap {
            cursor.geo_idx += 1;
            cursor.page = 1;
        } else {
            cursor.page += 1;
        }

        let hits = result
            .listings
            .into_iter()
            .map(|summary| SearchHit {
                summary,
                geo: geo.clone(),
                page,
            })
            .collect();
        Ok(Some(hits))
    }

    /// Every listing for every configured geography, in search order.
    pub async fn search(&mut self, filters: &Filters) -> Result<Vec<SearchHit>, ScoutError> {
        let mut cursor = SearchCursor::new(filters);
        let mut hits = Vec::new();
        while let Some(page) = self.next_page(filters, &mut cursor).await? {
            hits.extend(page);
        }
        Ok(hits)
    }

    // -----------------------------------------------------------------------
    // Details
    // -----------------------------------------------------------------------

    pub async fn details(&mut self, zpid: &str) -> Result<PropertyDetails, ScoutError> {
        let request = ProviderRequest {
            entity_id: zpid.to_string(),
            endpoint: DETAILS_ENDPOINT,
            path: DETAILS_PATH,
            params: RequestParams::new().with("zpid", zpid),
        };
        self.gateway.call(&request, wire::decode_details).await
    }

    // -----------------------------------------------------------------------
    // Comps
    // -----------------------------------------------------------------------

    /// Comparable sales for `subject`.
    ///
    /// Uses the comps endpoint while the plan supports it and the
    /// recently-sold search around the subject otherwise.
    pub async fn comps(
        &mut self,
        subject: &PropertyDetails,
        count: u32,
    ) -> Result<Vec<CompRecord>, ScoutError> {
        if !self.comps_unsupported {
            let request = ProviderRequest {
                entity_id: subject.zpid.clone(),
                endpoint: COMPS_ENDPOINT,
                path: COMPS_PATH,
                params: RequestParams::new()
                    .with("zpid", &subject.zpid)
                    .with("count", count),
            };
            let coords = subject.coordinates();
            let result = self
                .gateway
                .call(&request, |body| wire::decode_comps(COMPS_ENDPOINT, body, coords))
                .await;

            match result {
                Ok(comps) => return Ok(without_subject(comps, &subject.zpid)),
                Err(ScoutError::EndpointUnsupported { status, .. }) => {
                    warn!(
                        status,
                        "Comps endpoint unavailable on this plan; using recently-sold search for the rest of the run"
                    );
                    self.comps_unsupported = true;
                }
                Err(e) => return Err(e),
            }
        }

        self.sold_comps(subject, self.comp_window_months).await
    }

    /// Recently-sold homes of the subject's type within the comp radius,
    /// sold in the last `window_months`.
    pub async fn sold_comps(
        &mut self,
        subject: &PropertyDetails,
        window_months: u32,
    ) -> Result<Vec<CompRecord>, ScoutError> {
        let (lat, lng) = subject.coordinates().ok_or_else(|| {
            ScoutError::schema(
                "recently-sold comps",
                format!("property {} has no coordinates", subject.zpid),
            )
        })?;

        let mut params = RequestParams::new();
        params
            .insert("status_type", self.mapping.status(RECENTLY_SOLD))
            .insert("latitude", lat)
            .insert("longitude", lng)
            .insert("radius", self.comp_radius_mi)
            .insert("soldInLast", window_months)
            .insert("home_type", self.mapping.home_type(&subject.home_type));

        let request = ProviderRequest {
            entity_id: subject.zpid.clone(),
            endpoint: SOLD_ENDPOINT,
            path: SEARCH_PATH,
            params,
        };
        let comps = self
            .gateway
            .call(&request, |body| {
                wire::decode_comps(SOLD_ENDPOINT, body, Some((lat, lng)))
            })
            .await?;
        let comps = without_subject(comps, &subject.zpid);

        if comps.is_empty() {
            return Err(ScoutError::InsufficientComps {
                zpid: subject.zpid.clone(),
                message: format!(
                    "no recent sales within {} mi over the last {window_months} months",
                    self.comp_radius_mi
                ),
            });
        }
        info!(zpid = %subject.zpid, window_months, comps = comps.len(), "Used recently-sold fallback");
        Ok(comps)
    }

    pub fn comps_unsupported(&self) -> bool {
        self.comps_unsupported
    }

    pub fn gateway(&self) -> &RetryingGateway<T> {
        &self.gateway
    }
}

/// A property is never its own comp.
fn without_subject(comps: Vec<CompRecord>, zpid: &str) -> Vec<CompRecord> {
    comps.into_iter().filter(|c| c.id != zpid).collect()
}
