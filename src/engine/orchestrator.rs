//! Pipeline orchestrator: search → details → comps → filter → ARV →
//! profit → row → deal screen → sink, one property at a time.
//!
//! Any failure ends the run. The error carries the property and the
//! stage it failed in; the caller maps it to an exit status.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::row::CsvRow;
use super::sink::RowSink;
use crate::config::{AppConfig, ArvConfig, DealScreen, Filters};
use crate::provider::{ProviderClient, SearchCursor, Transport};
use crate::types::{CompRecord, PipelineFailure, PropertyDetails, ScoutError, SearchHit, Stage};
use crate::valuation::comps::{self, CompSelection, SQFT_TOLERANCE};
use crate::valuation::{ArvEstimator, ProfitCalculator};

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Search results processed.
    pub hits: usize,
    pub rows_written: usize,
    /// Rows dropped by the deal screen.
    pub screened_out: usize,
    /// Outbound calls admitted against the daily budget.
    pub calls_admitted: u32,
    pub cache_hits: u64,
}

/// What happened to a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Written,
    Screened,
}

pub struct PipelineOrchestrator<T: Transport, S: RowSink> {
    client: ProviderClient<T>,
    estimator: ArvEstimator,
    profit: ProfitCalculator,
    filters: Filters,
    arv: ArvConfig,
    deal_screen: DealScreen,
    sink: S,
    /// One timestamp for every row of the run.
    ts_utc: String,
}

impl<T: Transport, S: RowSink> PipelineOrchestrator<T, S> {
    pub fn new(client: ProviderClient<T>, config: &AppConfig, sink: S) -> Self {
        Self {
            client,
            estimator: ArvEstimator::new(config.arv.adjustments.clone()),
            profit: ProfitCalculator::new(config.profit.clone()),
            filters: config.filters.clone(),
            arv: config.arv.clone(),
            deal_screen: config.deal_screen.clone(),
            sink,
            ts_utc: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    /// Run the whole pipeline over every configured geography.
    ///
    /// Each search page is fully processed before the next one is
    /// requested.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineFailure> {
        let mut summary = RunSummary::default();
        let mut cursor = SearchCursor::new(&self.filters);

        while let Some(hits) = self
            .client
            .next_page(&self.filters, &mut cursor)
            .await
            .map_err(|e| PipelineFailure::new(None, Stage::Search, e))?
        {
            for hit in hits {
                summary.hits += 1;
                match self.process(&hit).await? {
                    RowOutcome::Written => summary.rows_written += 1,
                    RowOutcome::Screened => summary.screened_out += 1,
                }
            }
        }

        self.sink
            .finish()
            .map_err(|e| PipelineFailure::new(None, Stage::Sink, e))?;

        let gateway = self.client.gateway();
        summary.calls_admitted = gateway.calls_admitted();
        summary.cache_hits = gateway.cache_hits();

        info!(
            hits = summary.hits,
            rows = summary.rows_written,
            screened_out = summary.screened_out,
            calls = summary.calls_admitted,
            cache_hits = summary.cache_hits,
            budget_remaining = gateway.budget().remaining(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Take one search hit all the way to the sink.
    pub async fn process(&mut self, hit: &SearchHit) -> Result<RowOutcome, PipelineFailure> {
        let zpid = hit.summary.zpid.as_str();
        debug!(zpid, geo = %hit.geo, page = hit.page, "Processing property");

        let details = self
            .client
            .details(zpid)
            .await
            .map_err(at(zpid, Stage::Details))?;

        let raw = self
            .client
            .comps(&details, self.arv.comp_count)
            .await
            .map_err(at(zpid, Stage::Comps))?;

        let selection = self.select_comps(&details, raw).await?;

        let arv = self
            .estimator
            .estimate(&details, &selection)
            .map_err(at(zpid, Stage::Arv))?;

        let profit = self
            .profit
            .compute(&arv, details.price)
            .map_err(at(zpid, Stage::Profit))?;

        let row = CsvRow::build(hit, &details, &arv, profit.as_ref(), &self.ts_utc)
            .map_err(at(zpid, Stage::Row))?;

        if let Some(max) = self.deal_screen.max_list_to_arv_pct {
            if row.list_to_arv_pct > max {
                debug!(
                    zpid,
                    list_to_arv = row.list_to_arv_pct,
                    max,
                    "Filtered out by deal screen"
                );
                return Ok(RowOutcome::Screened);
            }
        }

        self.sink.write_row(&row).map_err(at(zpid, Stage::Sink))?;

        info!(
            zpid,
            arv = row.arv_estimate,
            comps = row.comp_count,
            confidence = row.arv_confidence,
            list_to_arv = row.list_to_arv_pct,
            "Row written"
        );
        Ok(RowOutcome::Written)
    }

    /// Filter raw comps, re-requesting once with the extended sold window
    /// when too few survive.
    async fn select_comps(
        &mut self,
        subject: &PropertyDetails,
        raw: Vec<CompRecord>,
    ) -> Result<CompSelection, PipelineFailure> {
        let zpid = subject.zpid.as_str();
        let radius = self.arv.comp_radius_mi;
        let mut selection = comps::select(subject, &raw, radius, self.arv.comp_window_months);

        if selection.len() < self.arv.min_comps {
            if let Some(ext) = self.arv.extend_window_if_insufficient {
                if subject.coordinates().is_none() {
                    warn!(zpid, "Too few comps and no coordinates; cannot extend the sold window");
                } else {
                    info!(
                        zpid,
                        kept = selection.len(),
                        min_comps = self.arv.min_comps,
                        window_months = ext,
                        "Too few comps; extending sold window"
                    );
                    match self.client.sold_comps(subject, ext).await {
                        Ok(extended_raw) => {
                            let extended = comps::select(subject, &extended_raw, radius, ext);
                            if extended.len() > selection.len() {
                                selection = extended;
                            }
                        }
                        Err(ScoutError::InsufficientComps { .. }) => {
                            debug!(zpid, "Extended window found no sales");
                        }
                        Err(e) => return Err(PipelineFailure::new(Some(zpid), Stage::Comps, e)),
                    }
                }
            }
        }

        if selection.is_empty() {
            return Err(PipelineFailure::new(
                Some(zpid),
                Stage::Filter,
                ScoutError::InsufficientComps {
                    zpid: zpid.to_string(),
                    message: format!(
                        "none of {} comps is a {} within ±{:.0}% of {:.0} sqft",
                        raw.len(),
                        subject.home_type,
                        SQFT_TOLERANCE * 100.0,
                        subject.sqft
                    ),
                },
            ));
        }
        if selection.len() < self.arv.min_comps {
            warn!(
                zpid,
                comps = selection.len(),
                min_comps = self.arv.min_comps,
                "Proceeding with fewer comps than configured minimum"
            );
        }
        Ok(selection)
    }

    pub fn client(&self) -> &ProviderClient<T> {
        &self.client
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

fn at(zpid: &str, stage: Stage) -> impl FnOnce(ScoutError) -> PipelineFailure + '_ {
    move |e| PipelineFailure::new(Some(zpid), stage, e)
}
