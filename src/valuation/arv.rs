//! After-Repair-Value estimation.
//!
//! Baseline ARV is the median comp price-per-square-foot times the
//! subject's living area. Bed and bath differences against the comp
//! medians then scale it, and a confidence score summarises how much
//! evidence backs the number.

use tracing::debug;

use super::comps::CompSelection;
use super::stats::{iqr, median};
use crate::config::ArvAdjustments;
use crate::types::{ArvComputation, PropertyDetails, ScoutError};

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Comp count at which the count factor reaches 1 − 1/e.
const COUNT_SCALE: f64 = 3.0;

/// Relative IQR at which the dispersion factor drops to 1/e.
const DISPERSION_SCALE: f64 = 0.25;

/// `n_iqr` confidence for `n` comps whose ppsf has relative IQR `dispersion`.
///
/// confidence = (1 − e^(−(n−1)/3)) × e^(−dispersion/0.25)
///
/// The count factor is 0 for a single comp and approaches 1 as comps
/// accumulate; the dispersion factor is 1 for perfectly agreeing comps
/// and decays towards 0 as they spread out. The product is clamped to
/// [0, 1].
pub fn confidence(n: usize, dispersion: f64) -> f64 {
    if n == 0 || !dispersion.is_finite() {
        return 0.0;
    }
    let count_factor = 1.0 - (-((n - 1) as f64) / COUNT_SCALE).exp();
    let spread_factor = (-dispersion.max(0.0) / DISPERSION_SCALE).exp();
    (count_factor * spread_factor).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

pub struct ArvEstimator {
    adjustments: ArvAdjustments,
}

impl ArvEstimator {
    pub fn new(adjustments: ArvAdjustments) -> Self {
        Self { adjustments }
    }

    /// Estimate ARV for `subject` from an already-filtered comp selection.
    ///
    /// Comps whose lot exceeds `lot_size_cap_ratio × subject lot` still
    /// count towards `comp_count` but are left out of the ppsf statistic.
    pub fn estimate(
        &self,
        subject: &PropertyDetails,
        selection: &CompSelection,
    ) -> Result<ArvComputation, ScoutError> {
        if selection.is_empty() {
            return Err(ScoutError::InsufficientComps {
                zpid: subject.zpid.clone(),
                message: "no usable comps to estimate from".to_string(),
            });
        }

        let lot_cap = subject
            .lot_sqft
            .filter(|lot| *lot > 0.0)
            .map(|lot| lot * self.adjustments.lot_size_cap_ratio);

        let ppsf_values: Vec<f64> = selection
            .comps
            .iter()
            .filter(|c| match (lot_cap, c.lot_sqft) {
                (Some(cap), Some(lot)) => lot <= cap,
                _ => true,
            })
            .filter_map(|c| c.ppsf())
            .collect();

        let median_ppsf = median(&ppsf_values).ok_or_else(|| ScoutError::InsufficientComps {
            zpid: subject.zpid.clone(),
            message: format!(
                "all {} comps exceed the lot-size cap of {:.0} sqft",
                selection.len(),
                lot_cap.unwrap_or_default()
            ),
        })?;

        let baseline = median_ppsf * subject.sqft;

        let comp_beds: Vec<f64> = selection.comps.iter().filter_map(|c| c.beds).collect();
        let comp_baths: Vec<f64> = selection.comps.iter().filter_map(|c| c.baths).collect();
        let bed_delta = median(&comp_beds).map_or(0.0, |m| subject.beds - m);
        let bath_delta = median(&comp_baths).map_or(0.0, |m| subject.baths - m);

        let multiplier = (1.0 + self.adjustments.bed_step_pct * bed_delta)
            * (1.0 + self.adjustments.bath_step_pct * bath_delta);
        let estimate = (baseline * multiplier).max(0.0);

        let dispersion = iqr(&ppsf_values).unwrap_or(0.0) / median_ppsf;
        let comp_count = selection.len();
        let confidence = confidence(comp_count, dispersion);

        debug!(
            zpid = %subject.zpid,
            median_ppsf = format!("{median_ppsf:.2}"),
            baseline = format!("{baseline:.0}"),
            bed_delta,
            bath_delta,
            estimate = format!("{estimate:.0}"),
            comp_count,
            ppsf_sample = ppsf_values.len(),
            dispersion = format!("{dispersion:.3}"),
            confidence = format!("{confidence:.3}"),
            "ARV estimated"
        );

        Ok(ArvComputation {
            zpid: subject.zpid.clone(),
            estimate,
            baseline,
            ppsf: median_ppsf,
            comp_count,
            ppsf_sample_size: ppsf_values.len(),
            confidence,
            radius_mi: selection.radius_mi,
            window_months: selection.window_months,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
