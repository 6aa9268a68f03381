//! Flip-profit scenarios.
//!
//! Money is computed in `Decimal`: the ARV is converted once at the
//! boundary and every cost and scenario figure after that is exact.

use rust_decimal::prelude::*;
use tracing::debug;

use crate::config::ProfitConfig;
use crate::types::{ArvComputation, ProfitScenarios, ScoutError};

pub struct ProfitCalculator {
    config: ProfitConfig,
}

impl ProfitCalculator {
    pub fn new(config: ProfitConfig) -> Self {
        Self { config }
    }

    /// Access the cost assumptions.
    pub fn config(&self) -> &ProfitConfig {
        &self.config
    }

    /// Derive conservative / median / optimistic profit for one property.
    ///
    /// Returns `Ok(None)` when no rehab budget is configured: profit is
    /// then "not computed", which is different from a zero profit.
    ///
    /// Selling costs and the misc buffer are always taken on the median
    /// ARV, so the three scenarios share one cost basis.
    pub fn compute(
        &self,
        arv: &ArvComputation,
        list_price: f64,
    ) -> Result<Option<ProfitScenarios>, ScoutError> {
        let Some(rehab_budget) = self.config.rehab_budget else {
            return Ok(None);
        };

        let arv_median = to_money(arv.estimate, "arv estimate")?;
        let list_price = to_money(list_price, "list price")?;
        let c = &self.config;

        let arv_conservative = arv_median * (Decimal::ONE - c.moe_pct_conservative);
        let arv_optimistic = arv_median * (Decimal::ONE - c.moe_pct_optimistic);

        let total_costs = list_price
            + rehab_budget
            + c.closing_costs_pct * list_price
            + c.selling_costs_pct * arv_median
            + c.misc_buffer_pct * arv_median;

        let scenarios = ProfitScenarios {
            arv_conservative,
            arv_median,
            arv_optimistic,
            total_costs,
            profit_conservative: arv_conservative - total_costs,
            profit_median: arv_median - total_costs,
            profit_optimistic: arv_optimistic - total_costs,
        };

        debug!(
            zpid = %arv.zpid,
            costs = %scenarios.total_costs.round_dp(2),
            profit_median = %scenarios.profit_median.round_dp(2),
            "Profit scenarios computed"
        );

        Ok(Some(scenarios))
    }
}

/// Convert an `f64` amount to `Decimal`, rounded to cents.
fn to_money(value: f64, what: &str) -> Result<Decimal, ScoutError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| ScoutError::schema("profit", format!("{what} is not a finite amount: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn arv(estimate: f64) -> ArvComputation {
        ArvComputation {
            zpid: "1001".to_string(),
            estimate,
            baseline: estimate,
            ppsf: 200.0,
            comp_count: 5,
            ppsf_sample_size: 5,
            confidence: 0.8,
            radius_mi: 0.75,
            window_months: 6,
        }
    }

    fn config(rehab_budget: Option<Decimal>) -> ProfitConfig {
        ProfitConfig {
            rehab_budget,
            closing_costs_pct: dec!(0.03),
            selling_costs_pct: dec!(0.06),
            misc_buffer_pct: dec!(0.02),
            moe_pct_conservative: dec!(0.10),
            moe_pct_optimistic: dec!(0.03),
        }
    }

    #[test]
    fn test_reference_scenarios() {
        let calc = ProfitCalculator::new(config(Some(dec!(40000))));
        let p = calc.compute(&arv(300_000.0), 200_000.0).unwrap().unwrap();

        assert_eq!(p.arv_conservative, dec!(270000));
        assert_eq!(p.arv_median, dec!(300000));
        assert_eq!(p.arv_optimistic, dec!(291000));
        assert_eq!(p.total_costs, dec!(270000));
        assert_eq!(p.profit_conservative, dec!(0));
        assert_eq!(p.profit_median, dec!(30000));
        assert_eq!(p.profit_optimistic, dec!(21000));
    }

    #[test]
    fn test_absent_without_rehab_budget() {
        let calc = ProfitCalculator::new(config(None));
        assert!(calc.compute(&arv(300_000.0), 200_000.0).unwrap().is_none());
    }

    #[test]
    fn test_zero_budget_still_computed() {
        let calc = ProfitCalculator::new(config(Some(Decimal::ZERO)));
        let p = calc.compute(&arv(300_000.0), 200_000.0).unwrap().unwrap();
        assert_eq!(p.total_costs, dec!(230000));
    }

    #[test]
    fn test_selling_costs_pinned_to_median_arv() {
        let calc = ProfitCalculator::new(config(Some(dec!(40000))));
        let p = calc.compute(&arv(300_000.0), 200_000.0).unwrap().unwrap();
        // every scenario subtracts the same cost basis
        assert_eq!(p.arv_conservative - p.profit_conservative, p.total_costs);
        assert_eq!(p.arv_optimistic - p.profit_optimistic, p.total_costs);
    }

    #[test]
    fn test_losing_deal_goes_negative() {
        let calc = ProfitCalculator::new(config(Some(dec!(80000))));
        let p = calc.compute(&arv(250_000.0), 220_000.0).unwrap().unwrap();
        assert!(p.profit_median < Decimal::ZERO);
        assert!(p.profit_conservative < p.profit_median);
    }

    #[test]
    fn test_non_finite_arv_rejected() {
        let calc = ProfitCalculator::new(config(Some(dec!(40000))));
        assert!(calc.compute(&arv(f64::NAN), 200_000.0).is_err());
    }
}
