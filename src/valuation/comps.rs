//! Comparable-sale selection.
//!
//! Keeps only comps that look like the subject: same home type and a
//! living area within ±20% of the subject's. The window extension for
//! thin selections lives in the engine, since it needs another provider
//! call; this module stays a pure function of its inputs.

use tracing::debug;

use crate::types::{CompRecord, PropertyDetails};

/// Maximum relative living-area deviation from the subject.
pub const SQFT_TOLERANCE: f64 = 0.20;

/// Comps selected for one subject, plus the search scope they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CompSelection {
    pub comps: Vec<CompRecord>,
    pub radius_mi: f64,
    pub window_months: u32,
}

impl CompSelection {
    pub fn len(&self) -> usize {
        self.comps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }
}

/// Whether `comp` is usable for valuing `subject`.
pub fn is_comparable(subject: &PropertyDetails, comp: &CompRecord) -> bool {
    if comp.ppsf().is_none() {
        return false;
    }
    let same_type = comp
        .home_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case(&subject.home_type));
    if !same_type {
        return false;
    }
    let lo = subject.sqft * (1.0 - SQFT_TOLERANCE);
    let hi = subject.sqft * (1.0 + SQFT_TOLERANCE);
    comp.sqft.is_some_and(|sqft| sqft >= lo && sqft <= hi)
}

/// Select the usable comps from a raw comp set.
pub fn select(
    subject: &PropertyDetails,
    raw_comps: &[CompRecord],
    radius_mi: f64,
    window_months: u32,
) -> CompSelection {
    let comps: Vec<CompRecord> = raw_comps
        .iter()
        .filter(|c| is_comparable(subject, c))
        .cloned()
        .collect();

    debug!(
        zpid = %subject.zpid,
        raw = raw_comps.len(),
        kept = comps.len(),
        window_months,
        "Comps filtered"
    );

    CompSelection {
        comps,
        radius_mi,
        window_months,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp_with_sqft(id: &str, sqft: f64) -> CompRecord {
        CompRecord::sample(id, 100.0, sqft)
    }

    fn deviation(c: &CompRecord, subject: &PropertyDetails) -> f64 {
        (c.sqft.unwrap_or(0.0) - subject.sqft).abs() / subject.sqft
    }

    #[test]
    fn test_sqft_band_is_inclusive() {
        let subject = PropertyDetails::sample(); // 1500 sqft
        assert!(is_comparable(&subject, &comp_with_sqft("lo", 1200.0)));
        assert!(is_comparable(&subject, &comp_with_sqft("hi", 1800.0)));
        assert!(!is_comparable(&subject, &comp_with_sqft("below", 1199.0)));
        assert!(!is_comparable(&subject, &comp_with_sqft("above", 1801.0)));
    }

    #[test]
    fn test_excludes_every_comp_outside_band() {
        let subject = PropertyDetails::sample();
        let raw: Vec<CompRecord> = (0..40)
            .map(|i| comp_with_sqft(&format!("c{i}"), 900.0 + 30.0 * i as f64))
            .collect();
        let selection = select(&subject, &raw, 0.75, 6);
        assert!(!selection.is_empty());
        for c in &selection.comps {
            let d = deviation(c, &subject);
            assert!(d <= SQFT_TOLERANCE + 1e-12, "{} deviates {d}", c.id);
        }
        let expected = raw
            .iter()
            .filter(|c| deviation(c, &subject) <= SQFT_TOLERANCE)
            .count();
        assert_eq!(selection.len(), expected);
    }

    #[test]
    fn test_home_type_must_match() {
        let subject = PropertyDetails::sample();
        let mut condo = comp_with_sqft("condo", 1500.0);
        condo.home_type = Some("CONDO".to_string());
        let mut untyped = comp_with_sqft("untyped", 1500.0);
        untyped.home_type = None;
        let mut lower = comp_with_sqft("lower", 1500.0);
        lower.home_type = Some("single_family".to_string());

        let selection = select(&subject, &[condo, untyped, lower], 0.75, 6);
        let ids: Vec<&str> = selection.comps.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["lower"]);
    }

    #[test]
    fn test_unpriced_comp_dropped() {
        let subject = PropertyDetails::sample();
        let mut free = comp_with_sqft("free", 1500.0);
        free.sale_price = None;
        assert!(!is_comparable(&subject, &free));
        let mut unsized_comp = comp_with_sqft("unsized", 1500.0);
        unsized_comp.sqft = None;
        assert!(!is_comparable(&subject, &unsized_comp));
    }

    #[test]
    fn test_selection_records_scope() {
        let subject = PropertyDetails::sample();
        let selection = select(&subject, &[comp_with_sqft("a", 1500.0)], 1.5, 12);
        assert_eq!(selection.radius_mi, 1.5);
        assert_eq!(selection.window_months, 12);
        assert_eq!(selection.len(), 1);
    }
}
