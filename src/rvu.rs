use chrono::NaiveDate;
use serde::Serialize;

use crate::classify::TaggedCharge;

/// Key/value facts shown alongside the RVU charge table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RvuSummary {
    pub providers: Vec<String>,
    /// Earliest service date.
    pub start_date: Option<NaiveDate>,
    /// Latest post date. Posting never precedes service, so this bounds the data.
    pub end_date: Option<NaiveDate>,
}

pub fn summarize(charges: &[TaggedCharge], providers: Vec<String>) -> RvuSummary {
    RvuSummary {
        providers,
        start_date: charges.iter().map(|c| c.charge.date).min(),
        end_date: charges.iter().map(|c| c.charge.posted_date).max(),
    }
}

/// Total work RVUs per provider alias, in alias-table order.
pub fn wrvu_by_provider(charges: &[TaggedCharge], providers: &[String]) -> Vec<(String, f64)> {
    providers
        .iter()
        .map(|provider| {
            let total: f64 = charges
                .iter()
                .filter(|c| &c.charge.provider == provider)
                .filter_map(|c| c.charge.wrvu)
                .sum();
            (provider.clone(), total)
        })
        .collect()
}
