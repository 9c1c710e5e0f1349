//! Currency normalization: fold every amount into COP.
//!
//! Applies the fixed fallback rates from [`crate::model::FxRates`] —
//! multiply and relabel, nothing more. Records carry no "already converted"
//! flag, so this pass is idempotent only if applied exactly once; the
//! pipeline runs it a single time, immediately before persistence.

use crate::model::{Currency, FxRates, InvoiceBatch};
use serde::Serialize;
use tracing::{info, warn};

/// Per-currency conversion counts for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub usd_converted: usize,
    pub eur_converted: usize,
}

/// Convert every non-COP record in place and relabel it `pesos`.
///
/// Unrecognised currency labels are left untouched (amount and label) with
/// a WARN — inventing a rate would corrupt the ledger silently.
pub fn normalize_currencies(batch: &mut InvoiceBatch, rates: &FxRates) -> ConversionSummary {
    let mut summary = ConversionSummary::default();

    for record in batch.records_mut() {
        let rate = match &record.currency {
            Currency::Cop => continue,
            Currency::Usd => {
                summary.usd_converted += 1;
                rates.usd_to_cop
            }
            Currency::Eur => {
                summary.eur_converted += 1;
                rates.eur_to_cop
            }
            Currency::Other(label) => {
                warn!(
                    "No conversion rate for currency '{label}' (vendor '{}'), leaving amount as-is",
                    record.vendor
                );
                continue;
            }
        };

        if let Some(amount) = record.amount.as_mut() {
            *amount *= rate;
        }
        record.currency = Currency::Cop;
    }

    if summary.usd_converted > 0 {
        info!("Converted {} USD invoices to COP", summary.usd_converted);
    }
    if summary.eur_converted > 0 {
        info!("Converted {} EUR invoices to COP", summary.eur_converted);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InvoiceRecord;

    fn record(amount: Option<f64>, currency: Currency) -> InvoiceRecord {
        InvoiceRecord {
            issue_date: "15/01/2024".into(),
            vendor: "Acme".into(),
            concept: "thing".into(),
            amount,
            currency,
        }
    }

    const RATES: FxRates = FxRates {
        usd_to_cop: 4_500.0,
        eur_to_cop: 4_900.0,
    };

    #[test]
    fn usd_converts_and_relabels() {
        let mut batch: InvoiceBatch = [record(Some(100.0), Currency::Usd)].into_iter().collect();
        let summary = normalize_currencies(&mut batch, &RATES);
        assert_eq!(summary.usd_converted, 1);
        assert_eq!(batch.records()[0].amount, Some(450_000.0));
        assert_eq!(batch.records()[0].currency, Currency::Cop);
    }

    #[test]
    fn local_currency_unchanged() {
        let mut batch: InvoiceBatch = [record(Some(3_500_000.0), Currency::Cop)]
            .into_iter()
            .collect();
        let summary = normalize_currencies(&mut batch, &RATES);
        assert_eq!(summary, ConversionSummary::default());
        assert_eq!(batch.records()[0].amount, Some(3_500_000.0));
    }

    #[test]
    fn eur_converts_missing_amount_stays_missing() {
        let mut batch: InvoiceBatch = [
            record(Some(299.99), Currency::Eur),
            record(None, Currency::Eur),
        ]
        .into_iter()
        .collect();
        let summary = normalize_currencies(&mut batch, &RATES);
        assert_eq!(summary.eur_converted, 2);
        assert_eq!(batch.records()[0].amount, Some(299.99 * 4_900.0));
        // A missing amount converts to… still missing, but the label moves.
        assert_eq!(batch.records()[1].amount, None);
        assert_eq!(batch.records()[1].currency, Currency::Cop);
    }

    #[test]
    fn unknown_currency_left_alone() {
        let mut batch: InvoiceBatch = [record(Some(10.0), Currency::Other("yenes".into()))]
            .into_iter()
            .collect();
        normalize_currencies(&mut batch, &RATES);
        assert_eq!(batch.records()[0].amount, Some(10.0));
        assert_eq!(batch.records()[0].currency, Currency::Other("yenes".into()));
    }
}
