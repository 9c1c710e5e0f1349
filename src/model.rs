//! Domain records: currencies, invoice rows, and the per-run batch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency of an invoice amount, as labelled by the structuring model.
///
/// The prompt instructs the model to label amounts `pesos`, `dolares`, or
/// `euros`; ISO codes are accepted as well since models occasionally emit
/// them anyway. Anything else is preserved verbatim in [`Currency::Other`]
/// so normalization can warn instead of silently mangling the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    /// Colombian pesos — the local currency everything is normalised into.
    Cop,
    /// US dollars.
    Usd,
    /// Euros.
    Eur,
    /// Unrecognised label, kept as-is.
    Other(String),
}

impl Currency {
    /// Parse a currency label from the wire payload.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "pesos" | "peso" | "cop" => Currency::Cop,
            "dolares" | "dólares" | "dolar" | "dólar" | "usd" => Currency::Usd,
            "euros" | "euro" | "eur" => Currency::Eur,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Cop => write!(f, "pesos"),
            Currency::Usd => write!(f, "dolares"),
            Currency::Eur => write!(f, "euros"),
            Currency::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One normalised invoice line, as returned by the structuring call.
///
/// Immutable once parsed, except for the currency-normalization pass which
/// rewrites `amount` and `currency` in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Issue date exactly as printed on the invoice (no date parsing is
    /// attempted; formats vary too much across vendors).
    pub issue_date: String,
    /// Vendor / issuer name.
    pub vendor: String,
    /// What was billed.
    pub concept: String,
    /// Amount; `None` when the model's amount field did not parse as a
    /// number. Persisted as SQL NULL.
    pub amount: Option<f64>,
    /// Currency label of `amount`.
    pub currency: Currency,
}

/// Ordered collection of records accumulated over one run.
///
/// Grows monotonically while files are processed and is written to the
/// database exactly once at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceBatch {
    records: Vec<InvoiceRecord>,
}

impl InvoiceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = InvoiceRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[InvoiceRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [InvoiceRecord] {
        &mut self.records
    }
}

impl FromIterator<InvoiceRecord> for InvoiceBatch {
    fn from_iter<T: IntoIterator<Item = InvoiceRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Fixed fallback conversion rates into COP.
///
/// Static per run; there is no live rate lookup and no by-date history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxRates {
    /// COP per USD.
    pub usd_to_cop: f64,
    /// COP per EUR.
    pub eur_to_cop: f64,
}
