//! Parse the structuring response into invoice records.
//!
//! The wire contract (see [`crate::prompts`]): first line is exactly the
//! 5-column semicolon header, followed by one data line per billed item, or
//! the literal token `error`. Models being models, the payload sometimes
//! arrives wrapped in markdown code fences; those are stripped before
//! validation.
//!
//! Header validation is strict by design. The header is the only cheap
//! integrity signal for free-form model output — best-effort parsing of an
//! unheadered payload produces plausible-looking nonsense rows, which is
//! worse than skipping the file.

use crate::error::FileError;
use crate::model::{Currency, InvoiceRecord};
use crate::prompts::{FAILURE_TOKEN, RESPONSE_HEADER};
use serde::Deserialize;

/// Raw wire row, field names matching the header line.
#[derive(Debug, Deserialize)]
struct WireRow {
    fecha_factura: String,
    proveedor: String,
    concepto: String,
    importe: String,
    moneda: String,
}

/// Strip a wrapping markdown code fence, if present.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match body.split_once('\n') {
        Some((_lang, payload)) => payload.trim(),
        None => body.trim(),
    }
}

/// Coerce the wire `importe` field to a number.
///
/// Accepts both decimal conventions the model emits: `"1.234,56"` (dot
/// thousands, comma decimals) parses as `1234.56`, and `"150.00"` parses as
/// `150.0`. Values that are not numbers in either convention become `None`
/// rather than an error — one unreadable amount must not sink the row.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let normalised = if s.contains(',') {
        // Comma is the decimal separator; dots are thousands separators.
        s.replace('.', "").replace(',', ".")
    } else if s.matches('.').count() > 1 {
        // "3.500.000" — several dots can only be thousands separators.
        s.replace('.', "")
    } else {
        s.to_string()
    };
    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a structuring response into records.
///
/// # Errors
/// * [`FileError::ModelReportedFailure`] — the response is the failure token.
/// * [`FileError::MalformedResponse`] — missing/wrong header, or the body is
///   not valid semicolon-delimited data (unmatched quotes, wrong arity).
///
/// All errors are per-file: the caller skips the file and continues.
pub fn parse_response(text: &str) -> Result<Vec<InvoiceRecord>, FileError> {
    let payload = strip_fences(text);

    if payload.eq_ignore_ascii_case(FAILURE_TOKEN) {
        return Err(FileError::ModelReportedFailure);
    }

    let header = payload.lines().next().unwrap_or("").trim();
    if header != RESPONSE_HEADER {
        return Err(FileError::MalformedResponse {
            detail: format!("expected header '{RESPONSE_HEADER}', got '{header}'"),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(payload.as_bytes());

    let mut records = Vec::new();
    for row in reader.deserialize::<WireRow>() {
        let row = row.map_err(|e| FileError::MalformedResponse {
            detail: e.to_string(),
        })?;
        records.push(InvoiceRecord {
            issue_date: row.fecha_factura,
            vendor: row.proveedor,
            concept: row.concepto,
            amount: parse_amount(&row.importe),
            currency: Currency::from_label(&row.moneda),
        });
    }

    Ok(records)
}
