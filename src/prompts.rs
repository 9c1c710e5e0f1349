//! The structuring instruction sent with every invoice.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the wire contract (header line, delimiter,
//!    currency labels, failure token) is defined in exactly one place, next
//!    to the constants the parser validates against.
//!
//! 2. **Testability** — unit tests can inspect the prompt and the header
//!    without spinning up a real model.
//!
//! Callers can override the instruction via
//! [`crate::config::PipelineConfig::instruction`]; the constant here is used
//! only when no override is provided.

/// Exact header line the model must emit as the first line of its response.
///
/// Column names are kept in Spanish: they are the wire contract with the
/// model and the column names of the persisted `facturas` table.
pub const RESPONSE_HEADER: &str = "fecha_factura;proveedor;concepto;importe;moneda";

/// Literal token the model returns when it cannot structure the text.
pub const FAILURE_TOKEN: &str = "error";

/// Default instruction for normalising raw invoice text into records.
pub const INVOICE_PROMPT: &str = r#"You are an expert accounting assistant. You will receive the raw text extracted from a PDF invoice. Convert it into a semicolon-delimited table.

Follow these rules precisely:

1. OUTPUT FORMAT
   - The first line must be exactly: fecha_factura;proveedor;concepto;importe;moneda
   - After the header, output one semicolon-delimited line per billed item
   - Output ONLY the table: no commentary, no markdown fences, no blank lines

2. FIELDS
   - fecha_factura: the issue date exactly as printed on the invoice
   - proveedor: the issuing company name
   - concepto: a short description of what was billed
   - importe: the amount as a plain number, using a comma or dot as the decimal separator, with no currency symbols or thousand separators
   - moneda: exactly one of: pesos, dolares, euros

3. CURRENCY
   - COP, pesos colombianos → pesos
   - USD, US dollars → dolares
   - EUR, euros → euros

4. FAILURE
   - If the text is not an invoice or you cannot extract the fields, respond with the single word: error"#;
