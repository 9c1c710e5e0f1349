//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap an
//! implementation (e.g. a different PDF text extractor) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ extract ──▶ structure ──▶ parse ──▶ normalize
//! (paths)     (raw text)   (LLM, retry)  (records)  (FX → COP)
//! ```
//!
//! 1. [`discover`]  — collect PDF paths from the invoice folder
//! 2. [`extract`]   — pull embedded text out of each PDF; runs in
//!    `spawn_blocking` because pdf-extract is synchronous CPU-bound work
//! 3. [`structure`] — drive the LLM call with retry/backoff and the
//!    primary→fallback model switch; the only stage with network I/O
//! 4. [`parse`]     — validate and parse the semicolon-CSV response
//! 5. [`normalize`] — convert USD/EUR amounts to COP at fixed rates

pub mod discover;
pub mod extract;
pub mod normalize;
pub mod parse;
pub mod structure;
