//! Integration tests: retry / fallback orchestration against scripted
//! models, and the full run over generated demo folders with an injected
//! client — no network, no API keys.

use async_trait::async_trait;
use pdf2ledger::metrics::UsageLog;
use pdf2ledger::pipeline::structure::RetryPolicy;
use pdf2ledger::{
    run, Currency, EtlError, GenerativeModel, InvoiceStore, ModelCallError, ModelResponse,
    PipelineConfig, StructuringError, Structurer, WriteMode,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Scripted model ───────────────────────────────────────────────────────

/// Returns a pre-scripted sequence of results, one per `generate` call.
struct ScriptedModel {
    name: String,
    script: Mutex<VecDeque<Result<ModelResponse, ModelCallError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(
        name: &str,
        script: impl IntoIterator<Item = Result<ModelResponse, ModelCallError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _text: &str) -> Result<ModelResponse, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("model '{}' called more times than scripted", self.name))
    }
}

/// Always answers with the same response; used for end-to-end runs where the
/// call count is not known in advance.
struct FixedModel {
    name: String,
    text: String,
    calls: AtomicUsize,
}

impl FixedModel {
    fn new(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerativeModel for FixedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _text: &str) -> Result<ModelResponse, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ok_response(&self.text))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

const VALID_CSV: &str = "fecha_factura;proveedor;concepto;importe;moneda\n\
                         15/01/2024;Acme SAS;Desarrollo web;3.500.000;pesos\n\
                         20/01/2024;AWS;Hosting cloud;150.00;dolares";

fn ok_response(text: &str) -> ModelResponse {
    ModelResponse {
        text: text.to_string(),
        prompt_tokens: 120,
        completion_tokens: 40,
    }
}

fn overload() -> ModelCallError {
    ModelCallError::new("HTTP 503: the model is overloaded")
}

fn bad_gateway() -> ModelCallError {
    ModelCallError::new("HTTP 502: bad gateway")
}

/// A structurer with no backoff delay, metering into `dir`.
fn structurer(
    primary: Arc<dyn GenerativeModel>,
    fallback: Option<Arc<dyn GenerativeModel>>,
    max_attempts: u32,
    dir: &Path,
) -> Structurer {
    Structurer::new(
        primary,
        fallback,
        RetryPolicy {
            max_attempts,
            base_ms: 0,
            cap_ms: 0,
            jitter_ms: 0,
        },
        UsageLog::new(dir.join("usage.csv")),
    )
}

// ── Retry / fallback orchestration ───────────────────────────────────────

#[tokio::test]
async fn retries_until_success_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(
        "primary",
        [Err(bad_gateway()), Err(bad_gateway()), Ok(ok_response(VALID_CSV))],
    );

    let s = structurer(primary.clone(), None, 5, dir.path());
    let text = s.structure("invoice text").await.unwrap();

    assert_eq!(text, VALID_CSV);
    assert_eq!(primary.calls(), 3, "stops at the first success");
}

#[tokio::test]
async fn overload_switches_to_fallback_for_remaining_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new("primary", [Err(overload())]);
    let fallback = ScriptedModel::new(
        "fallback",
        [Err(bad_gateway()), Ok(ok_response(VALID_CSV))],
    );

    let s = structurer(primary.clone(), Some(fallback.clone()), 5, dir.path());
    s.structure("invoice text").await.unwrap();

    // One primary call, then every retry goes to the fallback — even after a
    // non-overload failure there.
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 2);
}

#[tokio::test]
async fn non_overload_errors_never_switch_models() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(
        "primary",
        [Err(bad_gateway()), Err(bad_gateway()), Ok(ok_response(VALID_CSV))],
    );
    let fallback = ScriptedModel::new("fallback", []);

    let s = structurer(primary.clone(), Some(fallback.clone()), 5, dir.path());
    s.structure("invoice text").await.unwrap();

    assert_eq!(primary.calls(), 3);
    assert_eq!(fallback.calls(), 0, "fallback reserved for overloads");
}

#[tokio::test]
async fn exhausted_budget_reports_attempts_and_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(
        "primary",
        [Err(bad_gateway()), Err(bad_gateway()), Err(overload())],
    );

    let s = structurer(primary.clone(), None, 3, dir.path());
    let err = s.structure("invoice text").await.unwrap_err();

    assert_eq!(primary.calls(), 3);
    let StructuringError::Exhausted { attempts, detail } = err;
    assert_eq!(attempts, 3);
    assert!(detail.contains("503"), "keeps the last error: {detail}");
}

#[tokio::test]
async fn every_attempt_appends_one_metrics_row() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(
        "primary",
        [Err(bad_gateway()), Ok(ok_response(VALID_CSV))],
    );

    let s = structurer(primary, None, 5, dir.path());
    s.structure("invoice text").await.unwrap();

    let csv = std::fs::read_to_string(dir.path().join("usage.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3, "header + one row per attempt:\n{csv}");
    assert!(lines[0].starts_with("timestamp,model,"));
    assert!(lines[1].ends_with(",false"), "failed attempt: {}", lines[1]);
    assert!(lines[2].ends_with(",true"), "successful attempt: {}", lines[2]);
}

// ── End-to-end runs over demo folders ────────────────────────────────────

fn e2e_config(dir: &Path, client: Arc<dyn GenerativeModel>, mode: WriteMode) -> PipelineConfig {
    PipelineConfig::builder()
        .input_dir(dir.join("facturas"))
        .db_url(format!("sqlite://{}", dir.join("ledger.db").display()))
        .write_mode(mode)
        .client(client)
        .max_retries(2)
        .backoff_base_ms(0)
        .backoff_jitter_ms(0)
        .metrics_path(dir.join("usage.csv"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn full_run_loads_demo_invoices_and_skips_corrupted_files() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("facturas");
    std::fs::create_dir(&invoices).unwrap();
    pdf2ledger::demo::generate_demo_invoices(&invoices, 0).unwrap();
    // A PDF in name only; extraction fails and the file is skipped.
    std::fs::write(invoices.join("broken.pdf"), b"not a pdf at all").unwrap();

    let model = FixedModel::new("mock-model", VALID_CSV);
    let config = e2e_config(dir.path(), model.clone(), WriteMode::Append);
    let output = run(&config).await.unwrap();

    assert_eq!(output.stats.files_found, 5);
    assert_eq!(output.stats.files_processed, 4);
    assert_eq!(output.stats.files_skipped, 1);
    // Two records per structured response, four readable files.
    assert_eq!(output.records_written, 8);
    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    // One USD record per response, converted before persistence.
    assert_eq!(output.stats.usd_converted, 4);

    let store = InvoiceStore::connect(&config.db_url).await.unwrap();
    let rows = store.fetch_all().await.unwrap();
    assert_eq!(rows.len(), 8);
    let aws = rows.iter().find(|r| r.proveedor == "AWS").unwrap();
    assert_eq!(aws.importe, Some(150.0 * 4_500.0));

    assert!(dir.path().join("usage.csv").exists());
}

#[tokio::test]
async fn replace_mode_discards_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("facturas");
    std::fs::create_dir(&invoices).unwrap();
    pdf2ledger::demo::generate_demo_invoices(&invoices, 0).unwrap();

    let model: Arc<dyn GenerativeModel> = FixedModel::new("mock-model", VALID_CSV);
    let first = run(&e2e_config(dir.path(), model.clone(), WriteMode::Append))
        .await
        .unwrap();
    let second = run(&e2e_config(dir.path(), model, WriteMode::Replace))
        .await
        .unwrap();
    assert_eq!(first.records_written, second.records_written);

    let db_url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let store = InvoiceStore::connect(&db_url).await.unwrap();
    assert_eq!(store.count().await.unwrap(), second.records_written);
}

#[tokio::test]
async fn run_fails_when_no_file_yields_records() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("facturas");
    std::fs::create_dir(&invoices).unwrap();
    std::fs::write(invoices.join("broken.pdf"), b"garbage").unwrap();

    let model = FixedModel::new("mock-model", VALID_CSV);
    let err = run(&e2e_config(dir.path(), model, WriteMode::Append))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::NoRecords { files: 1 }));
}

#[tokio::test]
async fn run_fails_on_missing_folder_and_empty_folder() {
    let dir = tempfile::tempdir().unwrap();
    let model: Arc<dyn GenerativeModel> = FixedModel::new("mock-model", VALID_CSV);

    let err = run(&e2e_config(dir.path(), model.clone(), WriteMode::Append))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::InputDirNotFound { .. }));

    std::fs::create_dir(dir.path().join("facturas")).unwrap();
    let err = run(&e2e_config(dir.path(), model, WriteMode::Append))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::NoPdfsFound { .. }));
}

#[tokio::test]
async fn model_reported_failure_skips_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("facturas");
    std::fs::create_dir(&invoices).unwrap();
    pdf2ledger::demo::generate_demo_invoices(&invoices, 0).unwrap();

    // The model answers the failure token for every file: nothing parses,
    // nothing is persisted, and the model is never retried for it.
    let model = FixedModel::new("mock-model", "error");
    let err = run(&e2e_config(dir.path(), model.clone(), WriteMode::Append))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::NoRecords { files: 4 }));
    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn currency_flows_from_wire_label_to_cop_rows() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("facturas");
    std::fs::create_dir(&invoices).unwrap();
    pdf2ledger::demo::generate_demo_invoices(&invoices, 0).unwrap();

    let response = "fecha_factura;proveedor;concepto;importe;moneda\n\
                    12/02/2024;European Software GmbH;Licencia anual;299,99;euros";
    let model = FixedModel::new("mock-model", response);
    let config = e2e_config(dir.path(), model, WriteMode::Replace);
    let output = run(&config).await.unwrap();

    assert_eq!(output.stats.eur_converted, 4);
    let store = InvoiceStore::connect(&config.db_url).await.unwrap();
    for row in store.fetch_all().await.unwrap() {
        assert_eq!(row.importe, Some(299.99 * 4_900.0));
    }

    // Sanity: the wire label parser agrees with what the run just did.
    assert_eq!(Currency::from_label("euros"), Currency::Eur);
}
