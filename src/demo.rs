//! Demo invoice generation.
//!
//! Writes sample invoice PDFs into the input folder so the pipeline can be
//! exercised without real invoices or a scanner: four fixed invoices
//! covering the three currencies, plus any number of randomised ones.
//! Existing files are never overwritten.

use crate::error::EtlError;
use chrono::{Duration, Utc};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rand::Rng;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Data printed onto one demo invoice.
#[derive(Debug, Clone)]
pub struct DemoInvoice {
    pub file_name: String,
    pub vendor: String,
    pub tax_id: String,
    /// dd/mm/yyyy, as Colombian invoices print it.
    pub date: String,
    pub concept: String,
    /// Amount as printed, e.g. "3.500.000" or "150.00".
    pub amount_text: String,
    /// "COP", "USD", or "EUR".
    pub currency: String,
}

/// The four predefined demo invoices (two COP, one USD, one EUR).
fn fixed_invoices() -> Vec<DemoInvoice> {
    vec![
        DemoInvoice {
            file_name: "demo_servicios_web.pdf".into(),
            vendor: "Desarrollo Web Pro SAS".into(),
            tax_id: "901234567-8".into(),
            date: "15/01/2024".into(),
            concept: "Desarrollo sitio web corporativo".into(),
            amount_text: "3.500.000".into(),
            currency: "COP".into(),
        },
        DemoInvoice {
            file_name: "demo_amazon_hosting.pdf".into(),
            vendor: "Amazon Web Services".into(),
            tax_id: "US123456789".into(),
            date: "20/01/2024".into(),
            concept: "Servicios de hosting cloud AWS".into(),
            amount_text: "150.00".into(),
            currency: "USD".into(),
        },
        DemoInvoice {
            file_name: "demo_consultoria_tech.pdf".into(),
            vendor: "Tech Solutions Colombia LTDA".into(),
            tax_id: "800987654-3".into(),
            date: "05/02/2024".into(),
            concept: "Consultoría en automatización de procesos".into(),
            amount_text: "5.800.000".into(),
            currency: "COP".into(),
        },
        DemoInvoice {
            file_name: "demo_software_europa.pdf".into(),
            vendor: "European Software Solutions GmbH".into(),
            tax_id: "DE987654321".into(),
            date: "12/02/2024".into(),
            concept: "Licencia software de gestión empresarial".into(),
            amount_text: "299.99".into(),
            currency: "EUR".into(),
        },
    ]
}

const VENDORS: &[(&str, &str, &str)] = &[
    ("TechCorp Solutions SAS", "901000000-1", "COP"),
    ("Global Systems Inc", "US555666777", "USD"),
    ("European Tech GmbH", "DE123456789", "EUR"),
    ("Digital Services LTDA", "800999888-7", "COP"),
    ("Cloud Computing Corp", "US777888999", "USD"),
    ("Innovation Labs S.A.", "FR987654321", "EUR"),
];

const CONCEPTS: &[&str] = &[
    "Desarrollo de aplicación móvil",
    "Consultoría en transformación digital",
    "Licencia de software empresarial",
    "Servicios de hosting y dominio",
    "Mantenimiento de sistemas",
    "Auditoría de seguridad informática",
    "Migración a la nube",
    "Desarrollo de API REST",
    "Capacitación técnica",
];

/// A randomised invoice dated within the last 180 days.
fn random_invoice(index: usize) -> DemoInvoice {
    let mut rng = rand::thread_rng();
    let (vendor, tax_id, currency) = VENDORS[rng.gen_range(0..VENDORS.len())];
    let concept = CONCEPTS[rng.gen_range(0..CONCEPTS.len())];
    let date = (Utc::now() - Duration::days(rng.gen_range(1..=180)))
        .format("%d/%m/%Y")
        .to_string();

    let amount_text = match currency {
        // COP amounts print with dot thousands separators and no decimals.
        "COP" => {
            let thousands: i64 = rng.gen_range(500..=10_000);
            format_cop(thousands * 1_000)
        }
        "USD" => format!("{}.{:02}", rng.gen_range(50..=2_000), rng.gen_range(0..100)),
        _ => format!("{}.{:02}", rng.gen_range(100..=1_500), rng.gen_range(0..100)),
    };

    DemoInvoice {
        file_name: format!("random_{}_{:03}.pdf", Utc::now().timestamp(), index + 1),
        vendor: vendor.to_string(),
        tax_id: tax_id.to_string(),
        date,
        concept: concept.to_string(),
        amount_text,
        currency: currency.to_string(),
    }
}

/// Group digits with dots: 3500000 → "3.500.000".
fn format_cop(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Generate the fixed demo invoices plus `random_count` randomised ones
/// under `dir`. Returns the paths actually created (existing files are
/// skipped, not overwritten).
pub fn generate_demo_invoices(dir: &Path, random_count: usize) -> Result<Vec<PathBuf>, EtlError> {
    if !dir.is_dir() {
        return Err(EtlError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut invoices = fixed_invoices();
    invoices.extend((0..random_count).map(random_invoice));

    let mut created = Vec::new();
    for invoice in invoices {
        let path = dir.join(&invoice.file_name);
        if path.exists() {
            debug!("Demo invoice already exists, skipping: {}", path.display());
            continue;
        }
        write_invoice_pdf(&path, &invoice)?;
        info!("Created demo invoice {}", path.display());
        created.push(path);
    }
    Ok(created)
}

/// Render one invoice as a single-page letter-size PDF.
fn write_invoice_pdf(path: &Path, invoice: &DemoInvoice) -> Result<(), EtlError> {
    let failed = |detail: String| EtlError::DemoWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    // US letter: 215.9 × 279.4 mm.
    let (doc, page, layer) = PdfDocument::new("Factura", Mm(215.9), Mm(279.4), "contenido");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| failed(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| failed(e.to_string()))?;
    let layer = doc.get_page(page).get_layer(layer);

    let currency_name = match invoice.currency.as_str() {
        "COP" => "Pesos Colombianos",
        "USD" => "Dólares Estadounidenses",
        "EUR" => "Euros",
        other => other,
    };

    layer.use_text("FACTURA ELECTRÓNICA", 18.0, Mm(20.0), Mm(260.0), &bold);
    layer.use_text("DATOS DEL EMISOR:", 12.0, Mm(20.0), Mm(240.0), &bold);
    layer.use_text(
        format!("Empresa: {}", invoice.vendor),
        11.0,
        Mm(20.0),
        Mm(232.0),
        &regular,
    );
    layer.use_text(
        format!("NIT/ID: {}", invoice.tax_id),
        11.0,
        Mm(20.0),
        Mm(225.0),
        &regular,
    );
    layer.use_text(
        format!("Fecha de emisión: {}", invoice.date),
        11.0,
        Mm(20.0),
        Mm(218.0),
        &regular,
    );

    layer.use_text("DETALLE DE PRODUCTOS/SERVICIOS:", 14.0, Mm(20.0), Mm(198.0), &bold);
    layer.use_text(
        format!("Descripción: {}", invoice.concept),
        11.0,
        Mm(20.0),
        Mm(189.0),
        &regular,
    );
    layer.use_text("Cantidad: 1 unidad", 11.0, Mm(20.0), Mm(182.0), &regular);

    layer.use_text(
        format!("VALOR TOTAL: {} {}", invoice.amount_text, invoice.currency),
        12.0,
        Mm(20.0),
        Mm(165.0),
        &bold,
    );
    layer.use_text(
        format!("Moneda: {currency_name}"),
        10.0,
        Mm(20.0),
        Mm(158.0),
        &regular,
    );

    layer.use_text(
        "Factura generada para pruebas del sistema ETL",
        8.0,
        Mm(20.0),
        Mm(15.0),
        &regular,
    );

    let file = File::create(path).map_err(|e| failed(e.to_string()))?;
    doc.save(&mut BufWriter::new(file))
        .map_err(|e| failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cop_amounts_group_thousands() {
        assert_eq!(format_cop(3_500_000), "3.500.000");
        assert_eq!(format_cop(500_000), "500.000");
        assert_eq!(format_cop(999), "999");
    }

    #[test]
    fn generates_fixed_invoices_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let created = generate_demo_invoices(dir.path(), 0).unwrap();
        assert_eq!(created.len(), 4);
        for path in &created {
            let bytes = std::fs::read(path).unwrap();
            assert!(bytes.starts_with(b"%PDF"), "{} is not a PDF", path.display());
        }

        // Second call creates nothing — every fixed file already exists.
        let again = generate_demo_invoices(dir.path(), 0).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn random_invoices_have_plausible_fields() {
        let inv = random_invoice(0);
        assert!(inv.file_name.starts_with("random_"));
        assert!(["COP", "USD", "EUR"].contains(&inv.currency.as_str()));
        assert_eq!(inv.date.len(), 10, "dd/mm/yyyy, got {}", inv.date);
    }

    #[test]
    fn missing_target_dir_is_an_error() {
        let err = generate_demo_invoices(Path::new("/no/such/dir"), 0).unwrap_err();
        assert!(matches!(err, EtlError::InputDirNotFound { .. }));
    }
}
