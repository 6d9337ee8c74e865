//! DANFSe rendering: NFS-e XML in, one-page A4 PDF out.
//!
//! ```no_run
//! let engine = danfse::Danfse::builder()
//!     .logo("assets/logo-nfse.png")
//!     .build()?;
//! let xml = std::fs::read_to_string("nfse.xml")?;
//! engine.render_to_file(&xml, "danfse.pdf")?;
//! # Ok::<(), danfse::DanfseError>(())
//! ```

mod assets;
mod canvas;
mod codes;
mod config;
mod debug;
mod doc_template;
mod error;
mod extract;
mod font;
mod format;
mod grid;
mod layout;
mod model;
mod pdf;
mod sections;
mod types;

pub use assets::{ImageAsset, ImageEncoding, ImageSource};
pub use canvas::{Align, Canvas, Command, Document, Page};
pub use codes::{CodeTable, FALLBACK, resolve};
pub use config::{AuthorityInfo, Overrides, PayerLocality, RenderConfig};
pub use doc_template::{DocTemplate, LayoutReport, SectionExtent};
pub use error::DanfseError;
pub use extract::{
    ACCESS_KEY_PREFIX, NFSE_NAMESPACE, access_key_from_id, combined_federal,
    combined_pis_cofins, extract, extract_with,
};
pub use font::FontFace;
pub use format::{
    Amount, digits_only, format_date, format_date_time, format_money, format_percent,
    format_phone, format_postal_code, format_service_code, format_tax_id, parse_cents,
};
pub use grid::{COLUMNS, GridSpec};
pub use layout::{Cursor, ELLIPSIS, HeaderAssets, LayoutStats, truncate_to_lines};
pub use model::{
    Address, Authority, DocumentData, Identification, Issuer, Payer, Service, TaxTotals,
    Taxation, Values,
};
pub use pdf::{PdfInfo, document_to_pdf, document_to_pdf_to_writer};
pub use sections::{QR_URL_PREFIX, qr_payload};
pub use types::{Color, Margins, Pt, Rect, Size};

use debug::DebugLogger;
use std::path::{Path, PathBuf};

/// Configured renderer. Cheap to share; every render builds its own canvas.
pub struct Danfse {
    grid: GridSpec,
    overrides: Overrides,
    logo: Option<ImageSource>,
    pdf_info: PdfInfo,
    debug: Option<DebugLogger>,
}

#[derive(Clone)]
pub struct DanfseBuilder {
    config: RenderConfig,
    grid: GridSpec,
}

impl Danfse {
    pub fn builder() -> DanfseBuilder {
        DanfseBuilder::new()
    }

    pub fn from_config(config: RenderConfig) -> Result<Self, DanfseError> {
        DanfseBuilder::new().config(config).build()
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    fn template(&self, doc_id: usize) -> DocTemplate {
        let template = DocTemplate::new(self.grid.clone());
        match self.debug.clone() {
            Some(logger) => template.with_debug(logger, Some(doc_id)),
            None => template,
        }
    }

    /// Extracts the record and applies this renderer's overrides.
    pub fn extract(&self, xml: &str) -> Result<DocumentData, DanfseError> {
        extract_with(xml, &self.overrides)
    }

    fn render_at(&self, doc_id: usize, xml: &str) -> Result<(Document, LayoutReport), DanfseError> {
        let data = self.extract(xml)?;
        let assets = HeaderAssets::resolve(self.logo.as_ref(), data.authority.crest.as_ref());
        let (document, report) = self.template(doc_id).build_with_report(&data, &assets);
        log::debug!(
            "laid out NFS-e {} in {:.2}ms ({} truncated, {} missing assets)",
            data.identification.number,
            report.layout_ms,
            report.stats.truncated_fields,
            report.stats.assets_missing
        );
        Ok((document, report))
    }

    pub fn render_with_report(&self, xml: &str) -> Result<(Document, LayoutReport), DanfseError> {
        let rendered = self.render_at(0, xml)?;
        self.emit_debug_summary("render_with_report");
        Ok(rendered)
    }

    pub fn render_to_document(&self, xml: &str) -> Result<Document, DanfseError> {
        let (document, _) = self.render_at(0, xml)?;
        self.emit_debug_summary("render_to_document");
        Ok(document)
    }

    pub fn render_to_buffer(&self, xml: &str) -> Result<Vec<u8>, DanfseError> {
        let (document, _) = self.render_at(0, xml)?;
        let bytes = pdf::document_to_pdf(&document, &self.pdf_info)?;
        self.emit_debug_summary("render_to_buffer");
        Ok(bytes)
    }

    pub fn render_to_writer<W: std::io::Write>(
        &self,
        xml: &str,
        writer: &mut W,
    ) -> Result<usize, DanfseError> {
        let (document, _) = self.render_at(0, xml)?;
        let bytes_written = pdf::document_to_pdf_to_writer(&document, &self.pdf_info, writer)?;
        self.emit_debug_summary("render_to_writer");
        Ok(bytes_written)
    }

    /// Nothing is created on disk when extraction fails.
    pub fn render_to_file(&self, xml: &str, path: impl AsRef<Path>) -> Result<usize, DanfseError> {
        let bytes = self.render_to_buffer(xml)?;
        std::fs::write(path, &bytes)?;
        Ok(bytes.len())
    }

    // Parallel batch rendering: lay out documents in parallel, then merge in input order.
    pub fn render_many_to_buffer_parallel(&self, xml_list: &[String]) -> Result<Vec<u8>, DanfseError> {
        use rayon::prelude::*;

        let mut results: Vec<(usize, Result<Document, DanfseError>)> = xml_list
            .par_iter()
            .enumerate()
            .map(|(idx, xml)| (idx, self.render_at(idx, xml).map(|(doc, _)| doc)))
            .collect();
        results.sort_by_key(|(idx, _)| *idx);

        let mut documents = Vec::with_capacity(results.len());
        for (_, res) in results {
            documents.push(res?);
        }

        let merged = Document::merge(documents).ok_or_else(|| {
            DanfseError::InvalidConfiguration("batch render needs at least one document".into())
        })?;
        let bytes = pdf::document_to_pdf(&merged, &self.pdf_info)?;
        self.emit_debug_summary("render_many_to_buffer_parallel");
        Ok(bytes)
    }
}

impl Default for DanfseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DanfseBuilder {
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
            grid: GridSpec::danfse(),
        }
    }

    /// Replaces every configured value with `config`.
    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.config.creator = creator.into();
        self
    }

    pub fn logo(mut self, source: impl Into<ImageSource>) -> Self {
        self.config.logo = Some(source.into());
        self
    }

    pub fn municipality(mut self, info: AuthorityInfo) -> Self {
        self.config.overrides.municipality = Some(info);
        self
    }

    pub fn payer_locality(mut self, locality: PayerLocality) -> Self {
        self.config.overrides.payer_locality = Some(locality);
        self
    }

    /// Writes a JSON-lines layout trace to `path`.
    pub fn trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.trace_path = Some(path.into());
        self
    }

    pub fn grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    pub fn build(self) -> Result<Danfse, DanfseError> {
        validate_grid(&self.grid)?;
        let debug = match self.config.trace_path.as_ref() {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let pdf_info = PdfInfo {
            title: non_empty(self.config.title),
            creator: non_empty(self.config.creator),
            ..PdfInfo::default()
        };
        Ok(Danfse {
            grid: self.grid,
            overrides: self.config.overrides,
            logo: self.config.logo,
            pdf_info,
            debug,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn validate_grid(grid: &GridSpec) -> Result<(), DanfseError> {
    if grid.columns.iter().any(|width| *width <= Pt::ZERO) {
        return Err(DanfseError::InvalidConfiguration(
            "grid columns must have positive widths".to_string(),
        ));
    }
    let frame = grid.frame();
    if frame.width <= Pt::ZERO || frame.height <= Pt::ZERO {
        return Err(DanfseError::InvalidConfiguration(
            "margins leave no room on the page".to_string(),
        ));
    }
    if grid.content_width() > frame.width {
        return Err(DanfseError::InvalidConfiguration(format!(
            "grid columns ({:.1}mm) are wider than the frame ({:.1}mm)",
            grid.content_width().to_mm(),
            frame.width.to_mm()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../tests/fixtures/nfse.xml");

    fn page_text(pdf: &lopdf::Document, page_id: lopdf::ObjectId) -> String {
        let content = pdf.get_page_content(page_id).expect("page content");
        String::from_utf8_lossy(&content).into_owned()
    }

    #[test]
    fn renders_a_single_page_pdf() {
        let engine = Danfse::builder().build().expect("engine");
        let bytes = engine.render_to_buffer(SAMPLE).expect("render");
        assert!(bytes.starts_with(b"%PDF-1.7"));

        let pdf = lopdf::Document::load_mem(&bytes).expect("valid pdf");
        let pages = pdf.get_pages();
        assert_eq!(pages.len(), 1);
        let (_, page_id) = pages.iter().next().expect("one page");
        let text = page_text(&pdf, *page_id);
        assert!(text.contains("(DANFSe v1.0) Tj"));
        assert!(text.contains("(42042042212345678000195000000000000725010123456789) Tj"));
        assert!(text.contains("(R$ 1.422,75) Tj"));
    }

    #[test]
    fn render_to_buffer_pdf_bytes_are_deterministic() {
        let a = Danfse::builder().build().expect("engine a").render_to_buffer(SAMPLE).expect("a");
        let b = Danfse::builder().build().expect("engine b").render_to_buffer(SAMPLE).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn parse_errors_propagate_and_write_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        let engine = Danfse::builder().build().expect("engine");
        let err = engine.render_to_file("<NFSe>", &path).expect_err("malformed");
        assert!(err.is_parse_failure());
        assert!(!path.exists());
    }

    #[test]
    fn missing_logo_still_renders() {
        let engine = Danfse::builder()
            .logo("/nonexistent/logo-nfse.png")
            .build()
            .expect("engine");
        let (_, report) = engine.render_with_report(SAMPLE).expect("render");
        assert_eq!(report.stats.assets_missing, 1);

        let plain = Danfse::builder().build().expect("plain");
        let with_missing = engine.render_to_document(SAMPLE).expect("doc");
        let without = plain.render_to_document(SAMPLE).expect("doc");
        assert_eq!(with_missing.pages, without.pages);
    }

    #[test]
    fn render_to_file_and_writer_agree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("danfse.pdf");
        let engine = Danfse::builder().title("NFSe-7.pdf").build().expect("engine");
        let written = engine.render_to_file(SAMPLE, &path).expect("file");
        let on_disk = std::fs::read(&path).expect("read back");
        assert_eq!(written, on_disk.len());

        let mut buffer = Vec::new();
        let count = engine.render_to_writer(SAMPLE, &mut buffer).expect("writer");
        assert_eq!(count, buffer.len());
        assert_eq!(buffer, on_disk);
        assert!(String::from_utf8_lossy(&buffer).contains("/Title (NFSe-7.pdf)"));
    }

    #[test]
    fn parallel_batch_keeps_input_order() {
        let second = SAMPLE.replace("<nNFSe>7</nNFSe>", "<nNFSe>8</nNFSe>");
        let engine = Danfse::builder().build().expect("engine");
        let bytes = engine
            .render_many_to_buffer_parallel(&[SAMPLE.to_string(), second])
            .expect("batch");
        let pdf = lopdf::Document::load_mem(&bytes).expect("valid pdf");
        let pages: Vec<lopdf::ObjectId> = pdf.get_pages().values().copied().collect();
        assert_eq!(pages.len(), 2);
        assert!(page_text(&pdf, pages[0]).contains("(7) Tj"));
        assert!(page_text(&pdf, pages[1]).contains("(8) Tj"));
    }

    #[test]
    fn batch_fails_on_first_bad_document() {
        let engine = Danfse::builder().build().expect("engine");
        let err = engine
            .render_many_to_buffer_parallel(&[SAMPLE.to_string(), "<x/>".to_string()])
            .expect_err("bad second document");
        assert!(err.is_parse_failure());
        assert!(matches!(
            engine.render_many_to_buffer_parallel(&[]),
            Err(DanfseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn payer_locality_override_reaches_the_page() {
        let engine = Danfse::builder()
            .payer_locality(PayerLocality::new("Sapiranga", "RS"))
            .municipality(AuthorityInfo {
                department: Some("Secretaria Municipal da Fazenda".into()),
                ..AuthorityInfo::default()
            })
            .build()
            .expect("engine");
        let document = engine.render_to_document(SAMPLE).expect("doc");
        let texts: Vec<&str> = document.pages[0]
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"Sapiranga - RS"));
        assert!(texts.contains(&"Secretaria Municipal da Fazenda"));
    }

    #[test]
    fn trace_file_gets_sections_and_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let engine = Danfse::builder().trace_path(&path).build().expect("engine");
        engine.render_to_buffer(SAMPLE).expect("render");
        let trace = std::fs::read_to_string(&path).expect("trace");
        assert_eq!(trace.matches("\"type\":\"layout.section\"").count(), 12);
        assert!(trace.contains("\"type\":\"debug.summary\",\"context\":\"render_to_buffer\""));
    }

    #[test]
    fn every_render_path_closes_its_own_trace_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let engine = Danfse::builder().trace_path(&path).build().expect("engine");
        engine.render_to_document(SAMPLE).expect("document");
        engine.render_with_report(SAMPLE).expect("report");
        engine.render_to_buffer(SAMPLE).expect("buffer");

        let trace = std::fs::read_to_string(&path).expect("trace");
        let summaries: Vec<&str> = trace
            .lines()
            .filter(|line| line.contains("\"type\":\"debug.summary\""))
            .collect();
        assert_eq!(summaries.len(), 3);
        assert!(summaries[0].contains("\"context\":\"render_to_document\""));
        assert!(summaries[1].contains("\"context\":\"render_with_report\""));
        assert!(summaries[2].contains("\"context\":\"render_to_buffer\""));
        let counts = |line: &str| line.split_once("\"counts\":").map(|(_, c)| c.to_string());
        assert_eq!(counts(summaries[0]), counts(summaries[2]));
        assert_eq!(counts(summaries[1]), counts(summaries[2]));
    }

    #[test]
    fn long_descriptions_continue_on_another_page() {
        let xml = SAMPLE
            .replace(
                "Hospedagem de aplicação web e banco de dados referente a março de 2024, incluindo \
                 monitoramento, cópias de segurança diárias e suporte técnico em horário comercial.",
                &"Consultoria tributaria e contabil mensal, ".repeat(47),
            )
            .replace(
                "Contrato 2024/017. Pagamento via boleto bancário com vencimento em 25/03/2024.",
                &"Pagamento em 30 dias mediante boleto bancario. ".repeat(42),
            );
        assert!(xml.contains("Consultoria tributaria"));
        assert!(xml.contains("Pagamento em 30 dias"));

        let engine = Danfse::builder().build().expect("engine");
        let bytes = engine.render_to_buffer(&xml).expect("render");
        let pdf = lopdf::Document::load_mem(&bytes).expect("valid pdf");
        let pages: Vec<lopdf::ObjectId> = pdf.get_pages().values().copied().collect();
        assert!(pages.len() > 1);
        for page_id in &pages {
            assert!(page_text(&pdf, *page_id).trim_end().ends_with("re\nS"));
        }
        let last = pages.last().copied().expect("last page");
        assert!(page_text(&pdf, last).contains("(Pagamento em 30 dias"));
    }

    #[test]
    fn rejects_grids_wider_than_the_frame() {
        let mut grid = GridSpec::danfse();
        grid.columns[0] = grid.columns[0] + Pt::from_mm(20.0);
        assert!(matches!(
            Danfse::builder().grid(grid).build(),
            Err(DanfseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn builds_from_toml_config() {
        let config = RenderConfig::from_toml_str(
            r#"
            title = "DANFSe 7"

            [payer_locality]
            name = "Novo Hamburgo"
            uf = "RS"
            "#,
        )
        .expect("config");
        let engine = Danfse::from_config(config).expect("engine");
        let data = engine.extract(SAMPLE).expect("extract");
        assert_eq!(data.payer.municipality, "Novo Hamburgo - RS");
    }
}
