use crate::canvas::{Canvas, Document};
use crate::debug::DebugLogger;
use crate::grid::GridSpec;
use crate::layout::{Cursor, HeaderAssets, LayoutContext, LayoutStats, separator};
use crate::model::DocumentData;
use crate::sections::SECTIONS;
use crate::types::Pt;
use std::time::Instant;

/// Vertical span one section occupied. Pages are zero-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionExtent {
    pub name: &'static str,
    pub page_start: usize,
    pub y_start: Pt,
    pub page_end: usize,
    pub y_end: Pt,
}

impl SectionExtent {
    fn start(&self) -> (usize, Pt) {
        (self.page_start, self.y_start)
    }

    fn end(&self) -> (usize, Pt) {
        (self.page_end, self.y_end)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutReport {
    pub sections: Vec<SectionExtent>,
    pub stats: LayoutStats,
    pub pages: usize,
    /// Content ran past the bottom margin.
    pub overflowed: bool,
    pub layout_ms: f64,
}

impl LayoutReport {
    /// Cursor position after the last section, on the last page.
    pub fn content_bottom(&self) -> Option<Pt> {
        self.sections.last().map(|extent| extent.y_end)
    }
}

/// Lays out one DANFSe: the fixed section sequence with a rule between
/// consecutive sections. Content past the bottom margin continues on a new
/// page, and every page gets the frame border.
pub struct DocTemplate {
    grid: GridSpec,
    debug: Option<DebugLogger>,
    debug_doc_id: Option<usize>,
}

impl DocTemplate {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            debug: None,
            debug_doc_id: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: DebugLogger, doc_id: Option<usize>) -> Self {
        self.debug = Some(debug);
        self.debug_doc_id = doc_id;
        self
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn build(&self, data: &DocumentData, assets: &HeaderAssets) -> Document {
        self.build_with_report(data, assets).0
    }

    pub fn build_with_report(
        &self,
        data: &DocumentData,
        assets: &HeaderAssets,
    ) -> (Document, LayoutReport) {
        let started = Instant::now();
        let frame = self.grid.frame();
        let mut canvas = Canvas::new(self.grid.page);
        let mut sections = Vec::with_capacity(SECTIONS.len());

        let (stats, pages) = {
            let mut ctx = LayoutContext::new(&mut canvas, &self.grid, assets);
            let mut cursor = Cursor::at(frame.y);
            for (index, &(name, section)) in SECTIONS.iter().enumerate() {
                if index > 0 {
                    cursor = separator(&mut ctx, cursor);
                }
                let start = cursor;
                let page_start = ctx.page_index();
                let end = section(&mut ctx, data, start);
                let page_end = ctx.page_index();
                cursor = if page_end > page_start {
                    end
                } else {
                    if end < start {
                        log::warn!("section {name} moved the cursor upwards; clamping");
                    }
                    end.lowest(start)
                };
                log::trace!(
                    "section {name}: page {} {:.2}mm -> page {} {:.2}mm",
                    page_start + 1,
                    start.y.to_mm(),
                    page_end + 1,
                    cursor.y.to_mm()
                );
                sections.push(SectionExtent {
                    name,
                    page_start,
                    y_start: start.y,
                    page_end,
                    y_end: cursor.y,
                });
            }

            // drawn last, from the margins rather than the content extent
            ctx.frame_border();
            (ctx.stats, ctx.page_index() + 1)
        };

        let mut report = LayoutReport {
            sections,
            stats,
            pages,
            overflowed: false,
            layout_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        if let Some(bottom) = report.content_bottom() {
            if bottom > frame.bottom() {
                report.overflowed = true;
                log::warn!(
                    "content ends {:.1}mm below the bottom margin",
                    (bottom - frame.bottom()).to_mm()
                );
            }
        }
        if pages > 1 {
            log::debug!("layout continued over {pages} pages");
        }
        self.log_report(&report);

        (canvas.finish(), report)
    }

    fn log_report(&self, report: &LayoutReport) {
        let Some(logger) = self.debug.as_ref() else {
            return;
        };
        let doc_id = self.debug_doc_id.unwrap_or(0);
        for extent in &report.sections {
            logger.log_section(
                doc_id,
                extent.name,
                extent.page_start,
                extent.y_start,
                extent.y_end,
            );
        }
        if report.pages > 1 {
            logger.increment("page_breaks", (report.pages - 1) as u64);
        }
        logger.increment("truncated_fields", report.stats.truncated_fields);
        logger.increment("asset_missing", report.stats.assets_missing);
        if report.overflowed {
            logger.increment("page_overflow", 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::font::FontFace;
    use crate::layout::{ELLIPSIS, label_size};

    fn sample() -> DocumentData {
        crate::extract::extract(include_str!("../tests/fixtures/nfse.xml")).unwrap()
    }

    #[test]
    fn sections_follow_the_fixed_order_and_never_move_up() {
        let template = DocTemplate::new(GridSpec::danfse());
        let (_, report) = template.build_with_report(&sample(), &HeaderAssets::default());

        let names: Vec<&str> = report.sections.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "header",
                "access_key",
                "identification",
                "issuer",
                "payer",
                "intermediary",
                "service",
                "municipal_taxation",
                "federal_taxation",
                "totals",
                "tax_totals",
                "notes",
            ]
        );
        for extent in &report.sections {
            assert!(extent.end() >= extent.start(), "{}", extent.name);
        }
        for pair in report.sections.windows(2) {
            assert!(pair[1].start() >= pair[0].end());
        }
        assert!(!report.overflowed);
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn border_is_the_frame_and_drawn_last() {
        let grid = GridSpec::danfse();
        let frame = grid.frame();
        let template = DocTemplate::new(grid);
        let document = template.build(&sample(), &HeaderAssets::default());
        assert_eq!(document.pages.len(), 1);
        assert_eq!(
            document.pages[0].commands.last(),
            Some(&Command::StrokeRect(frame))
        );
    }

    fn strings_per_page(document: &Document) -> Vec<Vec<(Pt, String)>> {
        document
            .pages
            .iter()
            .map(|page| {
                page.commands
                    .iter()
                    .filter_map(|cmd| match cmd {
                        Command::DrawString { baseline, text, .. } => Some((*baseline, text.clone())),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn long_text_continues_on_new_pages_inside_the_frame() {
        let mut data = sample();
        data.service.description = "Consultoria tributária e contábil mensal, ".repeat(47);
        data.service.notes = "Pagamento em 30 dias mediante boleto bancário. ".repeat(42);
        assert!(data.service.description.len() > 1_900);
        let grid = GridSpec::danfse();
        let frame = grid.frame();
        let (document, report) =
            DocTemplate::new(grid).build_with_report(&data, &HeaderAssets::default());

        assert!(document.pages.len() > 1);
        assert_eq!(report.pages, document.pages.len());
        assert!(!report.overflowed);
        for (index, strings) in strings_per_page(&document).iter().enumerate() {
            assert!(!strings.is_empty(), "page {index} is empty");
            for (baseline, text) in strings {
                assert!(*baseline <= frame.bottom(), "{text:?} below the margin on page {index}");
                assert!(*baseline >= frame.y, "{text:?} above the frame on page {index}");
            }
        }
        for page in &document.pages {
            assert_eq!(page.commands.last(), Some(&Command::StrokeRect(frame)));
        }
        let last = report.sections.last().unwrap();
        assert_eq!(last.name, "notes");
        assert_eq!(last.page_end, document.pages.len() - 1);
        for pair in report.sections.windows(2) {
            assert!(pair[1].start() >= pair[0].end());
        }
    }

    #[test]
    fn template_labels_are_never_shortened() {
        let (document, report) = DocTemplate::new(GridSpec::danfse())
            .build_with_report(&sample(), &HeaderAssets::default());
        let mut face = None;
        let mut labels = Vec::new();
        for cmd in &document.pages[0].commands {
            match cmd {
                Command::SetFont { face: f, size } => face = Some((*f, *size)),
                Command::DrawString { text, .. } if face == Some((FontFace::Bold, label_size())) => {
                    labels.push(text.clone())
                }
                _ => {}
            }
        }
        assert!(labels.iter().any(|l| l.starts_with("País Resultado")));
        for label in &labels {
            assert!(!label.ends_with(ELLIPSIS), "{label:?} was cut");
        }
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn trace_records_sections_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let template = DocTemplate::new(GridSpec::danfse()).with_debug(logger.clone(), Some(3));
        let assets = HeaderAssets {
            missing: 2,
            ..HeaderAssets::default()
        };
        let (_, report) = template.build_with_report(&sample(), &assets);
        assert_eq!(report.stats.assets_missing, 2);
        logger.emit_summary("test");
        logger.flush();

        let trace = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines.len(), SECTIONS.len() + 1);
        assert!(lines[0].starts_with(r#"{"type":"layout.section","doc_id":3,"name":"header""#));
        assert!(lines[SECTIONS.len()].contains(r#""asset_missing":2"#));
    }
}
