//! Landscape PDF report via `printpdf`. Tables paginate automatically and
//! repeat their header row on every continuation page.

use std::io::BufWriter;
use std::path::PathBuf;

use printpdf::*;
use uuid::Uuid;

use super::{ReportArtifact, ReportAssembler, ReportError};
use crate::models::control::GroupedControlRecord;
use crate::models::result::ExtractionResult;

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN_X: f32 = 12.0;
const TOP_Y: f32 = 196.0;
const BOTTOM_Y: f32 = 14.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;

const TITLE_PT: f32 = 14.0;
const HEADING_PT: f32 = 11.0;
const BODY_PT: f32 = 7.5;
const LINE_MM: f32 = 3.6;
/// Approximate Helvetica glyph width at `BODY_PT`, used for wrapping.
const CHAR_MM: f32 = 1.45;
const CELL_PAD_MM: f32 = 2.0;

const PLACEHOLDER: &str = "No records extracted.";

struct Column {
    title: &'static str,
    width: f32,
}

const VENDOR_COLUMNS: &[Column] = &[
    Column { title: "Control ID", width: 22.0 },
    Column { title: "Criterion", width: 30.0 },
    Column { title: "Title", width: 42.0 },
    Column { title: "Description", width: 78.0 },
    Column { title: "Tests Applied", width: 64.0 },
    Column { title: "Result", width: 37.0 },
];

const EXCEPTION_COLUMNS: &[Column] = &[
    Column { title: "Control / Objective", width: 45.0 },
    Column { title: "Testing Performed", width: 70.0 },
    Column { title: "Exception", width: 80.0 },
    Column { title: "Management Response", width: 78.0 },
];

const SUBSERVICE_COLUMNS: &[Column] = &[
    Column { title: "Subservice Organization", width: 55.0 },
    Column { title: "Control ID", width: 25.0 },
    Column { title: "Description", width: 148.0 },
    Column { title: "Criteria Covered", width: 45.0 },
];

const USER_ENTITY_COLUMNS: &[Column] = &[
    Column { title: "Category", width: 55.0 },
    Column { title: "Control ID", width: 25.0 },
    Column { title: "Description", width: 148.0 },
    Column { title: "Criteria Covered", width: 45.0 },
];

/// Rendered PDF bytes plus the page count.
#[derive(Debug)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Writes reports as `soc2_report_<report_id>.pdf` under `output_dir`.
pub struct PdfReportAssembler {
    output_dir: PathBuf,
}

impl PdfReportAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ReportAssembler for PdfReportAssembler {
    fn assemble(&self, result: &ExtractionResult) -> Result<ReportArtifact, ReportError> {
        let rendered = render_report(result)?;
        let report_id = Uuid::new_v4().to_string();
        let file_name = format!("soc2_report_{report_id}.pdf");

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(&file_name);
        std::fs::write(&path, &rendered.bytes)?;

        tracing::info!(
            doc_id = %result.meta.doc_id,
            report_id = %report_id,
            pages = rendered.pages,
            bytes = rendered.bytes.len(),
            "Report written"
        );

        Ok(ReportArtifact {
            report_id,
            path,
            file_name,
            pages: rendered.pages,
        })
    }
}

/// Render an extraction result to PDF bytes.
pub fn render_report(result: &ExtractionResult) -> Result<RenderedReport, ReportError> {
    let (doc, page1, layer1) =
        PdfDocument::new("SOC 2 Extraction Report", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;

    let pages = {
        let mut writer = PageWriter {
            doc: &doc,
            layer: doc.get_page(page1).get_layer(layer1),
            regular: &regular,
            bold: &bold,
            y: TOP_Y,
            pages: 1,
            table: None,
        };
        write_opinion(&mut writer, result);
        write_vendor_controls(&mut writer, result);
        write_exceptions(&mut writer, result);
        write_grouped(
            &mut writer,
            "Complementary Subservice Organization Controls",
            SUBSERVICE_COLUMNS,
            &result.subservice_controls,
        );
        write_grouped(
            &mut writer,
            "Complementary User Entity Controls",
            USER_ENTITY_COLUMNS,
            &result.user_entity_controls,
        );
        writer.pages
    };

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Render(format!("PDF save error: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| ReportError::Render(format!("PDF buffer error: {e}")))?;
    Ok(RenderedReport { bytes, pages })
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

fn write_opinion(w: &mut PageWriter<'_>, result: &ExtractionResult) {
    let opinion = &result.auditor_opinion;
    w.title("SOC 2 Extraction Report");
    w.paragraph(&format!(
        "Document {} | generated {}",
        result.meta.doc_id,
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));
    w.gap(4.0);

    w.heading("Auditor's Opinion");
    let qualified = if opinion.qualified_opinion { "Yes" } else { "No" };
    let fields = [
        ("Service / Product", opinion.service_product.as_str()),
        ("Report Type", opinion.report_type.as_str()),
        ("Scope Date", opinion.scope_date.as_str()),
        ("Auditor", opinion.auditors_name.as_str()),
        ("Qualified Opinion", qualified),
    ];
    for (label, value) in fields {
        w.paragraph(&format!("{label}: {}", or_dash(value)));
    }
    if !opinion.auditors_opinion.trim().is_empty() {
        w.gap(1.5);
        w.paragraph(&opinion.auditors_opinion);
    }

    let meta = &result.meta;
    w.gap(1.5);
    w.paragraph(&format!(
        "Extracted: {} vendor controls, {} exceptions, {} subservice controls, {} user entity controls, {} criteria mappings ({} orphan references).",
        meta.vendor_control_count,
        meta.exception_count,
        meta.subservice_control_count,
        meta.user_entity_control_count,
        meta.criteria_mapping_count,
        meta.merge.orphan_references,
    ));
    if meta.max_pass_exceeded {
        w.paragraph("Note: at least one batched phase hit its pass limit; some controls may be missing.");
    }
    w.gap(4.0);
}

fn write_vendor_controls(w: &mut PageWriter<'_>, result: &ExtractionResult) {
    w.heading("Vendor Controls");
    w.begin_table(VENDOR_COLUMNS);
    if result.vendor_controls.is_empty() {
        w.placeholder();
    }
    for control in &result.vendor_controls {
        let criteria = control.criterion.iter().cloned().collect::<Vec<_>>().join(", ");
        let tests = control.tests_applied.join("; ");
        w.row(&[
            control.control_id.as_str(),
            criteria.as_str(),
            control.control_title.as_str(),
            control.control_description.as_str(),
            tests.as_str(),
            control.result.as_str(),
        ]);
    }
    w.end_table();
}

fn write_exceptions(w: &mut PageWriter<'_>, result: &ExtractionResult) {
    w.heading("Exceptions");
    w.begin_table(EXCEPTION_COLUMNS);
    if result.exceptions.is_empty() {
        w.placeholder();
    }
    for exception in &result.exceptions {
        w.row(&[
            exception.control_objective.as_str(),
            exception.testing_description.as_str(),
            exception.exception_description.as_str(),
            exception.management_response.as_str(),
        ]);
    }
    w.end_table();
}

fn write_grouped(
    w: &mut PageWriter<'_>,
    heading: &str,
    columns: &'static [Column],
    groups: &[GroupedControlRecord],
) {
    w.heading(heading);
    w.begin_table(columns);
    if groups.iter().all(|g| g.controls.is_empty()) {
        w.placeholder();
    }
    for group in groups {
        for control in &group.controls {
            let criteria = control.criteria_covered.iter().cloned().collect::<Vec<_>>().join(", ");
            w.row(&[
                group.name.as_str(),
                control.control_id.as_str(),
                control.description.as_str(),
                criteria.as_str(),
            ]);
        }
    }
    w.end_table();
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

// ═══════════════════════════════════════════════════════════
// Page writer
// ═══════════════════════════════════════════════════════════

/// Cursor over the current page. Starts a new landscape page whenever the
/// next block would cross the bottom margin.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    regular: &'a IndirectFontRef,
    bold: &'a IndirectFontRef,
    /// Baseline of the next line, in mm from the bottom edge.
    y: f32,
    pages: usize,
    /// Table whose header is repeated after a page break.
    table: Option<&'static [Column]>,
}

impl PageWriter<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", self.pages + 1));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages += 1;
        self.y = TOP_Y;
        if let Some(columns) = self.table {
            self.header_row(columns);
        }
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM_Y {
            self.new_page();
        }
    }

    fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { self.bold } else { self.regular };
        self.layer.use_text(pdf_safe(text), size, Mm(x), Mm(self.y), font);
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn title(&mut self, text: &str) {
        self.ensure_space(8.0);
        self.text(text, TITLE_PT, MARGIN_X, true);
        self.y -= 7.0;
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading on the same page as at least two body lines.
        self.ensure_space(6.0 + 3.0 * LINE_MM);
        self.text(text, HEADING_PT, MARGIN_X, true);
        self.y -= 6.0;
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap_text(text, chars_for(CONTENT_WIDTH)) {
            self.ensure_space(LINE_MM);
            self.text(&line, BODY_PT, MARGIN_X, false);
            self.y -= LINE_MM;
        }
    }

    // A page break taken here must not draw the header on its own.
    fn begin_table(&mut self, columns: &'static [Column]) {
        self.ensure_space(3.0 * LINE_MM);
        self.table = Some(columns);
        self.header_row(columns);
    }

    fn end_table(&mut self) {
        self.table = None;
        self.y -= 5.0;
    }

    fn header_row(&mut self, columns: &[Column]) {
        let mut x = MARGIN_X;
        for column in columns {
            self.text(column.title, BODY_PT, x, true);
            x += column.width;
        }
        self.y -= LINE_MM + 1.0;
    }

    fn placeholder(&mut self) {
        self.ensure_space(LINE_MM);
        self.text(PLACEHOLDER, BODY_PT, MARGIN_X, false);
        self.y -= LINE_MM + 1.0;
    }

    fn row(&mut self, cells: &[&str]) {
        let Some(columns) = self.table else {
            return;
        };
        let wrapped: Vec<Vec<String>> = columns
            .iter()
            .zip(cells)
            .map(|(column, cell)| wrap_text(cell, chars_for(column.width - CELL_PAD_MM)))
            .collect();
        let line_count = wrapped.iter().map(Vec::len).max().unwrap_or(1);

        // Rows that fit on a fresh page are never split.
        let height = line_count as f32 * LINE_MM;
        self.ensure_space(height.min(TOP_Y - BOTTOM_Y - 2.0 * LINE_MM));

        for i in 0..line_count {
            self.ensure_space(LINE_MM);
            let mut x = MARGIN_X;
            for (column, lines) in columns.iter().zip(&wrapped) {
                if let Some(line) = lines.get(i) {
                    self.text(line, BODY_PT, x, false);
                }
                x += column.width;
            }
            self.y -= LINE_MM;
        }
        self.y -= 1.0;
    }
}

fn chars_for(width_mm: f32) -> usize {
    ((width_mm / CHAR_MM) as usize).max(4)
}

/// Word-wrap to `max_chars`, hard-splitting words longer than a line.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let current_len = current.chars().count();
        if current_len > 0 && current_len + word.chars().count() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Builtin fonts only cover Latin-1; map common typographic characters to
/// ASCII and replace the rest.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '*',
            '\t' => ' ',
            c if (c as u32) < 0x20 => ' ',
            c if (c as u32) <= 0xFF => c,
            _ => '?',
        })
        .collect()
}
