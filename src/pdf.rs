use anyhow::{Context, Result};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::records::{render_solver_log, SolveRecord};
use crate::solver_log::{parse_sections, Section};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const ROW_HEIGHT: f32 = 7.0;
const LINE_HEIGHT: f32 = 5.5;
const COLUMN_WIDTHS: [f32; 2] = [110.0, 50.0];

const MM_PER_PT: f32 = 0.3528;
/// Average Helvetica glyph width, in ems.
const GLYPH_WIDTH: f32 = 0.6;
const CELL_PADDING: f32 = 2.0;
const ELLIPSIS: &str = "...";

pub const NO_WEIGHTS: &str = "No optimal portfolio weights available.";

/// Sections for the records' own solver log.
pub fn sections_from_records(records: &[SolveRecord]) -> Vec<Section> {
    parse_sections(&render_solver_log(records))
}

/// Cuts `text` down to what fits in `width` millimetres at `size` points,
/// marking the cut with an ellipsis.
fn fit(text: &str, width: f32, size: f32) -> String {
    let max_chars = (width / (size * MM_PER_PT * GLYPH_WIDTH)).floor().max(0.0) as usize;

    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let kept = max_chars.saturating_sub(ELLIPSIS.len());
    text.chars()
        .take(kept)
        .chain(ELLIPSIS.chars().take(max_chars - kept))
        .collect()
}

/// Writes top to bottom, opening a new page when the next item does not fit.
struct Cursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl Cursor {
    fn new(title: &str) -> Result<Cursor> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Cursor {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn reserve(&mut self, height: f32) {
        if self.y - height >= MARGIN {
            return;
        }

        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, height: f32) {
        self.reserve(height);
        self.y -= height;

        let font = if bold { &self.bold } else { &self.regular };
        let text = fit(text, PAGE_WIDTH - 2.0 * MARGIN, size);
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
    }

    fn space(&mut self, height: f32) {
        self.y -= height;
    }

    fn hline(&self, y: f32, width: f32) {
        self.line((MARGIN, y), (MARGIN + width, y));
    }

    fn line(&self, from: (f32, f32), to: (f32, f32)) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(from.0), Mm(from.1)), false),
                (Point::new(Mm(to.0), Mm(to.1)), false),
            ],
            is_closed: false,
        });
    }

    fn row(&mut self, cells: [&str; 2], bold: bool) {
        self.reserve(ROW_HEIGHT);

        let top = self.y;
        let bottom = top - ROW_HEIGHT;
        let width: f32 = COLUMN_WIDTHS.iter().sum();
        let font = if bold { &self.bold } else { &self.regular };

        let mut x = MARGIN;
        for (cell, w) in cells.iter().zip(COLUMN_WIDTHS) {
            let cell = fit(cell, w - 2.0 * CELL_PADDING, 11.0);
            self.layer.use_text(
                cell,
                11.0,
                Mm(x + CELL_PADDING),
                Mm(bottom + CELL_PADDING),
                font,
            );
            self.line((x, top), (x, bottom));
            x += w;
        }
        self.line((x, top), (x, bottom));
        self.hline(top, width);
        self.hline(bottom, width);

        self.y = bottom;
    }

    fn table(&mut self, rows: &[(String, String)]) {
        self.row(["Asset", "Weight"], true);
        for (asset, weight) in rows {
            self.row([asset.as_str(), weight.as_str()], false);
        }
    }

    fn save(self, path: &Path) -> Result<usize> {
        let file = File::create(path)
            .with_context(|| format!("could not create pdf '{}'", path.display()))?;
        self.doc.save(&mut BufWriter::new(file))?;

        Ok(self.pages)
    }
}

/// One heading per section followed by its asset/weight table. Returns the
/// number of pages written.
pub fn write_pdf(path: &Path, sections: &[Section]) -> Result<usize> {
    let mut cursor = Cursor::new("Portfolio Report")?;

    for section in sections {
        cursor.text(&section.header, 14.0, true, 8.0);
        cursor.space(3.0);

        for line in &section.lines {
            cursor.text(line, 10.0, false, LINE_HEIGHT);
        }
        cursor.space(3.0);

        if section.weights.is_empty() {
            cursor.text(NO_WEIGHTS, 10.0, false, LINE_HEIGHT);
        } else {
            cursor.table(&section.weights);
        }
        cursor.space(8.0);
    }

    cursor.save(path)
}
