//! Row placement on the grid.
//!
//! A section is a function from a [`Cursor`] to a new [`Cursor`]. Rows are
//! bold labels over values; a wrapped label or value can make its row taller,
//! and the row ends at the lowest bottom among all its cells. Content that
//! reaches the bottom margin continues at the top of a new page.

use crate::assets::{ImageAsset, ImageSource};
use crate::canvas::{Align, Canvas};
use crate::font::FontFace;
use crate::grid::GridSpec;
use crate::types::{Color, Pt};

pub const ELLIPSIS: &str = "...";

pub(crate) fn label_size() -> Pt {
    Pt::from_f32(7.0)
}

pub(crate) fn value_size() -> Pt {
    Pt::from_f32(8.0)
}

pub(crate) fn title_size() -> Pt {
    Pt::from_f32(8.5)
}

pub(crate) fn label_height() -> Pt {
    Pt::from_mm(3.0)
}

pub(crate) fn value_height() -> Pt {
    Pt::from_mm(3.5)
}

pub(crate) fn title_height() -> Pt {
    Pt::from_mm(4.0)
}

fn row_gap() -> Pt {
    Pt::from_mm(0.6)
}

fn separator_height() -> Pt {
    Pt::from_mm(1.6)
}

/// Vertical position on the page, measured from the top edge.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Cursor {
    pub y: Pt,
}

impl Cursor {
    pub fn at(y: Pt) -> Self {
        Self { y }
    }

    pub fn advance(self, dy: Pt) -> Self {
        Self {
            y: self.y + dy.max(Pt::ZERO),
        }
    }

    /// The lower of the two positions.
    pub fn lowest(self, other: Cursor) -> Self {
        Self {
            y: self.y.max(other.y),
        }
    }
}

/// Images for the header, resolved before layout starts.
#[derive(Debug, Clone, Default)]
pub struct HeaderAssets {
    pub logo: Option<ImageAsset>,
    pub crest: Option<ImageAsset>,
    /// Sources that could not be loaded.
    pub missing: u64,
}

impl HeaderAssets {
    /// Loads both images; a source that fails to load is logged and left out.
    pub fn resolve(logo: Option<&ImageSource>, crest: Option<&ImageSource>) -> Self {
        let mut missing = 0;
        let mut load = |source: Option<&ImageSource>| {
            let source = source?;
            match ImageAsset::load(source) {
                Ok(asset) => Some(asset),
                Err(err) => {
                    log::warn!("header image omitted: {err}");
                    missing += 1;
                    None
                }
            }
        };
        let logo = load(logo);
        let crest = load(crest);
        Self {
            logo,
            crest,
            missing,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutStats {
    pub truncated_fields: u64,
    pub assets_missing: u64,
}

pub struct LayoutContext<'a> {
    pub canvas: &'a mut Canvas,
    pub grid: &'a GridSpec,
    pub assets: &'a HeaderAssets,
    pub stats: LayoutStats,
}

impl<'a> LayoutContext<'a> {
    pub fn new(canvas: &'a mut Canvas, grid: &'a GridSpec, assets: &'a HeaderAssets) -> Self {
        Self {
            canvas,
            grid,
            assets,
            stats: LayoutStats {
                assets_missing: assets.missing,
                ..LayoutStats::default()
            },
        }
    }

    /// Shortens `text` to one line at `width`.
    pub fn fit_line(&mut self, text: &str, width: Pt) -> String {
        let (fitted, truncated) = truncate_to_lines(self.canvas, text, width, 1);
        if truncated {
            self.stats.truncated_fields += 1;
        }
        fitted
    }

    pub fn fit_lines(&mut self, text: &str, width: Pt, max_lines: usize) -> String {
        let (fitted, truncated) = truncate_to_lines(self.canvas, text, width, max_lines);
        if truncated {
            self.stats.truncated_fields += 1;
        }
        fitted
    }

    /// Zero-based index of the page being drawn.
    pub fn page_index(&self) -> usize {
        self.canvas.page_count() - 1
    }

    /// Strokes the frame border on the current page.
    pub fn frame_border(&mut self) {
        self.canvas.set_stroke_color(Color::BLACK);
        self.canvas.set_line_width(Pt::from_f32(0.8));
        self.canvas.stroke_rect(self.grid.frame());
    }

    /// Closes the current page with its border and returns the frame top of
    /// the next one.
    pub fn break_page(&mut self) -> Cursor {
        self.frame_border();
        self.canvas.new_page();
        log::debug!("page break, continuing on page {}", self.canvas.page_count());
        Cursor::at(self.grid.frame().y)
    }

    /// Breaks the page when `height` no longer fits between `cursor` and the
    /// bottom margin. A cursor at the frame top is kept as is.
    pub fn ensure_room(&mut self, cursor: Cursor, height: Pt) -> Cursor {
        let frame = self.grid.frame();
        if cursor.y + height > frame.bottom() && cursor.y > frame.y {
            self.break_page()
        } else {
            cursor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Content<'a> {
    /// One line, shortened with an ellipsis when wider than the cell.
    Line(&'a str),
    /// Wrapped to as many lines as needed.
    Wrapped(&'a str),
    /// Wrapped, but cut to a line budget.
    Clamped(&'a str, usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub column: usize,
    pub span: usize,
    pub label: &'a str,
    pub value: Content<'a>,
}

impl<'a> Field<'a> {
    pub fn line(column: usize, label: &'a str, value: &'a str) -> Self {
        Self {
            column,
            span: 1,
            label,
            value: Content::Line(value),
        }
    }

    pub fn wrapped(column: usize, label: &'a str, value: &'a str) -> Self {
        Self {
            column,
            span: 1,
            label,
            value: Content::Wrapped(value),
        }
    }

    pub fn clamped(column: usize, label: &'a str, value: &'a str, max_lines: usize) -> Self {
        Self {
            column,
            span: 1,
            label,
            value: Content::Clamped(value, max_lines),
        }
    }

    pub fn span(mut self, span: usize) -> Self {
        self.span = span;
        self
    }
}

/// Places one labelled row and returns the cursor below its tallest cell.
///
/// Labels wrap inside their cell. A row that does not fit below `cursor`
/// moves to the next page whole; a row taller than a page is split between
/// value lines.
pub fn row(ctx: &mut LayoutContext<'_>, cursor: Cursor, fields: &[Field<'_>]) -> Cursor {
    ctx.canvas.set_font(FontFace::Bold, label_size());
    let labels: Vec<Vec<String>> = fields
        .iter()
        .map(|field| {
            if field.label.is_empty() {
                return Vec::new();
            }
            let (_, width) = ctx.grid.cell(field.column, field.span);
            ctx.canvas.wrap_lines(field.label, width)
        })
        .collect();

    ctx.canvas.set_font(FontFace::Regular, value_size());
    let values: Vec<Vec<String>> = fields
        .iter()
        .map(|field| {
            let (_, width) = ctx.grid.cell(field.column, field.span);
            match field.value {
                Content::Line(text) => vec![ctx.fit_line(text, width)],
                Content::Wrapped(text) => ctx.canvas.wrap_lines(text, width),
                Content::Clamped(text, max_lines) => {
                    let text = ctx.fit_lines(text, width, max_lines);
                    ctx.canvas.wrap_lines(&text, width)
                }
            }
        })
        .collect();

    let label_lines = labels.iter().map(Vec::len).max().unwrap_or(0);
    let value_lines = values.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let label_block = label_height() * label_lines as i32;
    let whole = label_block + value_height() * value_lines as i32;
    let frame = ctx.grid.frame();
    let needed = if whole <= frame.height {
        whole
    } else {
        label_block + value_height()
    };
    let top = ctx.ensure_room(cursor, needed).y;

    ctx.canvas.set_font(FontFace::Bold, label_size());
    for (field, lines) in fields.iter().zip(&labels) {
        let (x, width) = ctx.grid.cell(field.column, field.span);
        let mut y = top;
        for line in lines {
            ctx.canvas
                .cell(x, y, width, label_height(), line, Align::Left);
            y += label_height();
        }
    }

    ctx.canvas.set_font(FontFace::Regular, value_size());
    let mut y = top + label_block;
    for index in 0..value_lines {
        if y + value_height() > frame.bottom() && y > frame.y {
            y = ctx.break_page().y;
        }
        for (field, lines) in fields.iter().zip(&values) {
            if let Some(line) = lines.get(index) {
                let (x, width) = ctx.grid.cell(field.column, field.span);
                ctx.canvas
                    .cell(x, y, width, value_height(), line, Align::Left);
            }
        }
        y += value_height();
    }

    // the gap is dropped when it would cross the bottom margin
    let end = Cursor::at(y).advance(row_gap());
    if end.y > frame.bottom() { Cursor::at(y) } else { end }
}

/// Bold section heading across the full width.
///
/// A title never ends a page: it moves along with the first row below it.
pub fn section_title(ctx: &mut LayoutContext<'_>, cursor: Cursor, title: &str) -> Cursor {
    let cursor = ctx.ensure_room(cursor, title_height() + label_height() + value_height());
    let (x, width) = ctx.grid.full();
    ctx.canvas.set_font(FontFace::Bold, title_size());
    ctx.canvas
        .cell(x, cursor.y, width, title_height(), title, Align::Left);
    cursor.advance(title_height())
}

/// Horizontal rule across the frame, with a little air on both sides.
/// At the bottom margin the page breaks instead and no rule is drawn.
pub fn separator(ctx: &mut LayoutContext<'_>, cursor: Cursor) -> Cursor {
    let frame = ctx.grid.frame();
    if cursor.y + separator_height() > frame.bottom() {
        return ctx.break_page();
    }
    let y = cursor.y + Pt::from_mm(0.8);
    ctx.canvas.set_stroke_color(Color::gray(0.45));
    ctx.canvas.set_line_width(Pt::from_f32(0.5));
    ctx.canvas.line(frame.x, y, frame.right(), y);
    cursor.advance(separator_height())
}

/// Cuts `text` to at most `max_lines` lines at `width`, ending in an
/// ellipsis when anything was dropped. Words are kept whole; line counting
/// uses the canvas' current font.
pub fn truncate_to_lines(
    canvas: &Canvas,
    text: &str,
    width: Pt,
    max_lines: usize,
) -> (String, bool) {
    let max_lines = max_lines.max(1);
    if canvas.wrap_lines(text, width).len() <= max_lines {
        return (text.to_string(), false);
    }
    let mut kept = String::new();
    for word in text.split_whitespace() {
        let candidate = if kept.is_empty() {
            word.to_string()
        } else {
            format!("{kept} {word}")
        };
        if canvas.line_count(&format!("{candidate}{ELLIPSIS}"), width) > max_lines {
            break;
        }
        kept = candidate;
    }
    (format!("{kept}{ELLIPSIS}"), true)
}
