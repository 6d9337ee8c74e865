use crate::types::{Margins, Pt, Rect, Size};

pub const COLUMNS: usize = 4;

/// Declarative page grid: page size, margins and the widths of the four
/// content columns. Cells are placed by absolute coordinates derived from
/// it, so decorations such as the QR symbol can overlap column boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub page: Size,
    pub margins: Margins,
    pub columns: [Pt; COLUMNS],
    /// Inset applied on both sides of every cell.
    pub padding: Pt,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::danfse()
    }
}

impl GridSpec {
    /// A4 portrait, 10 mm margins, four equal columns.
    pub fn danfse() -> Self {
        let page = Size::a4();
        let margins = Margins::all_mm(10.0);
        let content = margins.frame(page).width;
        let column = content.mul_ratio(1, COLUMNS as i32);
        let mut columns = [column; COLUMNS];
        // rounding remainder goes to the last column
        columns[COLUMNS - 1] = content - column * (COLUMNS as i32 - 1);
        Self {
            page,
            margins,
            columns,
            padding: Pt::from_mm(1.0),
        }
    }

    /// Area inside the margins; also the document border.
    pub fn frame(&self) -> Rect {
        self.margins.frame(self.page)
    }

    pub fn left(&self) -> Pt {
        self.margins.left
    }

    pub fn content_width(&self) -> Pt {
        self.columns.iter().copied().sum()
    }

    pub fn column_x(&self, column: usize) -> Pt {
        let column = column.min(COLUMNS);
        self.left() + self.columns[..column].iter().copied().sum::<Pt>()
    }

    /// Width of `span` columns starting at `column`, clamped to the grid.
    pub fn span_width(&self, column: usize, span: usize) -> Pt {
        let start = column.min(COLUMNS);
        let end = (column + span.max(1)).min(COLUMNS);
        self.columns[start..end].iter().copied().sum()
    }

    /// Drawable `(x, width)` of a cell after padding.
    pub fn cell(&self, column: usize, span: usize) -> (Pt, Pt) {
        let x = self.column_x(column) + self.padding;
        let width = (self.span_width(column, span) - self.padding * 2).max(Pt::ZERO);
        (x, width)
    }

    /// Full-width drawable `(x, width)`.
    pub fn full(&self) -> (Pt, Pt) {
        self.cell(0, COLUMNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_fill_the_frame() {
        let grid = GridSpec::danfse();
        let frame = grid.frame();
        assert_eq!(grid.content_width(), frame.width);
        assert_eq!(grid.column_x(0), frame.x);
        assert_eq!(grid.column_x(COLUMNS), frame.right());
        let step = grid.column_x(1) - grid.column_x(0);
        assert!((step.to_mm() - 47.5).abs() < 0.01);
    }

    #[test]
    fn spans_are_clamped_and_padded() {
        let grid = GridSpec::danfse();
        assert_eq!(grid.span_width(2, 5), grid.span_width(2, 2));
        let (x, width) = grid.cell(1, 2);
        assert_eq!(x, grid.column_x(1) + grid.padding);
        assert_eq!(width, grid.span_width(1, 2) - grid.padding * 2);
        assert_eq!(grid.full().1, grid.content_width() - grid.padding * 2);
    }
}
