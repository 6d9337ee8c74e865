use crate::assets::ImageAsset;
use crate::error::DanfseError;
use crate::font::FontFace;
use crate::types::{Color, Pt, Rect, Size};
use qrcode::{EcLevel, QrCode};
use std::collections::BTreeMap;

/// Drawing operations in top-left page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFont {
        face: FontFace,
        size: Pt,
    },
    // `baseline` is measured from the top edge of the page.
    DrawString {
        x: Pt,
        baseline: Pt,
        text: String,
    },
    Line {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
    },
    StrokeRect(Rect),
    FillRect(Rect),
    DrawImage {
        rect: Rect,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    /// Image payloads referenced by `DrawImage`, keyed by resource id.
    pub images: BTreeMap<String, ImageAsset>,
}

impl Document {
    /// Concatenates pages in order. Shared images collapse onto one entry.
    pub fn merge(documents: Vec<Document>) -> Option<Document> {
        let mut iter = documents.into_iter();
        let mut merged = iter.next()?;
        for doc in iter {
            merged.pages.extend(doc.pages);
            for (id, asset) in doc.images {
                merged.images.entry(id).or_insert(asset);
            }
        }
        Some(merged)
    }

    pub fn fonts_used(&self) -> Vec<FontFace> {
        let mut faces: Vec<FontFace> = self
            .pages
            .iter()
            .flat_map(|p| p.commands.iter())
            .filter_map(|cmd| match cmd {
                Command::SetFont { face, .. } => Some(*face),
                _ => None,
            })
            .collect();
        faces.sort();
        faces.dedup();
        faces
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    face: FontFace,
    font_size: Pt,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            face: FontFace::Regular,
            font_size: Pt::from_f32(12.0),
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    current_state: GraphicsState,
    font_emitted: bool,
    images: BTreeMap<String, ImageAsset>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            current_state: GraphicsState::initial(),
            font_emitted: false,
            images: BTreeMap::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Number of pages, the one being drawn included.
    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    /// Closes the current page and starts an empty one. Every content stream
    /// starts from the default graphics state, so the active font, colours
    /// and line width are re-emitted on the new page.
    pub fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        let previous = std::mem::replace(&mut self.current_state, GraphicsState::initial());
        self.current_state.face = previous.face;
        self.current_state.font_size = previous.font_size;
        self.font_emitted = false;
        self.set_fill_color(previous.fill_color);
        self.set_stroke_color(previous.stroke_color);
        self.set_line_width(previous.line_width);
    }

    pub fn font(&self) -> (FontFace, Pt) {
        (self.current_state.face, self.current_state.font_size)
    }

    pub fn set_font(&mut self, face: FontFace, size: Pt) {
        if self.font_emitted
            && self.current_state.face == face
            && self.current_state.font_size == size
        {
            return;
        }
        self.current_state.face = face;
        self.current_state.font_size = size;
        self.font_emitted = true;
        self.current.commands.push(Command::SetFont { face, size });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn text_width(&self, text: &str) -> Pt {
        let (face, size) = self.font();
        face.measure_text_width(size, text)
    }

    /// Natural line height of the current font.
    pub fn line_height(&self) -> Pt {
        let (face, size) = self.font();
        face.line_height(size)
    }

    fn ensure_font(&mut self) {
        if !self.font_emitted {
            let (face, size) = self.font();
            self.set_font(face, size);
        }
    }

    /// Draws `text` on one line inside the box `(x, y, width, height)`,
    /// vertically centred. Text wider than the box is not clipped.
    pub fn cell(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, text: &str, align: Align) {
        if text.is_empty() {
            return;
        }
        self.ensure_font();
        let (face, size) = self.font();
        let text_width = face.measure_text_width(size, text);
        let x = match align {
            Align::Left => x,
            Align::Center => x + (width - text_width).max(Pt::ZERO) / 2,
            Align::Right => x + (width - text_width).max(Pt::ZERO),
        };
        let baseline = y + height / 2 + face.ascent(size) - face.line_height(size).mul_ratio(2, 5);
        self.current.commands.push(Command::DrawString {
            x,
            baseline,
            text: text.to_string(),
        });
    }

    /// Wraps `text` to `width` and draws one cell per line, `line_height`
    /// apart. Returns the y just below the last line. Empty text still
    /// occupies one line.
    pub fn multi_cell(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        line_height: Pt,
        text: &str,
        align: Align,
    ) -> Pt {
        let lines = self.wrap_lines(text, width);
        let mut cursor = y;
        for line in &lines {
            self.cell(x, cursor, width, line_height, line, align);
            cursor += line_height;
        }
        if lines.is_empty() {
            cursor += line_height;
        }
        cursor
    }

    /// Greedy word wrap with the current font. Explicit newlines start a new
    /// line; a word wider than `width` is split between characters.
    pub fn wrap_lines(&self, text: &str, width: Pt) -> Vec<String> {
        let (face, size) = self.font();
        let measure = |s: &str| face.measure_text_width(size, s);
        let mut lines = Vec::new();

        for paragraph in text.split('\n') {
            let mut line = String::new();
            for word in paragraph.split_whitespace() {
                if !line.is_empty() {
                    let candidate = format!("{line} {word}");
                    if measure(&candidate) <= width {
                        line = candidate;
                        continue;
                    }
                    lines.push(std::mem::take(&mut line));
                }
                if measure(word) <= width {
                    line.push_str(word);
                    continue;
                }
                let mut pieces = split_long_word_by_width(word, width, &measure);
                line = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
            if !line.is_empty() || (paragraph.trim().is_empty() && !text.trim().is_empty()) {
                lines.push(line);
            }
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    pub fn line_count(&self, text: &str, width: Pt) -> usize {
        self.wrap_lines(text, width).len().max(1)
    }

    pub fn line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.current
            .commands
            .push(Command::Line { x1, y1, x2, y2 });
    }

    pub fn stroke_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::StrokeRect(rect));
    }

    pub fn fill_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::FillRect(rect));
    }

    /// Places `asset` stretched to the box. The payload is stored once per
    /// resource id.
    pub fn image(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, asset: &ImageAsset) {
        let resource_id = asset.resource_id.clone();
        self.images
            .entry(resource_id.clone())
            .or_insert_with(|| asset.clone());
        self.current.commands.push(Command::DrawImage {
            rect: Rect {
                x,
                y,
                width,
                height,
            },
            resource_id,
        });
    }

    /// Draws a QR symbol encoding `payload` into the square at `(x, y)` with
    /// side `size`, including a one-module quiet zone.
    pub fn qr_code(&mut self, x: Pt, y: Pt, size: Pt, payload: &str) -> Result<(), DanfseError> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
            .map_err(|err| DanfseError::AssetMissing(format!("QR code: {err}")))?;
        let modules = code.width();
        let colors = code.to_colors();
        let span = modules as i32 + 2;
        let module = size.mul_ratio(1, span);
        let origin_x = x + module;
        let origin_y = y + module;

        let previous = self.current_state.fill_color;
        self.set_fill_color(Color::BLACK);
        for row in 0..modules {
            let mut col = 0;
            while col < modules {
                if colors[row * modules + col] != qrcode::Color::Dark {
                    col += 1;
                    continue;
                }
                let start = col;
                while col < modules && colors[row * modules + col] == qrcode::Color::Dark {
                    col += 1;
                }
                self.fill_rect(Rect {
                    x: origin_x + size.mul_ratio(start as i32, span),
                    y: origin_y + size.mul_ratio(row as i32, span),
                    width: size.mul_ratio((col - start) as i32, span),
                    height: module,
                });
            }
        }
        self.set_fill_color(previous);
        Ok(())
    }

    pub fn finish(mut self) -> Document {
        self.pages.push(self.current);
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}

fn split_long_word_by_width(word: &str, width: Pt, measure: &impl Fn(&str) -> Pt) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if measure(&current) > width && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Canvas {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font(FontFace::Regular, Pt::from_f32(8.0));
        canvas
    }

    #[test]
    fn wrap_respects_width() {
        let canvas = canvas();
        let width = Pt::from_f32(60.0);
        let text = "Hospedagem de aplicação web e banco de dados referente a março";
        let lines = canvas.wrap_lines(text, width);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(canvas.text_width(line) <= width, "{line:?} overflows");
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn long_words_are_split() {
        let canvas = canvas();
        let key = "42042042212345678000195000000000000725010123456789";
        let lines = canvas.wrap_lines(key, Pt::from_f32(50.0));
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), key);
    }

    #[test]
    fn explicit_newlines_break_lines() {
        let canvas = canvas();
        let lines = canvas.wrap_lines("Contrato 17\nVencimento 25/03", Pt::from_f32(500.0));
        assert_eq!(lines, vec!["Contrato 17", "Vencimento 25/03"]);
        assert_eq!(canvas.line_count("", Pt::from_f32(100.0)), 1);
    }

    #[test]
    fn multi_cell_returns_y_below_last_line() {
        let mut canvas = canvas();
        let lh = Pt::from_f32(10.0);
        let bottom = canvas.multi_cell(
            Pt::ZERO,
            Pt::from_f32(100.0),
            Pt::from_f32(1000.0),
            lh,
            "one\ntwo\nthree",
            Align::Left,
        );
        assert_eq!(bottom, Pt::from_f32(130.0));
        let empty = canvas.multi_cell(Pt::ZERO, Pt::ZERO, Pt::from_f32(10.0), lh, "", Align::Left);
        assert_eq!(empty, lh);
    }

    #[test]
    fn right_aligned_cell_ends_at_box_edge() {
        let mut canvas = canvas();
        let width = Pt::from_f32(100.0);
        canvas.cell(Pt::ZERO, Pt::ZERO, width, Pt::from_f32(10.0), "R$ 1,00", Align::Right);
        let expected = width - canvas.text_width("R$ 1,00");
        let doc = canvas.finish();
        let x = doc.pages[0]
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawString { x, .. } => Some(*x),
                _ => None,
            })
            .unwrap();
        assert_eq!(x, expected);
    }

    #[test]
    fn qr_code_draws_dark_modules() {
        let mut canvas = canvas();
        canvas
            .qr_code(
                Pt::ZERO,
                Pt::ZERO,
                Pt::from_mm(25.0),
                "https://www.nfse.gov.br/ConsultaPublica?tpc=1&chave=1",
            )
            .unwrap();
        let doc = canvas.finish();
        let runs = doc.pages[0]
            .commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::FillRect(_)))
            .count();
        assert!(runs > 20);
    }

    #[test]
    fn images_are_registered_once() {
        let bytes = crate::assets::tests::png_bytes(2, 2, 255);
        let asset = ImageAsset::decode(&bytes).unwrap();
        let mut canvas = canvas();
        let side = Pt::from_f32(20.0);
        canvas.image(Pt::ZERO, Pt::ZERO, side, side, &asset);
        canvas.image(side, Pt::ZERO, side, side, &asset);
        let doc = canvas.finish();
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.pages.len(), 1);
    }

    #[test]
    fn new_page_restores_the_drawing_state() {
        let mut canvas = canvas();
        canvas.set_stroke_color(Color::gray(0.45));
        canvas.set_line_width(Pt::from_f32(0.5));
        canvas.cell(Pt::ZERO, Pt::ZERO, Pt::from_f32(50.0), Pt::from_f32(10.0), "A", Align::Left);
        canvas.new_page();
        assert_eq!(canvas.page_count(), 2);
        canvas.cell(Pt::ZERO, Pt::ZERO, Pt::from_f32(50.0), Pt::from_f32(10.0), "B", Align::Left);

        let doc = canvas.finish();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(
            doc.pages[1].commands,
            vec![
                Command::SetStrokeColor(Color::gray(0.45)),
                Command::SetLineWidth(Pt::from_f32(0.5)),
                Command::SetFont {
                    face: FontFace::Regular,
                    size: Pt::from_f32(8.0),
                },
                Command::DrawString {
                    x: Pt::ZERO,
                    baseline: match doc.pages[0].commands.last() {
                        Some(Command::DrawString { baseline, .. }) => *baseline,
                        other => panic!("unexpected {other:?}"),
                    },
                    text: "B".to_string(),
                },
            ]
        );
    }

    #[test]
    fn merge_keeps_page_order() {
        let mut first = canvas();
        first.cell(Pt::ZERO, Pt::ZERO, Pt::from_f32(50.0), Pt::from_f32(10.0), "A", Align::Left);
        let mut second = canvas();
        second.cell(Pt::ZERO, Pt::ZERO, Pt::from_f32(50.0), Pt::from_f32(10.0), "B", Align::Left);
        let merged = Document::merge(vec![first.finish(), second.finish()]).unwrap();
        assert_eq!(merged.pages.len(), 2);
        assert!(merged.pages[1].commands.iter().any(
            |cmd| matches!(cmd, Command::DrawString { text, .. } if text == "B")
        ));
        assert!(Document::merge(Vec::new()).is_none());
    }
}
