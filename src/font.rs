use crate::types::Pt;

/// The two base-14 faces the document uses. Neither is embedded; widths come
/// from the Adobe core AFM files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontFace {
    Regular,
    Bold,
}

const FIRST_CHAR: u32 = 32;
const MISSING_WIDTH: u16 = 556;
const ASCENT: i32 = 718;
const DESCENT: i32 = -207;
const LINE_GAP: i32 = 225;

// Advance widths for U+0020..=U+007E in 1/1000 em.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

impl FontFace {
    pub fn base_font(self) -> &'static str {
        match self {
            FontFace::Regular => "Helvetica",
            FontFace::Bold => "Helvetica-Bold",
        }
    }

    /// Resource name inside page `/Font` dictionaries.
    pub fn resource(self) -> &'static str {
        match self {
            FontFace::Regular => "F1",
            FontFace::Bold => "F2",
        }
    }

    fn table(self) -> &'static [u16; 95] {
        match self {
            FontFace::Regular => &HELVETICA_WIDTHS,
            FontFace::Bold => &HELVETICA_BOLD_WIDTHS,
        }
    }

    fn advance_for_char(self, ch: char) -> u16 {
        match ch {
            '\u{00A0}' => return self.advance_for_char(' '),
            '\u{2026}' | '\u{2014}' => return 1000,
            '\u{2013}' => return 556,
            '\u{00B0}' => return 400,
            'ª' => return 370,
            'º' => return 365,
            // dotless-i based glyphs are wider than the plain regular i
            'ì' | 'í' | 'î' | 'ï' => return 278,
            _ => {}
        }
        let ch = fold_accent(ch);
        let code = ch as u32;
        if !(FIRST_CHAR..FIRST_CHAR + 95).contains(&code) {
            return MISSING_WIDTH;
        }
        self.table()[(code - FIRST_CHAR) as usize]
    }

    pub fn measure_text_width(self, font_size: Pt, text: &str) -> Pt {
        let total_units: i32 = text
            .chars()
            .map(|ch| self.advance_for_char(ch) as i32)
            .fold(0i32, |acc, adv| acc.saturating_add(adv));
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }

    pub fn line_height(self, font_size: Pt) -> Pt {
        font_size.mul_ratio(ASCENT - DESCENT + LINE_GAP, 1000)
    }

    pub fn ascent(self, font_size: Pt) -> Pt {
        font_size.mul_ratio(ASCENT, 1000)
    }
}

/// Latin-1 accented letters share the advance of their base letter in the
/// core Helvetica metrics.
fn fold_accent(ch: char) -> char {
    match ch {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'Ç' => 'C',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'Ñ' => 'N',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'Ý' => 'Y',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_widths_match_afm() {
        let size = Pt::from_f32(10.0);
        // H=722 e=556 l=222 l=222 o=556
        assert_eq!(
            FontFace::Regular.measure_text_width(size, "Hello"),
            Pt::from_f32(22.78)
        );
        assert_eq!(FontFace::Regular.measure_text_width(size, ""), Pt::ZERO);
    }

    #[test]
    fn bold_is_wider_than_regular() {
        let size = Pt::from_f32(8.0);
        let text = "TRIBUTAÇÃO MUNICIPAL";
        assert!(
            FontFace::Bold.measure_text_width(size, text)
                > FontFace::Regular.measure_text_width(size, text)
        );
    }

    #[test]
    fn accents_fold_to_base_letter() {
        let size = Pt::from_f32(12.0);
        let regular = FontFace::Regular;
        assert_eq!(
            regular.measure_text_width(size, "ação"),
            regular.measure_text_width(size, "acao")
        );
        assert_eq!(
            regular.measure_text_width(size, "í"),
            Pt::from_f32(12.0).mul_ratio(278, 1000)
        );
        assert_eq!(
            regular.measure_text_width(size, "\u{4e2d}"),
            Pt::from_f32(12.0).mul_ratio(MISSING_WIDTH as i32, 1000)
        );
    }

    #[test]
    fn line_height_covers_ascent_and_descent() {
        let size = Pt::from_f32(8.0);
        assert_eq!(FontFace::Regular.line_height(size), Pt::from_f32(9.2));
        assert!(FontFace::Bold.ascent(size) < size);
    }
}
