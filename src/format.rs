//! Value formatters applied once, at extraction time.
//!
//! All of them are total: an input whose shape is not recognised comes back
//! digit-stripped (document numbers) or untouched (dates, amounts).

use crate::codes::FALLBACK;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:T(\d{2}):(\d{2}):(\d{2}))?").expect("static regex")
});

static DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)(\d*)(?:\.(\d*))?$").expect("static regex")
});

pub const CURRENCY_PREFIX: &str = "R$ ";
pub const PERCENT_SUFFIX: &str = " %";

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// CNPJ (14 digits) or CPF (11 digits). Anything else is returned digit-stripped.
pub fn format_tax_id(raw: &str) -> String {
    let d = digits_only(raw);
    match d.len() {
        14 => format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        ),
        11 => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        _ => d,
    }
}

/// CEP: `#####-###` at exactly eight digits.
pub fn format_postal_code(raw: &str) -> String {
    let d = digits_only(raw);
    if d.len() == 8 {
        format!("{}-{}", &d[0..5], &d[5..8])
    } else {
        d
    }
}

pub fn format_phone(raw: &str) -> String {
    let d = digits_only(raw);
    match d.len() {
        0 => FALLBACK.to_string(),
        8 => format!("{}-{}", &d[0..4], &d[4..8]),
        9 => format!("{}-{}", &d[0..5], &d[5..9]),
        10 => format!("({}) {}-{}", &d[0..2], &d[2..6], &d[6..10]),
        11 => format!("({}) {}-{}", &d[0..2], &d[2..7], &d[7..11]),
        12 => format!("+{} ({}) {}-{}", &d[0..2], &d[2..4], &d[4..8], &d[8..12]),
        13 => format!("+{} ({}) {}-{}", &d[0..2], &d[2..4], &d[4..9], &d[9..13]),
        _ => d,
    }
}

/// National service classification code (`cTribNac`), `##.##.##`.
pub fn format_service_code(raw: &str) -> String {
    let d = digits_only(raw);
    if d.len() == 6 {
        format!("{}.{}.{}", &d[0..2], &d[2..4], &d[4..6])
    } else {
        d
    }
}

/// `YYYY-MM-DD...` becomes `DD/MM/YYYY`; the time part, if any, is dropped.
pub fn format_date(raw: &str) -> String {
    match DATE_PREFIX.captures(raw) {
        Some(caps) => format!("{}/{}/{}", &caps[3], &caps[2], &caps[1]),
        None => raw.to_string(),
    }
}

/// `YYYY-MM-DD[THH:MM:SS]` becomes `DD/MM/YYYY[ HH:MM:SS]`. Offsets and
/// fractions after the seconds are discarded.
pub fn format_date_time(raw: &str) -> String {
    let Some(caps) = DATE_PREFIX.captures(raw) else {
        return raw.to_string();
    };
    let date = format!("{}/{}/{}", &caps[3], &caps[2], &caps[1]);
    match (caps.get(4), caps.get(5), caps.get(6)) {
        (Some(h), Some(m), Some(s)) => {
            format!("{} {}:{}:{}", date, h.as_str(), m.as_str(), s.as_str())
        }
        _ => date,
    }
}

/// A monetary or percentage input: either raw source text or an exact
/// amount in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount<'a> {
    Text(&'a str),
    Cents(i64),
}

impl<'a> From<&'a str> for Amount<'a> {
    fn from(value: &'a str) -> Self {
        Amount::Text(value)
    }
}

impl<'a> From<&'a String> for Amount<'a> {
    fn from(value: &'a String) -> Self {
        Amount::Text(value.as_str())
    }
}

impl From<i64> for Amount<'_> {
    fn from(value: i64) -> Self {
        Amount::Cents(value)
    }
}

impl Amount<'_> {
    fn cents(&self) -> Option<i64> {
        match self {
            Amount::Cents(value) => Some(*value),
            Amount::Text(raw) => parse_cents(raw),
        }
    }

    fn passthrough(&self) -> String {
        match self {
            Amount::Text(raw) => raw.to_string(),
            Amount::Cents(value) => value.to_string(),
        }
    }
}

/// `R$ 1.234,56`. Non-numeric text passes through unchanged so an already
/// formatted value or a fallback marker survives a second pass.
pub fn format_money<'a>(value: impl Into<Amount<'a>>) -> String {
    let value = value.into();
    match value.cents() {
        Some(cents) => format!("{}{}", CURRENCY_PREFIX, format_hundredths(cents)),
        None => value.passthrough(),
    }
}

/// `2,50 %`. Non-numeric text passes through unchanged.
pub fn format_percent<'a>(value: impl Into<Amount<'a>>) -> String {
    let value = value.into();
    match value.cents() {
        Some(hundredths) => format!("{}{}", format_hundredths(hundredths), PERCENT_SUFFIX),
        None => value.passthrough(),
    }
}

/// Parses a dot-decimal source amount into hundredths. The third decimal
/// rounds half away from zero; later digits are ignored.
pub fn parse_cents(raw: &str) -> Option<i64> {
    let caps = DECIMAL.captures(raw.trim())?;
    let int_digits = caps.get(2).map_or("", |m| m.as_str());
    let frac_digits = caps.get(3).map_or("", |m| m.as_str());
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let mut cents: i64 = 0;
    for digit in int_digits.bytes() {
        cents = cents.checked_mul(10)?.checked_add(i64::from(digit - b'0'))?;
    }
    let mut frac = frac_digits.bytes().map(|d| i64::from(d - b'0'));
    cents = cents.checked_mul(100)?;
    cents = cents.checked_add(frac.next().unwrap_or(0) * 10 + frac.next().unwrap_or(0))?;
    if frac.next().is_some_and(|third| third >= 5) {
        cents = cents.checked_add(1)?;
    }

    if &caps[1] == "-" { Some(-cents) } else { Some(cents) }
}

fn format_hundredths(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let int_part = (abs / 100).to_string();
    let frac_part = abs % 100;

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("{}{},{:02}", sign, grouped, frac_part)
}
