//! Price text normalization.
//!
//! Turns the raw text of a price element (`"1.234,56 ₺"`, `"$19.99"`,
//! `"USD 1,299.00"`) into a number according to the rule's
//! [`PriceFormat`]. Currency symbols and codes are ignored; only the first
//! numeric run in the text is considered.

use std::sync::LazyLock;

use matscrape_core::PriceFormat;
use regex::Regex;

use crate::error::ScrapeError;

/// First numeric run, allowing grouping separators and an optional sign.
/// Separators covered: `.` `,` `'` and regular, no-break and narrow no-break spaces.
static NUMBER_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d[\d.,' \u{00A0}\u{202F}]*").expect("valid price number regex")
});

/// Parses `raw` price text into a finite, non-negative number.
///
/// Format handling:
/// - [`PriceFormat::Decimal`]: `,` is the decimal separator and `.` groups
///   thousands. A lone `.` followed by one or two digits (`"19.99"`) is
///   read as a decimal point, since no thousands group has fewer than three digits.
/// - [`PriceFormat::CurrencyString`]: `.` is the decimal separator and `,`
///   groups thousands; a lone `,` followed by one or two digits is read as
///   a decimal comma.
/// - [`PriceFormat::Integer`]: every separator groups thousands.
///
/// # Errors
///
/// - [`ScrapeError::PriceParseError`] when no number can be read.
/// - [`ScrapeError::PriceOutOfRange`] when the number is negative or not finite.
pub fn parse_price(raw: &str, format: PriceFormat) -> Result<f64, ScrapeError> {
    let parse_error = || ScrapeError::PriceParseError {
        raw: raw.trim().to_owned(),
    };

    let run = NUMBER_RUN.find(raw).ok_or_else(parse_error)?.as_str();
    let compact: String = run
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '\u{00A0}' | '\u{202F}'))
        .collect();
    let compact = compact.trim_end_matches(['.', ',']);

    let canonical = match format {
        PriceFormat::Decimal => canonicalize(compact, ',', '.'),
        PriceFormat::CurrencyString => canonicalize(compact, '.', ','),
        PriceFormat::Integer => compact.replace(['.', ','], ""),
    };

    let value = canonical.parse::<f64>().map_err(|_| parse_error())?;

    if !value.is_finite() || value < 0.0 {
        return Err(ScrapeError::PriceOutOfRange { value });
    }

    // Normalize negative zero so equal pages compare equal.
    Ok(if value == 0.0 { 0.0 } else { value })
}

/// Rewrites `text` into Rust float syntax given the expected decimal and
/// grouping separators.
fn canonicalize(text: &str, decimal: char, group: char) -> String {
    if !text.contains(decimal) && looks_like_decimal_point(text, group) {
        return text.replace(group, ".");
    }

    text.chars()
        .filter(|&c| c != group)
        .map(|c| if c == decimal { '.' } else { c })
        .collect()
}

/// A single occurrence of `sep` followed by one or two digits cannot be a
/// thousands separator.
fn looks_like_decimal_point(text: &str, sep: char) -> bool {
    let mut parts = text.split(sep);
    let (Some(_), Some(fraction), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    (1..=2).contains(&fraction.len()) && fraction.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
