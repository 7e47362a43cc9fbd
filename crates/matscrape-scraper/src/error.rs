use matscrape_core::FieldName;
use serde::Serialize;
use thiserror::Error;

/// Why a scrape failed. Returned as data inside
/// [`crate::ScrapeResult::Failure`]; never propagated past the orchestrator.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeError {
    #[error("invalid rule: {reason}")]
    InvalidRule { reason: String },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        url: String,
        /// HTTP status when the server answered; `None` for transport errors
        /// and timeouts.
        status: Option<u16>,
        reason: String,
    },

    #[error("could not parse page: {reason}")]
    ParseFailed { reason: String },

    #[error("selector \"{selector}\" for field '{field}' matched no element")]
    SelectorNotFound { field: FieldName, selector: String },

    #[error("attribute \"{attribute}\" for field '{field}' is missing on the matched element")]
    AttributeMissing { field: FieldName, attribute: String },

    #[error("could not parse a price from \"{raw}\"")]
    PriceParseError { raw: String },

    #[error("price {value} is out of range (must be finite and non-negative)")]
    PriceOutOfRange { value: f64 },
}

/// Flat discriminant of [`ScrapeError`], stored alongside failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeErrorKind {
    InvalidRule,
    FetchFailed,
    ParseFailed,
    SelectorNotFound,
    AttributeMissing,
    PriceParseError,
    PriceOutOfRange,
}

impl ScrapeErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeErrorKind::InvalidRule => "invalid_rule",
            ScrapeErrorKind::FetchFailed => "fetch_failed",
            ScrapeErrorKind::ParseFailed => "parse_failed",
            ScrapeErrorKind::SelectorNotFound => "selector_not_found",
            ScrapeErrorKind::AttributeMissing => "attribute_missing",
            ScrapeErrorKind::PriceParseError => "price_parse_error",
            ScrapeErrorKind::PriceOutOfRange => "price_out_of_range",
        }
    }
}

impl std::fmt::Display for ScrapeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScrapeError {
    #[must_use]
    pub fn kind(&self) -> ScrapeErrorKind {
        match self {
            ScrapeError::InvalidRule { .. } => ScrapeErrorKind::InvalidRule,
            ScrapeError::FetchFailed { .. } => ScrapeErrorKind::FetchFailed,
            ScrapeError::ParseFailed { .. } => ScrapeErrorKind::ParseFailed,
            ScrapeError::SelectorNotFound { .. } => ScrapeErrorKind::SelectorNotFound,
            ScrapeError::AttributeMissing { .. } => ScrapeErrorKind::AttributeMissing,
            ScrapeError::PriceParseError { .. } => ScrapeErrorKind::PriceParseError,
            ScrapeError::PriceOutOfRange { .. } => ScrapeErrorKind::PriceOutOfRange,
        }
    }

    /// The rule field the error belongs to, when it is field-specific.
    #[must_use]
    pub fn field(&self) -> Option<FieldName> {
        match self {
            ScrapeError::SelectorNotFound { field, .. }
            | ScrapeError::AttributeMissing { field, .. } => Some(*field),
            ScrapeError::PriceParseError { .. } | ScrapeError::PriceOutOfRange { .. } => {
                Some(FieldName::Price)
            }
            _ => None,
        }
    }

    pub(crate) fn invalid_rule(reason: impl Into<String>) -> Self {
        ScrapeError::InvalidRule {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let err = ScrapeError::SelectorNotFound {
            field: FieldName::Price,
            selector: ".price".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "selector_not_found");
        assert_eq!(json["field"], "price");
        assert_eq!(json["selector"], ".price");
    }

    #[test]
    fn kind_string_matches_serde_tag() {
        let err = ScrapeError::FetchFailed {
            url: "https://x.example".to_string(),
            status: Some(503),
            reason: "HTTP 503".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], err.kind().as_str());
        assert_eq!(json["status"], 503);
    }

    #[test]
    fn price_errors_belong_to_price_field() {
        let err = ScrapeError::PriceParseError {
            raw: "abc".to_string(),
        };
        assert_eq!(err.field(), Some(FieldName::Price));
        assert_eq!(ScrapeError::invalid_rule("x").field(), None);
    }

    #[test]
    fn message_names_selector_and_field() {
        let err = ScrapeError::SelectorNotFound {
            field: FieldName::Title,
            selector: "h1.name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "selector \"h1.name\" for field 'title' matched no element"
        );
    }
}
