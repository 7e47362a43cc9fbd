//! Scrape outcome types.

use serde::{Serialize, Serializer};

use crate::error::ScrapeError;

/// Fields extracted from one page. `price` is always present; optional
/// fields are `None` when the rule has no selector for them or when their
/// extraction failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedData {
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    /// Absolute image URL when the page URL allowed resolving it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Outcome of applying one rule to one URL. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeResult {
    Success(ScrapedData),
    Failure(ScrapeError),
}

impl ScrapeResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeResult::Success(_))
    }

    #[must_use]
    pub fn data(&self) -> Option<&ScrapedData> {
        match self {
            ScrapeResult::Success(data) => Some(data),
            ScrapeResult::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ScrapeError> {
        match self {
            ScrapeResult::Success(_) => None,
            ScrapeResult::Failure(err) => Some(err),
        }
    }
}

impl From<Result<ScrapedData, ScrapeError>> for ScrapeResult {
    fn from(result: Result<ScrapedData, ScrapeError>) -> Self {
        match result {
            Ok(data) => ScrapeResult::Success(data),
            Err(err) => ScrapeResult::Failure(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(flatten)]
    detail: &'a ScrapeError,
    message: String,
}

#[derive(Serialize)]
struct Wire<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a ScrapedData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
}

/// Serializes as `{"success": true, "data": {...}}` or
/// `{"success": false, "error": {"kind": ..., "message": ..., ...}}`.
impl Serialize for ScrapeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            ScrapeResult::Success(data) => Wire {
                success: true,
                data: Some(data),
                error: None,
            },
            ScrapeResult::Failure(err) => Wire {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    detail: err,
                    message: err.to_string(),
                }),
            },
        };
        wire.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use matscrape_core::FieldName;

    use super::*;

    #[test]
    fn success_serializes_data_without_absent_fields() {
        let result = ScrapeResult::Success(ScrapedData {
            price: 19.99,
            title: Some("Portland cement 50kg".to_string()),
            availability: None,
            image: None,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["price"], 19.99);
        assert_eq!(json["data"]["title"], "Portland cement 50kg");
        assert!(json["data"].get("availability").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_serializes_kind_and_message() {
        let result = ScrapeResult::Failure(ScrapeError::SelectorNotFound {
            field: FieldName::Price,
            selector: ".price".to_string(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "selector_not_found");
        assert_eq!(json["error"]["field"], "price");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("matched no element"));
        assert!(json.get("data").is_none());
    }

    #[test]
    fn from_result_maps_both_arms() {
        let ok: ScrapeResult = Ok(ScrapedData {
            price: 1.0,
            title: None,
            availability: None,
            image: None,
        })
        .into();
        assert!(ok.is_success());
        let err: ScrapeResult = Err(ScrapeError::ParseFailed {
            reason: "empty".to_string(),
        })
        .into();
        assert!(!err.is_success());
        assert!(err.data().is_none());
    }
}
