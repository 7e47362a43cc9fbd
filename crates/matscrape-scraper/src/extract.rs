//! Field extraction from a parsed HTML document.
//!
//! Everything here is pure: no network, no persistence. The orchestrator in
//! [`crate::orchestrator`] fetches the page and hands the body over.

use matscrape_core::{FieldName, FieldSelector, PriceFormat, ScrapingRule, SelectorType};
use reqwest::Url;
use scraper::{Html, Selector};

use crate::error::ScrapeError;
use crate::normalize::parse_price;
use crate::types::ScrapedData;

/// A single extracted, type-converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Number(f64),
    Text(String),
    /// An attribute value resolved against the page URL.
    Url(String),
}

impl ExtractedValue {
    fn into_text(self) -> String {
        match self {
            ExtractedValue::Number(n) => n.to_string(),
            ExtractedValue::Text(s) | ExtractedValue::Url(s) => s,
        }
    }
}

/// Extracts one field from `page`.
///
/// The first element matching the selector is used. `price` is converted to
/// a number with `price_format`; `image` is resolved against `base_url`
/// when one is given; every other field is returned as text.
///
/// # Errors
///
/// - [`ScrapeError::SelectorNotFound`] when nothing matches, including when
///   the selector itself does not parse.
/// - [`ScrapeError::AttributeMissing`] when the matched element lacks the
///   configured attribute.
/// - [`ScrapeError::PriceParseError`] / [`ScrapeError::PriceOutOfRange`]
///   for the `price` field.
pub fn extract_field(
    page: &Html,
    field: FieldName,
    selector: &FieldSelector,
    price_format: PriceFormat,
    base_url: Option<&Url>,
) -> Result<ExtractedValue, ScrapeError> {
    let raw = read_raw(page, field, selector)?;

    match field {
        FieldName::Price => parse_price(&raw, price_format).map(ExtractedValue::Number),
        FieldName::Image => Ok(resolve_against(&raw, base_url)),
        FieldName::Title | FieldName::Availability => Ok(ExtractedValue::Text(raw)),
    }
}

/// Parses `html` and applies every selector of `rule`.
///
/// A failing `price` fails the whole extraction; failing optional fields
/// are left out of the returned data.
///
/// # Errors
///
/// - [`ScrapeError::ParseFailed`] for an empty document.
/// - [`ScrapeError::InvalidRule`] when the rule has no price selector.
/// - Any error from extracting `price`.
pub fn extract_page(
    rule: &ScrapingRule,
    html: &str,
    base_url: Option<&Url>,
) -> Result<ScrapedData, ScrapeError> {
    if html.trim().is_empty() {
        return Err(ScrapeError::ParseFailed {
            reason: "response body is empty".to_string(),
        });
    }

    let price_selector = rule.selectors.price.as_ref().ok_or_else(|| {
        ScrapeError::invalid_rule(format!("rule '{}' has no price selector", rule.name))
    })?;

    let page = Html::parse_document(html);

    let price = parse_price(
        &read_raw(&page, FieldName::Price, price_selector)?,
        rule.price_format,
    )?;

    let mut data = ScrapedData {
        price,
        title: None,
        availability: None,
        image: None,
    };

    for (field, selector) in rule.selectors.iter().filter(|(f, _)| !f.is_required()) {
        match extract_field(&page, field, selector, rule.price_format, base_url) {
            Ok(value) => {
                let slot = match field {
                    FieldName::Title => &mut data.title,
                    FieldName::Availability => &mut data.availability,
                    FieldName::Image => &mut data.image,
                    FieldName::Price => continue,
                };
                *slot = Some(value.into_text());
            }
            Err(err) => {
                tracing::debug!(
                    rule = %rule.name,
                    field = %field,
                    error = %err,
                    "optional field not extracted"
                );
            }
        }
    }

    Ok(data)
}

/// Reads the raw text or attribute value the selector points at.
fn read_raw(page: &Html, field: FieldName, selector: &FieldSelector) -> Result<String, ScrapeError> {
    let not_found = || ScrapeError::SelectorNotFound {
        field,
        selector: selector.selector.clone(),
    };

    // Selector syntax errors are reported as "not found".
    let compiled = Selector::parse(selector.selector.trim()).map_err(|_| not_found())?;
    let element = page.select(&compiled).next().ok_or_else(not_found)?;

    match selector.kind {
        SelectorType::Text => Ok(collapse_whitespace(element.text())),
        SelectorType::Attr => {
            let attribute = selector.attribute_name().ok_or_else(|| {
                ScrapeError::invalid_rule(format!(
                    "field '{field}' reads an attribute but names none"
                ))
            })?;
            element
                .value()
                .attr(attribute)
                .map(|v| v.trim().to_owned())
                .ok_or_else(|| ScrapeError::AttributeMissing {
                    field,
                    attribute: attribute.to_owned(),
                })
        }
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_against(raw: &str, base_url: Option<&Url>) -> ExtractedValue {
    if raw.is_empty() {
        return ExtractedValue::Text(String::new());
    }
    match base_url.and_then(|base| base.join(raw).ok()) {
        Some(url) => ExtractedValue::Url(url.to_string()),
        None => ExtractedValue::Text(raw.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use matscrape_core::RuleSelectors;

    use super::*;

    const PRODUCT_PAGE: &str = r#"
        <html>
          <head><title>Cement</title></head>
          <body>
            <h1 class="product-title">
              Portland   Cement
              50 kg
            </h1>
            <div class="product-price"><span class="amount">1.234,56 ₺</span></div>
            <span class="stock-status"> In stock </span>
            <div class="gallery"><img src="/img/cement.jpg" alt="bag"></div>
            <meta itemprop="price" content="1234.56">
          </body>
        </html>
    "#;

    fn page() -> Html {
        Html::parse_document(PRODUCT_PAGE)
    }

    fn base() -> Url {
        Url::parse("https://shop.example/urun/cement").unwrap()
    }

    fn full_rule() -> ScrapingRule {
        ScrapingRule {
            name: "shop".to_string(),
            url_pattern: String::new(),
            selectors: RuleSelectors {
                price: Some(FieldSelector::text(".product-price .amount")),
                title: Some(FieldSelector::text("h1.product-title")),
                availability: Some(FieldSelector::text(".stock-status")),
                image: Some(FieldSelector::attr(".gallery img", "src")),
            },
            price_format: PriceFormat::Decimal,
        }
    }

    #[test]
    fn text_is_trimmed_and_collapsed() {
        let value = extract_field(
            &page(),
            FieldName::Title,
            &FieldSelector::text("h1.product-title"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap();
        assert_eq!(value, ExtractedValue::Text("Portland Cement 50 kg".to_string()));
    }

    #[test]
    fn price_text_is_normalized() {
        let value = extract_field(
            &page(),
            FieldName::Price,
            &FieldSelector::text(".amount"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap();
        assert_eq!(value, ExtractedValue::Number(1234.56));
    }

    #[test]
    fn price_can_come_from_an_attribute() {
        let value = extract_field(
            &page(),
            FieldName::Price,
            &FieldSelector::attr("meta[itemprop=price]", "content"),
            PriceFormat::CurrencyString,
            None,
        )
        .unwrap();
        assert_eq!(value, ExtractedValue::Number(1234.56));
    }

    #[test]
    fn image_is_resolved_against_page_url() {
        let base = base();
        let value = extract_field(
            &page(),
            FieldName::Image,
            &FieldSelector::attr(".gallery img", "src"),
            PriceFormat::Decimal,
            Some(&base),
        )
        .unwrap();
        assert_eq!(
            value,
            ExtractedValue::Url("https://shop.example/img/cement.jpg".to_string())
        );
    }

    #[test]
    fn image_without_base_stays_text() {
        let value = extract_field(
            &page(),
            FieldName::Image,
            &FieldSelector::attr(".gallery img", "src"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap();
        assert_eq!(value, ExtractedValue::Text("/img/cement.jpg".to_string()));
    }

    #[test]
    fn zero_matches_is_selector_not_found() {
        let err = extract_field(
            &page(),
            FieldName::Price,
            &FieldSelector::text(".does-not-exist"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScrapeError::SelectorNotFound {
                field: FieldName::Price,
                selector: ".does-not-exist".to_string()
            }
        );
    }

    #[test]
    fn invalid_selector_syntax_is_selector_not_found() {
        let err = extract_field(
            &page(),
            FieldName::Title,
            &FieldSelector::text("h1[[["),
            PriceFormat::Decimal,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::SelectorNotFound {
                field: FieldName::Title,
                ..
            }
        ));
    }

    #[test]
    fn missing_attribute_is_reported() {
        let err = extract_field(
            &page(),
            FieldName::Image,
            &FieldSelector::attr(".gallery img", "data-zoom"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScrapeError::AttributeMissing {
                field: FieldName::Image,
                attribute: "data-zoom".to_string()
            }
        );
    }

    #[test]
    fn unparsable_price_text_is_parse_error() {
        let err = extract_field(
            &page(),
            FieldName::Price,
            &FieldSelector::text(".stock-status"),
            PriceFormat::Decimal,
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScrapeError::PriceParseError {
                raw: "In stock".to_string()
            }
        );
    }

    #[test]
    fn extract_page_collects_all_fields() {
        let base = base();
        let data = extract_page(&full_rule(), PRODUCT_PAGE, Some(&base)).unwrap();
        assert!((data.price - 1234.56).abs() < 1e-9);
        assert_eq!(data.title.as_deref(), Some("Portland Cement 50 kg"));
        assert_eq!(data.availability.as_deref(), Some("In stock"));
        assert_eq!(
            data.image.as_deref(),
            Some("https://shop.example/img/cement.jpg")
        );
    }

    #[test]
    fn extract_page_drops_failing_optional_field() {
        let mut rule = full_rule();
        rule.selectors.title = Some(FieldSelector::text("h2.missing"));
        let data = extract_page(&rule, PRODUCT_PAGE, None).unwrap();
        assert!(data.title.is_none());
        assert_eq!(data.availability.as_deref(), Some("In stock"));
    }

    #[test]
    fn extract_page_fails_on_missing_price() {
        let mut rule = full_rule();
        rule.selectors.price = Some(FieldSelector::text(".no-price-here"));
        let err = extract_page(&rule, PRODUCT_PAGE, None).unwrap_err();
        assert_eq!(err.field(), Some(FieldName::Price));
        assert!(matches!(err, ScrapeError::SelectorNotFound { .. }));
    }

    #[test]
    fn extract_page_rejects_empty_body() {
        let err = extract_page(&full_rule(), "  \n ", None).unwrap_err();
        assert!(matches!(err, ScrapeError::ParseFailed { .. }));
    }

    #[test]
    fn extract_page_tolerates_malformed_markup() {
        let html = "<div><span class=amount>19,90 TL<p>unclosed";
        let mut rule = full_rule();
        rule.selectors.price = Some(FieldSelector::text("span.amount"));
        let data = extract_page(&rule, html, None).unwrap();
        assert!((data.price - 19.90).abs() < 1e-9);
    }
}
