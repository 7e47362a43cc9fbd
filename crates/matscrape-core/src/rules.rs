//! Scraping rule model: how to pull one priced item out of one page.
//!
//! A [`ScrapingRule`] names a family of pages that share a DOM layout and
//! carries one [`FieldSelector`] per field. Only `price` is required; the
//! other fields degrade silently when they cannot be extracted.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ConfigError;

/// The fields a rule can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    Price,
    Title,
    Availability,
    Image,
}

impl FieldName {
    pub const ALL: [FieldName; 4] = [
        FieldName::Price,
        FieldName::Title,
        FieldName::Availability,
        FieldName::Image,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Price => "price",
            FieldName::Title => "title",
            FieldName::Availability => "availability",
            FieldName::Image => "image",
        }
    }

    /// Returns `true` for fields whose extraction failure fails the scrape.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, FieldName::Price)
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a selector reads element text or a named attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    #[default]
    Text,
    Attr,
}

/// One extraction instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector; the first matching element is used.
    pub selector: String,
    #[serde(rename = "type", default)]
    pub kind: SelectorType,
    /// Attribute to read when `kind` is [`SelectorType::Attr`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldSelector {
    #[must_use]
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorType::Text,
            attribute: None,
        }
    }

    #[must_use]
    pub fn attr(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorType::Attr,
            attribute: Some(attribute.into()),
        }
    }

    /// The attribute to read, or `None` for text selectors.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        match self.kind {
            SelectorType::Text => None,
            SelectorType::Attr => self
                .attribute
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty()),
        }
    }
}

/// Numeric conventions used when turning price text into a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFormat {
    /// Comma decimal separator, dot thousands (`1.234,56`).
    #[default]
    Decimal,
    /// Whole numbers only; every non-digit is dropped.
    Integer,
    /// Dot decimal separator, comma thousands, symbol anywhere (`$1,234.56`).
    CurrencyString,
}

impl PriceFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PriceFormat::Decimal => "decimal",
            PriceFormat::Integer => "integer",
            PriceFormat::CurrencyString => "currency_string",
        }
    }

    /// Inverse of [`PriceFormat::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "decimal" => Some(PriceFormat::Decimal),
            "integer" => Some(PriceFormat::Integer),
            "currency_string" => Some(PriceFormat::CurrencyString),
            _ => None,
        }
    }
}

/// Per-field selectors of a rule. `price` is optional in the type so that a
/// rule missing it can be represented and rejected by [`ScrapingRule::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<FieldSelector>,
}

impl RuleSelectors {
    #[must_use]
    pub fn get(&self, field: FieldName) -> Option<&FieldSelector> {
        match field {
            FieldName::Price => self.price.as_ref(),
            FieldName::Title => self.title.as_ref(),
            FieldName::Availability => self.availability.as_ref(),
            FieldName::Image => self.image.as_ref(),
        }
    }

    /// Iterates the configured selectors in [`FieldName::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldSelector)> {
        FieldName::ALL
            .into_iter()
            .filter_map(move |field| self.get(field).map(|sel| (field, sel)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule name must be non-empty")]
    EmptyName,

    #[error("rule '{rule}' has no price selector")]
    MissingPriceSelector { rule: String },

    #[error("rule '{rule}' has an empty selector for field '{field}'")]
    EmptySelector { rule: String, field: FieldName },

    #[error("rule '{rule}' reads an attribute for field '{field}' but names none")]
    MissingAttribute { rule: String, field: FieldName },

    #[error("rule '{rule}' has an invalid url pattern '{pattern}': {reason}")]
    InvalidUrlPattern {
        rule: String,
        pattern: String,
        reason: String,
    },
}

/// A named specification of how to locate and type-convert fields on a
/// family of pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapingRule {
    pub name: String,
    /// Pages this rule applies to. `*` matches any run of characters; a
    /// pattern without `*` is a prefix that must end at a `/`, `?` or `#`
    /// boundary unless it already ends with one. Empty matches every URL.
    #[serde(default)]
    pub url_pattern: String,
    pub selectors: RuleSelectors,
    #[serde(default)]
    pub price_format: PriceFormat,
}

impl ScrapingRule {
    /// Checks the structural invariants of the rule.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleError`] found: empty name, missing price
    /// selector, blank selector, `attr` selector without an attribute, or a
    /// URL pattern that cannot be compiled.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }

        if self.selectors.price.is_none() {
            return Err(RuleError::MissingPriceSelector {
                rule: self.name.clone(),
            });
        }

        for (field, sel) in self.selectors.iter() {
            if sel.selector.trim().is_empty() {
                return Err(RuleError::EmptySelector {
                    rule: self.name.clone(),
                    field,
                });
            }
            if sel.kind == SelectorType::Attr && sel.attribute_name().is_none() {
                return Err(RuleError::MissingAttribute {
                    rule: self.name.clone(),
                    field,
                });
            }
        }

        self.url_regex()?;
        Ok(())
    }

    /// Returns `true` if `url` falls under this rule's `url_pattern`.
    ///
    /// An invalid pattern matches nothing.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        match self.url_regex() {
            Ok(None) => true,
            Ok(Some(re)) => re.is_match(url.trim()),
            Err(_) => false,
        }
    }

    fn url_regex(&self) -> Result<Option<Regex>, RuleError> {
        let pattern = self.url_pattern.trim();
        if pattern.is_empty() {
            return Ok(None);
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let anchored = if pattern.contains('*') {
            format!("^{body}$")
        } else if pattern.ends_with(['/', '?', '#', '&', '=']) {
            format!("^{body}")
        } else {
            // A prefix stops at a component boundary, so a host does not
            // match a longer host that starts with it.
            format!("^{body}(?:[/?#]|$)")
        };

        Regex::new(&anchored)
            .map(Some)
            .map_err(|e| RuleError::InvalidUrlPattern {
                rule: self.name.clone(),
                pattern: pattern.to_owned(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesFile {
    pub rules: Vec<ScrapingRule>,
}

impl RulesFile {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ScrapingRule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

/// Load and validate scraping rules from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, if any rule
/// is invalid, or if two rules share a name.
pub fn load_rules(path: &Path) -> Result<RulesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let rules_file: RulesFile = serde_yaml::from_str(&content)?;
    validate_rules(&rules_file)?;

    Ok(rules_file)
}

fn validate_rules(rules_file: &RulesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for rule in &rules_file.rules {
        rule.validate()?;
        if !seen.insert(rule.name.as_str()) {
            return Err(ConfigError::DuplicateRule(rule.name.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "rules_test.rs"]
mod tests;
