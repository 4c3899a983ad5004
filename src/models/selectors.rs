// src/models/selectors.rs

//! CSS selectors for scraping an event listing page.

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// CSS selectors for the event cards of a listing page.
///
/// Only consulted when the page carries no JSON-LD `Event` data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSelectors {
    /// Selector for each event card
    pub card_selector: String,

    /// Selector for the title element within a card
    pub title_selector: String,

    /// Selector for the date element within a card
    pub date_selector: String,

    /// Optional selector for the link element (if different from title)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selector: Option<String>,

    /// Optional selector for a short description within a card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_selector: Option<String>,

    /// HTML attribute name for extracting links (usually "href")
    #[serde(default = "default_attr_name")]
    pub attr_name: String,
}

fn default_attr_name() -> String {
    "href".to_string()
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            card_selector: "li.event-item, div.event-card".to_string(),
            title_selector: "h2, h3, .title".to_string(),
            date_selector: ".date, time".to_string(),
            link_selector: Some("a".to_string()),
            description_selector: None,
            attr_name: default_attr_name(),
        }
    }
}

/// Parsed form of [`ListingSelectors`].
#[derive(Debug)]
pub struct CompiledSelectors {
    pub card: Selector,
    pub title: Selector,
    pub date: Selector,
    pub link: Option<Selector>,
    pub description: Option<Selector>,
    pub attr_name: String,
}

impl ListingSelectors {
    /// Parse every selector, failing on the first invalid one.
    pub fn compile(&self) -> Result<CompiledSelectors> {
        Ok(CompiledSelectors {
            card: parse_selector(&self.card_selector)?,
            title: parse_selector(&self.title_selector)?,
            date: parse_selector(&self.date_selector)?,
            link: self
                .link_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
            description: self
                .description_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
            attr_name: self.attr_name.clone(),
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selectors_compile() {
        let compiled = ListingSelectors::default().compile().unwrap();
        assert!(compiled.link.is_some());
        assert!(compiled.description.is_none());
        assert_eq!(compiled.attr_name, "href");
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let selectors = ListingSelectors {
            card_selector: "[[invalid".to_string(),
            ..ListingSelectors::default()
        };
        assert!(matches!(
            selectors.compile(),
            Err(AppError::Selector { .. })
        ));
    }
}
