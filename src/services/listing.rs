// src/services/listing.rs

//! Configuration-driven scraper for HTML event listing pages.
//!
//! Each page is read two ways, in order:
//! 1. JSON-LD `Event` objects embedded in `<script type="application/ld+json">`
//! 2. Event cards matched by the source's CSS selectors
//!
//! The second pass only runs when the first finds nothing.

use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result, ScraperError};
use crate::models::{CompiledSelectors, RawEvent, SourceConfig};
use crate::services::EventScraper;
use crate::utils::{last_path_segment, resolve_url};

/// Upper bound on cards read from one page.
const MAX_CARDS: usize = 50;

const FREE: &str = "Free";
const DEFAULT_CURRENCY: &str = "INR";

static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Scrapes one platform's listing pages.
pub struct ListingScraper {
    source: SourceConfig,
    selectors: Option<CompiledSelectors>,
    client: Client,
}

impl ListingScraper {
    /// Create a scraper for `source`, sharing `client`.
    pub fn new(source: SourceConfig, client: Client) -> Result<Self> {
        if source.url_template.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::config(format!(
                "source '{}' has no url_template",
                source.platform
            )));
        }
        let selectors = source
            .selectors
            .as_ref()
            .map(|s| s.compile())
            .transpose()?;

        Ok(Self {
            source,
            selectors,
            client,
        })
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<String, ScraperError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScraperError::Blocked {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ScraperError::Network(format!("HTTP {status} for {url}")));
        }
        Ok(response.text().await?)
    }

    /// Extract events from a fetched listing page.
    pub fn parse_listing(
        &self,
        html: &str,
        page_url: &Url,
        city: &str,
        category: &str,
    ) -> std::result::Result<Vec<RawEvent>, ScraperError> {
        let document = Html::parse_document(html);

        let events = self.parse_json_ld(&document, city, category);
        if !events.is_empty() {
            return Ok(events);
        }

        match &self.selectors {
            Some(selectors) => Ok(self.parse_cards(&document, selectors, page_url, city, category)),
            None => Err(ScraperError::Parse(format!(
                "no JSON-LD events at {page_url} and no card selectors configured"
            ))),
        }
    }

    fn parse_json_ld(&self, document: &Html, city: &str, category: &str) -> Vec<RawEvent> {
        let mut events = Vec::new();

        for script in document.select(&JSON_LD) {
            let text: String = script.text().collect();
            let value: Value = match serde_json::from_str(text.trim()) {
                Ok(value) => value,
                Err(e) => {
                    log::debug!("{}: skipping malformed JSON-LD: {e}", self.source.platform);
                    continue;
                }
            };

            events.extend(
                json_ld_items(&value)
                    .into_iter()
                    .filter(|item| is_event(item))
                    .filter_map(|item| self.event_from_json_ld(item, city, category)),
            );
        }
        events
    }

    fn event_from_json_ld(&self, item: &Value, city: &str, category: &str) -> Option<RawEvent> {
        let title = str_field(item, "name")?.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let url = str_field(item, "url")
            .or_else(|| str_field(item, "@id"))
            .unwrap_or("")
            .to_string();
        let source_id = last_path_segment(&url).unwrap_or_default();

        let address = item.get("location").and_then(|l| l.get("address"));
        let event_city = address
            .and_then(|a| str_field(a, "addressLocality"))
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(city);

        let (price, is_free) = pricing(item);

        Some(RawEvent {
            platform: self.source.platform.clone(),
            source_id,
            title,
            description: str_field(item, "description").unwrap_or("").to_string(),
            start_date: str_field(item, "startDate").unwrap_or("").to_string(),
            city: event_city.to_string(),
            category: category.to_string(),
            url,
            end_date: str_field(item, "endDate").unwrap_or("").to_string(),
            price,
            is_free,
            organizer: organizer_name(item.get("organizer")),
        })
    }

    fn parse_cards(
        &self,
        document: &Html,
        selectors: &CompiledSelectors,
        base_url: &Url,
        city: &str,
        category: &str,
    ) -> Vec<RawEvent> {
        document
            .select(&selectors.card)
            .take(MAX_CARDS)
            .filter_map(|card| self.parse_card(&card, selectors, base_url, city, category))
            .collect()
    }

    fn parse_card(
        &self,
        card: &ElementRef,
        selectors: &CompiledSelectors,
        base_url: &Url,
        city: &str,
        category: &str,
    ) -> Option<RawEvent> {
        let title_elem = card.select(&selectors.title).next()?;
        let title = element_text(&title_elem);
        if title.is_empty() {
            return None;
        }

        let date = card
            .select(&selectors.date)
            .next()
            .map(|el| {
                el.value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(&el))
            })
            .unwrap_or_default();

        let description = selectors
            .description
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let link_elem = selectors
            .link
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .unwrap_or(title_elem);
        let url = link_elem
            .value()
            .attr(&selectors.attr_name)
            .map(|href| resolve_url(base_url, href))
            .unwrap_or_default();
        let source_id = last_path_segment(&url).unwrap_or_default();

        Some(RawEvent {
            platform: self.source.platform.clone(),
            source_id,
            title,
            description,
            start_date: date,
            city: city.to_string(),
            category: category.to_string(),
            url,
            end_date: String::new(),
            price: FREE.to_string(),
            is_free: true,
            organizer: String::new(),
        })
    }
}

#[async_trait]
impl EventScraper for ListingScraper {
    fn platform(&self) -> &str {
        &self.source.platform
    }

    async fn fetch_events(
        &self,
        city: &str,
        category: &str,
    ) -> std::result::Result<Vec<RawEvent>, ScraperError> {
        let url = self.source.listing_url(city, category);
        let page_url =
            Url::parse(&url).map_err(|e| ScraperError::Parse(format!("bad URL {url}: {e}")))?;

        let html = self.fetch_page(&url).await?;
        let events = self.parse_listing(&html, &page_url, city, category)?;

        log::info!(
            "{}: {} events from {} ({})",
            self.source.platform,
            events.len(),
            city,
            category
        );
        Ok(events)
    }
}

/// Top-level objects of a JSON-LD document, flattening arrays and `@graph`.
fn json_ld_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(json_ld_items).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => json_ld_items(graph),
            None => vec![value],
        },
        _ => Vec::new(),
    }
}

/// Whether a JSON-LD object is an `Event` or one of its subtypes.
fn is_event(item: &Value) -> bool {
    let event_type = |t: &str| t.ends_with("Event");
    match item.get("@type") {
        Some(Value::String(t)) => event_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(event_type),
        _ => false,
    }
}

/// Display price and free flag from an item's `offers`.
///
/// Listings without offers, or with a zero or "free" price, count as free.
fn pricing(item: &Value) -> (String, bool) {
    if item.get("isAccessibleForFree").and_then(Value::as_bool) == Some(true) {
        return (FREE.to_string(), true);
    }

    let offer = match item.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };
    let price = match offer.and_then(|o| o.get("price")) {
        Some(Value::String(p)) => p.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let free = price.is_empty()
        || price.eq_ignore_ascii_case("free")
        || price.parse::<f64>().is_ok_and(|p| p == 0.0);
    if free {
        return (FREE.to_string(), true);
    }

    let currency = offer
        .and_then(|o| str_field(o, "priceCurrency"))
        .unwrap_or(DEFAULT_CURRENCY);
    (format!("{currency} {price}"), false)
}

fn organizer_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(name)) => name.trim().to_string(),
        Some(Value::Array(items)) => organizer_name(items.first()),
        Some(org) => str_field(org, "name").unwrap_or("").trim().to_string(),
        None => String::new(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Config, ListingSelectors};

    fn scraper(selectors: Option<ListingSelectors>) -> ListingScraper {
        let mut source = Config::default().sources.remove(0);
        source.selectors = selectors;
        ListingScraper::new(source, Client::new()).unwrap()
    }

    fn page_url() -> Url {
        Url::parse("https://allevents.in/mumbai/tech/").unwrap()
    }

    #[test]
    fn test_parse_json_ld_events() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            [{"@type": "Event", "name": "React Conf Mumbai",
              "startDate": "2024-06-01T10:00:00+05:30",
              "url": "https://allevents.in/mumbai/react-conf/8000123",
              "location": {"address": {"addressLocality": "Navi Mumbai"}}},
             {"@type": "Organization", "name": "Not an event"}]
            </script>
            <script type="application/ld+json">{"@graph": [
              {"@type": ["MusicEvent"], "name": "Jazz Night", "startDate": "2024-06-02"}]}
            </script>
            <script type="application/ld+json">{ broken</script>
            </head><body></body></html>"#;

        let events = scraper(None)
            .parse_listing(html, &page_url(), "Mumbai", "technology")
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].source_id, "8000123");
        assert_eq!(events[0].city, "Navi Mumbai");
        assert_eq!(events[0].platform, "allevents");
        assert_eq!(events[1].title, "Jazz Night");
        assert_eq!(events[1].city, "Mumbai");
        assert_eq!(events[1].source_id, "");
    }

    #[test]
    fn test_json_ld_pricing_and_organizer() {
        let html = r#"
            <script type="application/ld+json">
            [{"@type": "Event", "name": "Design Summit", "startDate": "2024-06-10",
              "endDate": "2024-06-11",
              "offers": [{"price": "1499", "priceCurrency": "INR"}],
              "organizer": {"name": " Design Guild "}},
             {"@type": "Event", "name": "Open Mic", "startDate": "2024-06-12",
              "offers": {"price": 0}, "organizer": "Cafe Mondegar"},
             {"@type": "Event", "name": "Book Fair", "startDate": "2024-06-13"}]
            </script>"#;

        let events = scraper(None)
            .parse_listing(html, &page_url(), "Mumbai", "business")
            .unwrap();

        assert_eq!(events[0].price, "INR 1499");
        assert!(!events[0].is_free);
        assert_eq!(events[0].end_date, "2024-06-11");
        assert_eq!(events[0].organizer, "Design Guild");
        assert_eq!(events[1].price, "Free");
        assert!(events[1].is_free);
        assert_eq!(events[1].organizer, "Cafe Mondegar");
        assert!(events[2].is_free);
    }

    #[test]
    fn test_parse_cards_when_no_json_ld() {
        let html = r#"
            <ul>
              <li class="event-item">
                <h3>  Startup   Pitch Day </h3>
                <time datetime="2024-06-05">Wed, Jun 5</time>
                <a href="/mumbai/startup-pitch/555">details</a>
              </li>
              <li class="event-item"><h3></h3></li>
              <li class="event-item">
                <h3>Food Walk</h3><span class="date">2024-06-07</span>
              </li>
            </ul>"#;

        let events = scraper(Some(ListingSelectors::default()))
            .parse_listing(html, &page_url(), "Mumbai", "technology")
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Startup Pitch Day");
        assert_eq!(events[0].start_date, "2024-06-05");
        assert_eq!(events[0].url, "https://allevents.in/mumbai/startup-pitch/555");
        assert_eq!(events[0].source_id, "555");
        assert_eq!(events[1].start_date, "2024-06-07");
        assert_eq!(events[1].url, "");
    }

    #[test]
    fn test_no_json_ld_and_no_selectors_is_parse_error() {
        let result = scraper(None).parse_listing("<html></html>", &page_url(), "Mumbai", "music");
        assert!(matches!(result, Err(ScraperError::Parse(_))));
    }

    #[test]
    fn test_new_rejects_missing_template() {
        let mut source = Config::default().sources.remove(0);
        source.url_template = None;
        assert!(ListingScraper::new(source, Client::new()).is_err());
    }
}
