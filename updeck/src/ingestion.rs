use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use common::FeedConfig;

/// Date format used by the update feed's `<pubDate>` after the weekday prefix
/// (the trailing `Z` is literal).
pub const FEED_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S Z";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Updeck/0.1.0";

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("feed is not well-formed XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Announcement category, derived from the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Preview,
    GeneralAvailability,
}

impl Category {
    pub fn classify(title: &str) -> Self {
        if title.to_lowercase().contains("preview") {
            Category::Preview
        } else {
            Category::GeneralAvailability
        }
    }
}

/// One product update announcement taken from a feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub title: String,
    pub link: String,
    /// `<pubDate>` exactly as the feed wrote it
    pub published_raw: String,
    pub published: DateTime<Utc>,
    pub category: Category,
}

/// Half-open UTC interval `[start, end)` used to filter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateWindow {
    /// Window covering every instant from `start` through the whole of `last_day`.
    /// Returns `None` when `start` is after `last_day`.
    pub fn inclusive(start: NaiveDate, last_day: NaiveDate) -> Option<Self> {
        if start > last_day {
            return None;
        }
        let end = last_day.checked_add_days(Days::new(1))?;
        Some(Self {
            start: midnight_utc(start)?,
            end: midnight_utc(end)?,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n))
}

/// Parses a `<pubDate>` value. RFC 2822 dates are accepted as a fallback.
///
/// The leading weekday is informational only and is not checked against the date.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let body = raw
        .split_once(',')
        .filter(|(day, _)| !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()))
        .map_or(raw, |(_, rest)| rest.trim());
    NaiveDateTime::parse_from_str(body, FEED_DATE_FORMAT)
        .map(|n| Utc.from_utc_datetime(&n))
        .or_else(|_| DateTime::parse_from_rfc2822(raw).map(|d| d.with_timezone(&Utc)))
        .ok()
}

/// Fetches the configured update feed. One GET per call, no retries.
pub struct FeedFetcher {
    client: Client,
    url: String,
}

impl FeedFetcher {
    pub fn new(url: impl Into<String>, timeout_secs: u64, user_agent: &str) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        Self::new(
            config.url.clone(),
            config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS),
            config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the records published inside `window`, in feed order.
    ///
    /// `Ok(vec![])` means the feed was read and nothing matched; any transport, status
    /// or XML problem is an error.
    pub async fn fetch(&self, window: &DateWindow) -> Result<Vec<UpdateRecord>, FeedError> {
        debug!(url = %self.url, start = %window.start(), end = %window.end(), "fetching update feed");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        let body = response.text().await?;
        let records = parse_updates(&body, window)?;

        info!(url = %self.url, bytes = body.len(), matched = records.len(), "update feed parsed");
        Ok(records)
    }
}

#[derive(Clone, Copy)]
enum ItemField {
    Title,
    Link,
    PubDate,
}

#[derive(Default)]
struct RawItem {
    title: String,
    link: String,
    pub_date: String,
}

impl RawItem {
    fn push(&mut self, field: ItemField, text: &str) {
        match field {
            ItemField::Title => self.title.push_str(text),
            ItemField::Link => self.link.push_str(text),
            ItemField::PubDate => self.pub_date.push_str(text),
        }
    }

    fn into_record(self) -> Option<UpdateRecord> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            warn!("skipping feed item without a title");
            return None;
        }

        let published_raw = self.pub_date.trim().to_string();
        let Some(published) = parse_pub_date(&published_raw) else {
            warn!(title = %title, pub_date = %published_raw, "skipping feed item with unparseable pubDate");
            return None;
        };

        Some(UpdateRecord {
            category: Category::classify(&title),
            link: self.link.trim().to_string(),
            title,
            published_raw,
            published,
        })
    }
}

/// Extracts every `<item>` of an RSS document and keeps those inside `window`.
pub fn parse_updates(xml: &str, window: &DateWindow) -> Result<Vec<UpdateRecord>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field: Option<ItemField> = None;

    loop {
        match reader.read_event()? {
            // full names, so namespaced siblings like `media:title` are skipped
            Event::Start(e) => match e.name().as_ref() {
                b"item" => current = Some(RawItem::default()),
                b"title" if current.is_some() => field = Some(ItemField::Title),
                b"link" if current.is_some() => field = Some(ItemField::Link),
                b"pubDate" if current.is_some() => field = Some(ItemField::PubDate),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"item" => {
                    field = None;
                    if let Some(record) = current.take().and_then(RawItem::into_record) {
                        if window.contains(record.published) {
                            records.push(record);
                        }
                    }
                }
                b"title" | b"link" | b"pubDate" => field = None,
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}
