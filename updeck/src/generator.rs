//! Request workflow: validate dates, fetch, build, render, upload.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::deck::Deck;
use crate::ingestion::{DateWindow, FeedError, FeedFetcher};
use crate::pptx::{self, RenderError};
use crate::storage::{upload_deck, BlobStore, StorageError, UploadResult};

pub const REQUEST_DATE_FORMAT: &str = "%Y-%m-%d";

pub const MISSING_START_MESSAGE: &str =
    "Bad request: 'start' query parameter is required in format YYYY-MM-DD.";
pub const BAD_FORMAT_MESSAGE: &str = "Check the format of your request and ensure you provide the 'start' query parameter in the format YYYY-MM-DD";
pub const REVERSED_RANGE_MESSAGE: &str =
    "Bad request: 'start' must not be later than 'end'.";
pub const NO_UPDATES_MESSAGE: &str =
    "There are no updates for the specified period, so no PowerPoint has been generated.";
pub const FEED_UNAVAILABLE_MESSAGE: &str =
    "The update feed could not be retrieved, so no PowerPoint has been generated. Please try again later.";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Something went wrong while generating the PowerPoint. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("{0}")]
    Validation(String),

    #[error("update feed unavailable: {0}")]
    FeedUnavailable(#[from] FeedError),

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("upload failed: {0}")]
    Storage(#[from] StorageError),
}

impl GenerateError {
    pub fn status_code(&self) -> u16 {
        match self {
            GenerateError::Validation(_) => 400,
            GenerateError::FeedUnavailable(_) => 502,
            GenerateError::Render(_) | GenerateError::Storage(_) => 500,
        }
    }

    /// Text shown to the caller. Internal details only go to the log.
    pub fn public_message(&self) -> &str {
        match self {
            GenerateError::Validation(msg) => msg,
            GenerateError::FeedUnavailable(_) => FEED_UNAVAILABLE_MESSAGE,
            GenerateError::Render(_) | GenerateError::Storage(_) => INTERNAL_ERROR_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    NoUpdates,
    Uploaded(UploadResult),
}

fn parse_request_date(raw: &str) -> Result<NaiveDate, GenerateError> {
    NaiveDate::parse_from_str(raw.trim(), REQUEST_DATE_FORMAT)
        .map_err(|_| GenerateError::Validation(BAD_FORMAT_MESSAGE.to_string()))
}

/// Turns the raw query values into a window. A missing `end` means `today`.
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateWindow, GenerateError> {
    let start = match start.map(str::trim) {
        Some(s) if !s.is_empty() => parse_request_date(s)?,
        _ => return Err(GenerateError::Validation(MISSING_START_MESSAGE.to_string())),
    };

    let end = match end.map(str::trim) {
        Some(e) if !e.is_empty() => parse_request_date(e)?,
        _ => today,
    };

    DateWindow::inclusive(start, end)
        .ok_or_else(|| GenerateError::Validation(REVERSED_RANGE_MESSAGE.to_string()))
}

pub async fn generate_presentation(
    fetcher: &FeedFetcher,
    store: &dyn BlobStore,
    window: DateWindow,
    now: DateTime<Utc>,
) -> Result<GenerateOutcome, GenerateError> {
    let records = fetcher.fetch(&window).await.map_err(|e| {
        warn!(error = %e, url = %fetcher.url(), "update feed unavailable");
        GenerateError::from(e)
    })?;

    if records.is_empty() {
        info!(start = %window.start(), end = %window.end(), "no updates in window");
        return Ok(GenerateOutcome::NoUpdates);
    }

    let deck = Deck::from_records(&records);
    let rendered = pptx::render(&deck, now).map_err(|e| {
        error!(error = %e, "failed to render presentation");
        GenerateError::from(e)
    })?;

    let upload = upload_deck(store, rendered, now).await.map_err(|e| {
        error!(error = %e, store = %store.describe(), "failed to upload presentation");
        GenerateError::from(e)
    })?;

    info!(records = records.len(), slides = deck.len(), blob = %upload.blob_name, "presentation generated");
    Ok(GenerateOutcome::Uploaded(upload))
}

/// Success body with the link escaped for a single-quoted attribute.
pub fn download_message(url: &str) -> String {
    format!(
        "File created and uploaded to storage. You can <a href='{}'>download it</a> for the next 1 hour.",
        quick_xml::escape::escape(url)
    )
}
