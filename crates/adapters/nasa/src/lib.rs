//! Media provider backed by NASA's public APIs: the Astronomy Picture of the
//! Day for date keys and the Image and Video Library for topic keys.

use adapter_common::{error_text, join_url, read_failure};
use chrono::NaiveDate;
use core_model::{MediaItem, MediaProvider, ProviderError, RecordKey, pick_index};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

pub const DEFAULT_APOD_BASE_URL: &str = "https://api.nasa.gov";
pub const DEFAULT_LIBRARY_BASE_URL: &str = "https://images-api.nasa.gov";
pub const DEMO_API_KEY: &str = "DEMO_KEY";

const UNTITLED: &str = "Untitled";

#[derive(Debug, Deserialize)]
struct ApodResponse {
    title: Option<String>,
    explanation: Option<String>,
    url: Option<String>,
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApodErrorBody {
    msg: Option<String>,
}

pub struct ApodClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApodClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn fetch_day(&self, day: NaiveDate) -> Result<MediaItem, ProviderError> {
        let key = RecordKey::date(day).as_string();
        if let Some(first) = first_apod_day()
            && day < first
        {
            return Err(ProviderError::NotFound {
                key,
                detail: format!("the picture archive starts on {first}"),
            });
        }

        let url = join_url(&self.base_url, "planetary/apod");
        info!(date = %key, "fetching picture of the day");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("date", key.as_str())])
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let (code, body) = read_failure(response);
            // APOD answers out-of-range or unknown dates with 400/404 and a `msg`.
            if code == 400 || code == 404 {
                let detail = serde_json::from_str::<ApodErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.msg)
                    .unwrap_or(body);
                return Err(ProviderError::NotFound { key, detail });
            }
            return Err(ProviderError::Transport {
                status: Some(code),
                body,
            });
        }

        let payload: ApodResponse = response.json().map_err(transport)?;
        debug!(date = %key, media_type = ?payload.media_type, "picture of the day received");
        let Some(media_url) = payload.url.filter(|u| !u.trim().is_empty()) else {
            return Err(ProviderError::NotFound {
                key,
                detail: "response carries no media url".to_string(),
            });
        };
        Ok(MediaItem {
            title: payload.title.unwrap_or_else(|| UNTITLED.to_string()),
            description: payload.explanation.unwrap_or_default(),
            media_url: Some(media_url),
        })
    }
}

fn first_apod_day() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1995, 6, 16)
}

#[derive(Debug, Deserialize)]
struct LibraryResponse {
    collection: LibraryCollection,
}

#[derive(Debug, Deserialize)]
struct LibraryCollection {
    #[serde(default)]
    items: Vec<LibraryItem>,
}

#[derive(Debug, Deserialize)]
struct LibraryItem {
    #[serde(default)]
    data: Vec<LibraryData>,
    #[serde(default)]
    links: Vec<LibraryLink>,
}

#[derive(Debug, Deserialize)]
struct LibraryData {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LibraryLink {
    href: String,
    render: Option<String>,
}

impl LibraryItem {
    fn into_media(self) -> Option<MediaItem> {
        let data = self.data.into_iter().next()?;
        let link = self
            .links
            .into_iter()
            .find(|l| l.render.as_deref() == Some("image"))?;
        Some(MediaItem {
            title: data.title.unwrap_or_else(|| UNTITLED.to_string()),
            description: data.description.unwrap_or_default(),
            media_url: Some(link.href),
        })
    }
}

pub struct ImageLibraryClient {
    client: Client,
    base_url: String,
}

impl ImageLibraryClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Searches the library for `keyword` and picks one image for `day`; the
    /// same keyword and day always land on the same result.
    pub fn fetch_topic(&self, keyword: &str, day: NaiveDate) -> Result<MediaItem, ProviderError> {
        let key = RecordKey::Topic {
            keyword: keyword.to_string(),
            day,
        }
        .as_string();
        let url = join_url(&self.base_url, "search");
        info!(keyword, "searching image library");
        let response = self
            .client
            .get(&url)
            .query(&[("q", keyword), ("media_type", "image")])
            .send()
            .map_err(transport)?;

        if !response.status().is_success() {
            let (code, body) = read_failure(response);
            return Err(ProviderError::Transport {
                status: Some(code),
                body,
            });
        }

        let payload: LibraryResponse = response.json().map_err(transport)?;
        let mut usable: Vec<MediaItem> = payload
            .collection
            .items
            .into_iter()
            .filter_map(LibraryItem::into_media)
            .collect();
        debug!(keyword, results = usable.len(), "image library results");
        let day_str = day.to_string();
        let Some(index) = pick_index(&[keyword, &day_str], usable.len()) else {
            return Err(ProviderError::NotFound {
                key,
                detail: format!("no images found for topic {keyword:?}"),
            });
        };
        Ok(usable.swap_remove(index))
    }
}

/// Dispatches date keys to APOD and topic keys to the image library.
pub struct NasaProvider {
    apod: ApodClient,
    library: ImageLibraryClient,
}

impl NasaProvider {
    pub fn new(apod: ApodClient, library: ImageLibraryClient) -> Self {
        Self { apod, library }
    }
}

impl MediaProvider for NasaProvider {
    fn fetch(&self, key: &RecordKey) -> Result<MediaItem, ProviderError> {
        match key {
            RecordKey::Date(day) => self.apod.fetch_day(*day),
            RecordKey::Topic { keyword, day } => self.library.fetch_topic(keyword, *day),
        }
    }
}

fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        status: err.status().map(|s| s.as_u16()),
        body: error_text(err),
    }
}
