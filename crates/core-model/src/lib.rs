use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

const TOPIC_PREFIX: &str = "topic";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a marketer.\n\
[Photo description]: {description}\n\
Based on this, write an Instagram post that gives people in their twenties \
a 'Zero to Hero' kind of inspiration.";

/// One cached result: the media item plus the text generated from its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub key: String,
    pub title: String,
    pub source_description: String,
    pub generated_brief: String,
    pub media_url: String,
}

/// Natural identifier of a record.
///
/// Dates address the picture of the day; topics address a library search and
/// carry the day they were fetched so each day maps to its own record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Date(NaiveDate),
    Topic { keyword: String, day: NaiveDate },
}

impl RecordKey {
    pub fn date(day: NaiveDate) -> Self {
        RecordKey::Date(day)
    }

    pub fn topic(keyword: &str, day: NaiveDate) -> anyhow::Result<Self> {
        let keyword = normalize_keyword(keyword)?;
        Ok(RecordKey::Topic { keyword, day })
    }

    pub fn day(&self) -> NaiveDate {
        match self {
            RecordKey::Date(day) => *day,
            RecordKey::Topic { day, .. } => *day,
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Date(day) => write!(f, "{}", day.format(DATE_FORMAT)),
            RecordKey::Topic { keyword, day } => {
                write!(f, "{TOPIC_PREFIX}:{keyword}:{}", day.format(DATE_FORMAT))
            }
        }
    }
}

impl std::str::FromStr for RecordKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(TOPIC_PREFIX).and_then(|r| r.strip_prefix(':')) {
            let Some((keyword, day)) = rest.rsplit_once(':') else {
                anyhow::bail!("topic key must look like topic:<keyword>:<YYYY-MM-DD>: {s}");
            };
            let day = parse_day(day)?;
            return RecordKey::topic(keyword, day);
        }
        Ok(RecordKey::Date(parse_day(s)?))
    }
}

fn parse_day(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid date {s:?} (expected YYYY-MM-DD): {e}"))
}

fn normalize_keyword(raw: &str) -> anyhow::Result<String> {
    let keyword = raw.trim().to_lowercase();
    if keyword.is_empty() {
        anyhow::bail!("topic keyword must not be empty");
    }
    if keyword.contains(':') {
        anyhow::bail!("topic keyword must not contain ':': {raw}");
    }
    Ok(keyword)
}

/// What a media provider hands back for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub title: String,
    pub description: String,
    pub media_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no data for {key}: {detail}")]
    NotFound { key: String, detail: String },
    #[error("provider transport error (status {}): {body}", fmt_status(.status))]
    Transport { status: Option<u16>, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation rate limited: {detail}")]
    RateLimited { detail: String },
    #[error("generation failed (status {}): {detail}", fmt_status(.status))]
    Failed { status: Option<u16>, detail: String },
    #[error("generation returned no text")]
    Empty,
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

pub trait MediaProvider: Send {
    fn fetch(&self, key: &RecordKey) -> Result<MediaItem, ProviderError>;
}

pub trait TextGenerator: Send {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Prompt text with `{description}` and optional `{title}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> anyhow::Result<Self> {
        let template = template.into();
        if !template.contains("{description}") {
            anyhow::bail!("prompt template must contain a {{description}} placeholder");
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitutes placeholders in a single pass so text coming from the
    /// provider is never re-expanded.
    pub fn render(&self, item: &MediaItem) -> String {
        let mut out = String::with_capacity(self.template.len() + item.description.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{description}") {
                out.push_str(&item.description);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{title}") {
                out.push_str(&item.title);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Stable index into a list of `len` items derived from `parts`.
pub fn pick_index(parts: &[&str], len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    let hash = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    Some((u64::from_le_bytes(head) % len as u64) as usize)
}
