use core_model::{
    ArchiveRecord, GenerationError, MediaProvider, PromptTemplate, ProviderError, RecordKey,
    TextGenerator,
};
use store_sqlite::{SqliteStore, StorageError};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no data for {key}: {detail}")]
    NotFound { key: String, detail: String },
    #[error("transport error (status {}): {body}", .status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    Transport { status: Option<u16>, body: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            FetchError::Generation(GenerationError::RateLimited { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

impl From<ProviderError> for FetchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound { key, detail } => FetchError::NotFound { key, detail },
            ProviderError::Transport { status, body } => FetchError::Transport { status, body },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: ArchiveRecord,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvePhase {
    CacheLookup,
    CacheHit,
    Fetching,
    Generating { prompt_chars: usize },
    Storing,
    Done { source: Source },
}

/// Everything one resolution needs, constructed by the entry point and
/// passed around explicitly.
pub struct Resolver {
    provider: Box<dyn MediaProvider>,
    generator: Box<dyn TextGenerator>,
    template: PromptTemplate,
    store: SqliteStore,
}

impl Resolver {
    pub fn new(
        provider: Box<dyn MediaProvider>,
        generator: Box<dyn TextGenerator>,
        template: PromptTemplate,
        store: SqliteStore,
    ) -> Self {
        Self {
            provider,
            generator,
            template,
            store,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn resolve(&self, key: &RecordKey, bypass_cache: bool) -> Result<Resolution, FetchError> {
        self.resolve_with_progress(key, bypass_cache, |_| {})
    }

    /// Serves `key` from the cache unless `bypass_cache` is set or the key is
    /// missing; otherwise fetches, generates and stores, in that order.
    /// Nothing is written unless both external calls succeed.
    pub fn resolve_with_progress(
        &self,
        key: &RecordKey,
        bypass_cache: bool,
        on_progress: impl Fn(ResolvePhase),
    ) -> Result<Resolution, FetchError> {
        let key_str = key.as_string();

        if !bypass_cache {
            on_progress(ResolvePhase::CacheLookup);
            if let Some(record) = self.store.lookup(&key_str)? {
                info!(key = %key_str, "cache hit");
                on_progress(ResolvePhase::CacheHit);
                on_progress(ResolvePhase::Done {
                    source: Source::Cache,
                });
                return Ok(Resolution {
                    record,
                    source: Source::Cache,
                });
            }
            info!(key = %key_str, "cache miss");
        } else {
            info!(key = %key_str, "bypassing cache");
        }

        on_progress(ResolvePhase::Fetching);
        let item = self.provider.fetch(key).inspect_err(|e| {
            warn!(key = %key_str, error = %e, "media fetch failed");
        })?;
        let Some(media_url) = item.media_url.clone().filter(|u| !u.trim().is_empty()) else {
            warn!(key = %key_str, "media item has no locator");
            return Err(FetchError::NotFound {
                key: key_str,
                detail: "media item has no media url".to_string(),
            });
        };

        let prompt = self.template.render(&item);
        on_progress(ResolvePhase::Generating {
            prompt_chars: prompt.chars().count(),
        });
        let brief = self.generator.generate(&prompt).inspect_err(|e| {
            warn!(key = %key_str, error = %e, "generation failed");
        })?;

        let record = ArchiveRecord {
            key: key_str,
            title: item.title,
            source_description: item.description,
            generated_brief: brief,
            media_url,
        };
        on_progress(ResolvePhase::Storing);
        self.store.store(&record)?;
        info!(key = %record.key, "stored fresh record");
        on_progress(ResolvePhase::Done {
            source: Source::Fresh,
        });
        Ok(Resolution {
            record,
            source: Source::Fresh,
        })
    }
}
