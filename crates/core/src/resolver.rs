//! Caption resolution as an ordered list of named strategies run by one cascade.
//!
//! The default order is manual, auto-generated, translated (all driven by one
//! track listing), then a direct best-effort fetch that only applies when the
//! listing itself was unavailable. The first strategy yielding segments wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::captions::{CaptionError, CaptionService, CaptionTrack, with_timeout};
use crate::config::TimeoutConfig;
use crate::language::{expand_language_priority, find_by_priority, in_priority};
use crate::types::{AttemptOutcome, Detail, FetchedCaptions, SourceOrigin, SourceType, TranscriptResult};
use crate::video_id::VideoId;

/// Result of the single track listing shared by all strategies.
#[derive(Debug)]
pub enum Listing {
    Available(Vec<CaptionTrack>),
    Unavailable(CaptionError),
}

/// Everything a strategy may look at.
pub struct ResolveContext<'a> {
    pub video_id: &'a VideoId,
    pub languages: &'a [String],
    pub listing: &'a Listing,
    pub service: &'a dyn CaptionService,
    pub fetch_timeout: Duration,
}

impl ResolveContext<'_> {
    fn tracks(&self) -> &[CaptionTrack] {
        match self.listing {
            Listing::Available(tracks) => tracks,
            Listing::Unavailable(_) => &[],
        }
    }

    async fn fetch(&self, track: &CaptionTrack) -> Result<FetchedCaptions, CaptionError> {
        with_timeout(self.fetch_timeout, self.service.fetch_track(track)).await
    }
}

/// A successful strategy run.
#[derive(Debug)]
pub struct Hit {
    pub source_type: SourceType,
    pub path: &'static str,
    pub fetched: FetchedCaptions,
    pub source_origin: Option<SourceOrigin>,
    pub target: Option<String>,
    pub base_language_code: Option<String>,
}

#[async_trait]
pub trait CaptionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, listing: &Listing) -> bool;

    /// `Err` carries why this strategy produced nothing; the cascade moves on.
    async fn attempt(&self, ctx: &ResolveContext<'_>) -> Result<Hit, AttemptOutcome>;
}

fn failed(e: &CaptionError) -> AttemptOutcome {
    AttemptOutcome::Failed {
        category: e.category(),
        message: e.to_string(),
    }
}

/// Fetch outcome classification shared by the listing strategies.
fn classify_fetch(result: Result<FetchedCaptions, CaptionError>) -> Result<FetchedCaptions, AttemptOutcome> {
    match result {
        Ok(fetched) if !fetched.segments.is_empty() => Ok(fetched),
        Ok(_) => Err(AttemptOutcome::Empty),
        Err(e) => Err(failed(&e)),
    }
}

/// Human-authored track in a priority language.
pub struct ManualStrategy;

#[async_trait]
impl CaptionStrategy for ManualStrategy {
    fn name(&self) -> &'static str {
        "list->manual"
    }

    fn applies(&self, listing: &Listing) -> bool {
        matches!(listing, Listing::Available(_))
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> Result<Hit, AttemptOutcome> {
        let manual: Vec<CaptionTrack> = ctx.tracks().iter().filter(|t| !t.is_generated).cloned().collect();
        let track = find_by_priority(&manual, ctx.languages, |t| t.language_code.as_str())
            .ok_or(AttemptOutcome::NoMatch)?;
        let fetched = classify_fetch(ctx.fetch(track).await)?;
        Ok(Hit {
            source_type: SourceType::Manual,
            path: self.name(),
            fetched,
            source_origin: None,
            target: None,
            base_language_code: None,
        })
    }
}

/// Platform-generated (ASR) track in a priority language.
pub struct AutoStrategy;

#[async_trait]
impl CaptionStrategy for AutoStrategy {
    fn name(&self) -> &'static str {
        "list->auto"
    }

    fn applies(&self, listing: &Listing) -> bool {
        matches!(listing, Listing::Available(_))
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> Result<Hit, AttemptOutcome> {
        let generated: Vec<CaptionTrack> = ctx.tracks().iter().filter(|t| t.is_generated).cloned().collect();
        let track = find_by_priority(&generated, ctx.languages, |t| t.language_code.as_str())
            .ok_or(AttemptOutcome::NoMatch)?;
        let fetched = classify_fetch(ctx.fetch(track).await)?;
        Ok(Hit {
            source_type: SourceType::Auto,
            path: self.name(),
            fetched,
            source_origin: None,
            target: None,
            base_language_code: None,
        })
    }
}

/// Any translatable track, machine-translated into the first priority language.
pub struct TranslatedStrategy;

impl TranslatedStrategy {
    /// Priority-language tracks first, manual before generated, listing order otherwise.
    fn candidates<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Vec<&'a CaptionTrack> {
        let mut candidates: Vec<&CaptionTrack> = tracks.iter().filter(|t| t.is_translatable).collect();
        candidates.sort_by_key(|t| (!in_priority(&t.language_code, languages), t.is_generated));
        candidates
    }
}

#[async_trait]
impl CaptionStrategy for TranslatedStrategy {
    fn name(&self) -> &'static str {
        "list->translate"
    }

    fn applies(&self, listing: &Listing) -> bool {
        matches!(listing, Listing::Available(_))
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> Result<Hit, AttemptOutcome> {
        let target = ctx.languages.first().ok_or(AttemptOutcome::NoMatch)?;
        let candidates = Self::candidates(ctx.tracks(), ctx.languages);
        let mut last = AttemptOutcome::NoMatch;

        for base in candidates {
            let result = with_timeout(ctx.fetch_timeout, ctx.service.fetch_translated(base, target)).await;
            match classify_fetch(result) {
                Ok(fetched) => {
                    return Ok(Hit {
                        source_type: SourceType::Translated,
                        path: self.name(),
                        fetched,
                        source_origin: Some(SourceOrigin::from_generated(base.is_generated)),
                        target: Some(target.clone()),
                        base_language_code: Some(base.language_code.clone()),
                    });
                }
                Err(outcome) => {
                    debug!(video_id = %ctx.video_id, base = %base.language_code, ?outcome, "translation attempt missed");
                    last = outcome;
                }
            }
        }
        Err(last)
    }
}

/// Direct fetch across the language list when no listing could be obtained.
pub struct DirectFetchStrategy;

#[async_trait]
impl CaptionStrategy for DirectFetchStrategy {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn applies(&self, listing: &Listing) -> bool {
        matches!(listing, Listing::Unavailable(_))
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> Result<Hit, AttemptOutcome> {
        // Up to two requests per language.
        let budget = ctx.fetch_timeout * (2 * ctx.languages.len().max(1)) as u32;
        let result = with_timeout(budget, ctx.service.fetch_direct(ctx.video_id, ctx.languages)).await;
        let fetched = classify_fetch(result)?;
        Ok(Hit {
            source_type: SourceType::Fetch,
            path: self.name(),
            fetched,
            source_origin: None,
            target: None,
            base_language_code: None,
        })
    }
}

pub fn default_strategies() -> Vec<Box<dyn CaptionStrategy>> {
    vec![
        Box::new(ManualStrategy),
        Box::new(AutoStrategy),
        Box::new(TranslatedStrategy),
        Box::new(DirectFetchStrategy),
    ]
}

/// Runs the strategy cascade against one caption service.
pub struct CaptionResolver {
    service: Arc<dyn CaptionService>,
    strategies: Vec<Box<dyn CaptionStrategy>>,
    list_timeout: Duration,
    fetch_timeout: Duration,
}

impl CaptionResolver {
    pub fn new(service: Arc<dyn CaptionService>, timeouts: &TimeoutConfig) -> Self {
        Self::with_strategies(service, timeouts, default_strategies())
    }

    pub fn with_strategies(
        service: Arc<dyn CaptionService>,
        timeouts: &TimeoutConfig,
        strategies: Vec<Box<dyn CaptionStrategy>>,
    ) -> Self {
        Self {
            service,
            strategies,
            list_timeout: timeouts.list(),
            fetch_timeout: timeouts.fetch(),
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves the best available transcript. Service failures are recorded
    /// in `detail`, never returned.
    pub async fn resolve(&self, video_id: &VideoId, languages: &[String]) -> TranscriptResult {
        let languages = if languages.is_empty() {
            expand_language_priority::<&str>(&[])
        } else {
            languages.to_vec()
        };

        let mut detail = Detail::default();
        let listing = match with_timeout(self.list_timeout, self.service.list_tracks(video_id)).await {
            Ok(tracks) => {
                debug!(video_id = %video_id, tracks = tracks.len(), "caption listing ok");
                Listing::Available(tracks)
            }
            Err(e) => {
                debug!(video_id = %video_id, error = %e, "caption listing unavailable");
                detail.list_error = Some(e.to_string());
                Listing::Unavailable(e)
            }
        };

        let ctx = ResolveContext {
            video_id,
            languages: &languages,
            listing: &listing,
            service: self.service.as_ref(),
            fetch_timeout: self.fetch_timeout,
        };

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.applies(&listing) {
                detail.record(name, AttemptOutcome::Skipped);
                continue;
            }
            if matches!(listing, Listing::Unavailable(_)) {
                detail.tried = languages.clone();
            }

            match strategy.attempt(&ctx).await {
                Ok(hit) => {
                    info!(
                        video_id = %video_id,
                        strategy = name,
                        segments = hit.fetched.segments.len(),
                        "transcript resolved"
                    );
                    detail.record(
                        name,
                        AttemptOutcome::Found {
                            segments: hit.fetched.segments.len(),
                        },
                    );
                    detail.path = Some(hit.path);
                    detail.source_origin = hit.source_origin;
                    detail.target = hit.target;
                    detail.base_language_code = hit.base_language_code;
                    return TranscriptResult::found(hit.source_type, hit.fetched, detail);
                }
                Err(outcome) => {
                    debug!(video_id = %video_id, strategy = name, ?outcome, "strategy missed");
                    detail.record(name, outcome);
                }
            }
        }

        detail.error = Some(
            match listing {
                Listing::Available(_) => "NO_MATCH_IN_LIST",
                Listing::Unavailable(_) if !detail.tried.is_empty() => "FETCH_FAILED",
                Listing::Unavailable(_) => "NO_TRANSCRIPT",
            }
            .to_string(),
        );
        TranscriptResult::none(detail)
    }
}
