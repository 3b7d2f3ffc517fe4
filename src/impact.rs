// src/impact.rs
//! Impact mapping: story -> ranked tickers with tiered confidence.
//!
//! Entity spans come from the external extractor, the built-in rule
//! extractor and the story's source tags. Each span resolves through the
//! rule tables to one or more tickers; the tier is fixed by the signal kind.

use metrics::counter;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::NewsConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{ImpactReason, ImpactedStock, Story, StoryWithImpact};
use crate::providers::{EntityExtractor, EntityKind, EntitySpan, RuleExtractor};
use crate::sentiment::SentimentAnalyzer;
use crate::text::normalize_phrase;

/// Running per-ticker accumulator.
#[derive(Debug, Default)]
struct Hit {
    confidence: f32,
    reasons: Vec<ImpactReason>,
}

impl Hit {
    fn add(&mut self, reason: ImpactReason) {
        self.confidence = self.confidence.max(reason.signal().confidence());
        let dup = self.reasons.iter().any(|r| same_basis(r, &reason));
        if !dup {
            self.reasons.push(reason);
        }
    }
}

/// Two reasons that would read identically count once.
fn same_basis(a: &ImpactReason, b: &ImpactReason) -> bool {
    match (a, b) {
        (ImpactReason::DirectMention { .. }, ImpactReason::DirectMention { .. }) => true,
        _ => a == b,
    }
}

pub struct ImpactMapper {
    config: NewsConfig,
    rules: RuleExtractor,
    sentiment: SentimentAnalyzer,
}

impl ImpactMapper {
    pub fn new(config: NewsConfig) -> CoreResult<Self> {
        let rules = RuleExtractor::from_tables(&config.tables)?;
        Ok(Self {
            config,
            rules,
            sentiment: SentimentAnalyzer::new(),
        })
    }

    pub fn config(&self) -> &NewsConfig {
        &self.config
    }

    /// Rule-extractor spans for arbitrary text.
    pub fn rule_spans(&self, text: &str) -> Vec<EntitySpan> {
        self.rules.extract(text)
    }

    /// All spans for a story: external model, rules, then source tags.
    /// An input-level refusal from the external model falls back to rules.
    fn collect_spans(
        &self,
        story: &Story,
        extractor: &dyn EntityExtractor,
    ) -> CoreResult<Vec<EntitySpan>> {
        let text = story.canonical_text();
        let mut spans = match extractor.extract_entities(&text) {
            Ok(spans) => spans,
            Err(e) if e.is_input_rejection() => {
                warn!(target: "impact", story = %story.id, reason = %e, "extractor refused story; rules only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        spans.extend(self.rules.extract(&text));

        let tag_spans = story
            .tags
            .tickers
            .iter()
            .map(|t| (t, EntityKind::Company))
            .chain(story.tags.sectors.iter().map(|s| (s, EntityKind::Sector)))
            .chain(story.tags.regulators.iter().map(|r| (r, EntityKind::Regulator)))
            .map(|(text, kind)| EntitySpan::new(text.as_str(), kind, 0, 0));
        spans.extend(tag_spans);

        let mut seen = HashSet::new();
        spans.retain(|s| seen.insert((s.kind, normalize_phrase(&s.text))));
        Ok(spans)
    }

    /// Ranked impacted tickers. No recognized entity yields an empty list.
    pub fn map_impact(
        &self,
        story: &Story,
        extractor: &dyn EntityExtractor,
    ) -> CoreResult<Vec<ImpactedStock>> {
        if story.id.trim().is_empty() {
            return Err(CoreError::invalid(story.headline.clone(), "story id is missing"));
        }
        let tables = &self.config.tables;
        let mut hits: BTreeMap<String, Hit> = BTreeMap::new();
        let mut unmapped = 0u64;

        for span in self.collect_spans(story, extractor)? {
            match span.kind {
                EntityKind::Company => match tables.resolve_company(&span.text) {
                    Some(ticker) => hits.entry(ticker.to_string()).or_default().add(
                        ImpactReason::DirectMention {
                            alias: span.text.trim().to_string(),
                        },
                    ),
                    None => unmapped += 1,
                },
                EntityKind::Sector => match tables.resolve_sector(&span.text) {
                    Some(sector) => {
                        for ticker in tables.sector_tickers(sector) {
                            hits.entry(ticker.clone()).or_default().add(ImpactReason::Sector {
                                sector: sector.to_string(),
                            });
                        }
                    }
                    None => unmapped += 1,
                },
                EntityKind::Regulator => match tables.resolve_regulator(&span.text) {
                    Some(regulator) => {
                        for sector in tables.regulator_sectors(regulator) {
                            for ticker in tables.sector_tickers(sector) {
                                hits.entry(ticker.clone()).or_default().add(
                                    ImpactReason::Regulator {
                                        regulator: regulator.to_string(),
                                        sector: sector.clone(),
                                    },
                                );
                            }
                        }
                    }
                    None => unmapped += 1,
                },
            }
        }

        let mut out: Vec<ImpactedStock> = hits
            .into_iter()
            .map(|(ticker, mut hit)| {
                hit.reasons.sort_by_key(ImpactReason::signal);
                ImpactedStock {
                    ticker,
                    confidence: hit.confidence,
                    reasons: hit.reasons,
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        if unmapped > 0 {
            debug!(target: "impact", story = %story.id, unmapped, "spans without a table entry");
            counter!("impact_unmapped_total").increment(unmapped);
        }
        counter!("impact_stocks_total").increment(out.len() as u64);
        Ok(out)
    }

    /// Story -> StoryWithImpact (impacts plus sentiment).
    pub fn enrich(
        &self,
        story: Story,
        extractor: &dyn EntityExtractor,
    ) -> CoreResult<StoryWithImpact> {
        let impacted = self.map_impact(&story, extractor)?;
        let (label, score) = self.sentiment.classify(&story.canonical_text());
        Ok(StoryWithImpact {
            story,
            impacted,
            sentiment: Some(label),
            sentiment_score: Some(score),
        })
    }

    /// Enrich a batch. Malformed stories are skipped and returned alongside;
    /// a systemic provider failure aborts.
    pub fn enrich_all(
        &self,
        stories: Vec<Story>,
        extractor: &dyn EntityExtractor,
    ) -> CoreResult<(Vec<StoryWithImpact>, Vec<CoreError>)> {
        let total = stories.len();
        let mut enriched = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        for story in stories {
            match self.enrich(story, extractor) {
                Ok(s) => enriched.push(s),
                Err(e @ CoreError::InvalidInput { .. }) => {
                    warn!(target: "impact", error = %e, "story skipped");
                    skipped.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            target: "impact",
            stories = total,
            enriched = enriched.len(),
            with_impact = enriched.iter().filter(|s| !s.impacted.is_empty()).count(),
            "batch mapped"
        );
        Ok((enriched, skipped))
    }
}
