// src/providers/rule_ner.rs
//! Rule-based entity extractor compiled from the rule tables.
//!
//! Every alias, sector keyword and regulator alias becomes part of one
//! word-bounded alternation per entity kind (longest phrase first).
//! Short all-caps forms such as `HDFC`, `RBI` or `IT` are matched
//! case-sensitively so that the pronoun "it" never reads as the IT sector.

use regex::Regex;

use super::{EntityExtractor, EntityKind, EntitySpan};
use crate::config::RuleTables;
use crate::error::{CoreError, CoreResult, ProviderError};

const ACRONYM_MAX_LEN: usize = 5;

#[derive(Debug)]
struct KindPatterns {
    kind: EntityKind,
    regexes: Vec<Regex>,
}

#[derive(Debug)]
pub struct RuleExtractor {
    kinds: Vec<KindPatterns>,
}

/// `HDFC`, `RBI`, `IT`: short, no whitespace, every letter uppercase.
fn is_acronym(phrase: &str) -> bool {
    let p = phrase.trim();
    p.chars().count() <= ACRONYM_MAX_LEN
        && !p.contains(char::is_whitespace)
        && p.chars().any(|c| c.is_alphabetic())
        && p.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

fn alternation(mut phrases: Vec<&str>, case_insensitive: bool) -> CoreResult<Option<Regex>> {
    phrases.retain(|p| !p.trim().is_empty());
    if phrases.is_empty() {
        return Ok(None);
    }
    // Longest first so "HDFC Bank" wins over "HDFC" at the same offset.
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    phrases.dedup();
    let body = phrases
        .iter()
        .map(|p| {
            p.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!(r"{flags}\b(?:{body})\b"))
        .map(Some)
        .map_err(|e| CoreError::config(format!("entity pattern: {e}")))
}

fn compile(kind: EntityKind, phrases: Vec<&str>) -> CoreResult<KindPatterns> {
    let (exact, loose): (Vec<&str>, Vec<&str>) = phrases.into_iter().partition(|p| is_acronym(p));
    let regexes = [alternation(exact, false)?, alternation(loose, true)?]
        .into_iter()
        .flatten()
        .collect();
    Ok(KindPatterns { kind, regexes })
}

impl RuleExtractor {
    pub fn from_tables(tables: &RuleTables) -> CoreResult<Self> {
        let companies = tables
            .company_aliases()
            .map(|(alias, _)| alias)
            .chain(tables.tickers())
            .collect();
        let sectors = tables.sector_keywords().map(|(kw, _)| kw).collect();
        let regulators = tables.regulator_aliases().map(|(a, _)| a).collect();

        Ok(Self {
            kinds: vec![
                compile(EntityKind::Company, companies)?,
                compile(EntityKind::Sector, sectors)?,
                compile(EntityKind::Regulator, regulators)?,
            ],
        })
    }

    /// Spans for every table phrase found in `text`, ordered by offset.
    pub fn extract(&self, text: &str) -> Vec<EntitySpan> {
        let mut spans: Vec<EntitySpan> = Vec::new();
        for kp in &self.kinds {
            for re in &kp.regexes {
                spans.extend(
                    re.find_iter(text)
                        .map(|m| EntitySpan::new(m.as_str(), kp.kind, m.start(), m.end())),
                );
            }
        }
        drop_nested(&mut spans);
        spans.sort_by(|a, b| (a.start, a.end, a.kind).cmp(&(b.start, b.end, b.kind)));
        spans.dedup_by(|a, b| a.start == b.start && a.end == b.end && a.kind == b.kind);
        spans
    }
}

/// Remove spans strictly inside a longer span of the same kind.
fn drop_nested(spans: &mut Vec<EntitySpan>) {
    let snapshot = spans.clone();
    spans.retain(|s| {
        !snapshot.iter().any(|o| {
            o.kind == s.kind
                && o.start <= s.start
                && o.end >= s.end
                && (o.end - o.start) > (s.end - s.start)
        })
    });
}

impl EntityExtractor for RuleExtractor {
    fn name(&self) -> &str {
        "rules"
    }

    fn extract_entities(&self, text: &str) -> Result<Vec<EntitySpan>, ProviderError> {
        Ok(self.extract(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsConfig;

    fn extractor() -> RuleExtractor {
        let cfg = NewsConfig::builtin().unwrap();
        RuleExtractor::from_tables(&cfg.tables).unwrap()
    }

    fn kinds_and_text(spans: &[EntitySpan]) -> Vec<(EntityKind, String)> {
        spans.iter().map(|s| (s.kind, s.text.clone())).collect()
    }

    #[test]
    fn acronym_detection() {
        assert!(is_acronym("RBI"));
        assert!(is_acronym("IT"));
        assert!(!is_acronym("Infosys"));
        assert!(!is_acronym("HDFCBANK"));
        assert!(!is_acronym("HDFC Bank"));
    }

    #[test]
    fn longest_alias_wins() {
        let spans = extractor().extract("HDFC Bank declares dividend");
        assert_eq!(
            kinds_and_text(&spans),
            vec![(EntityKind::Company, "HDFC Bank".to_string())]
        );
        assert_eq!((spans[0].start, spans[0].end), (0, 9));
    }

    #[test]
    fn it_sector_needs_uppercase() {
        let ex = extractor();
        assert!(ex
            .extract("Analysts said it was a quiet session")
            .iter()
            .all(|s| s.kind != EntityKind::Sector));
        let spans = ex.extract("IT stocks rally on deal wins");
        assert!(spans
            .iter()
            .any(|s| s.kind == EntityKind::Sector && s.text == "IT"));
    }

    #[test]
    fn regulator_and_sector_phrases() {
        let spans = extractor().extract("Reserve Bank of India review weighs on the banking sector");
        let got = kinds_and_text(&spans);
        assert!(got.contains(&(EntityKind::Regulator, "Reserve Bank of India".to_string())));
        assert!(got.contains(&(EntityKind::Sector, "banking".to_string())));
        assert!(got.iter().all(|(k, _)| *k != EntityKind::Company));
    }

    #[test]
    fn tickers_match_as_words() {
        let spans = extractor().extract("INFY and hdfcbank were the top movers");
        let got = kinds_and_text(&spans);
        assert!(got.contains(&(EntityKind::Company, "INFY".to_string())));
        assert!(got.contains(&(EntityKind::Company, "hdfcbank".to_string())));
    }
}
