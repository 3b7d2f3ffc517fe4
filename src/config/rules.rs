// src/config/rules.rs
//! Static rule tables: company aliases, sector membership, regulator reach.
//!
//! TOML shape:
//! ```toml
//! [companies.HDFCBANK]
//! name = "HDFC Bank"
//! aliases = ["HDFC Bank", "HDFC"]
//!
//! [sectors.Banking]
//! tickers = ["HDFCBANK"]
//! keywords = ["banking", "banks"]
//!
//! [regulators.RBI]
//! aliases = ["RBI", "Reserve Bank of India"]
//! sectors = ["Banking"]
//! ```
//!
//! Lookups are case-insensitive on whitespace-condensed text. The tables are
//! validated as a whole; a malformed table is never partially applied.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, CoreResult};
use crate::text::normalize_phrase;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompanyCfg {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectorCfg {
    pub tickers: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegulatorCfg {
    #[serde(default)]
    pub aliases: Vec<String>,
    pub sectors: Vec<String>,
}

/// Raw tables as deserialized, before validation and indexing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleTablesCfg {
    #[serde(default)]
    pub companies: BTreeMap<String, CompanyCfg>,
    #[serde(default)]
    pub sectors: BTreeMap<String, SectorCfg>,
    #[serde(default)]
    pub regulators: BTreeMap<String, RegulatorCfg>,
}

/// Validated, indexed rule tables. Immutable; share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RuleTables {
    cfg: RuleTablesCfg,
    /// normalized alias (or ticker) -> ticker
    company_index: HashMap<String, String>,
    /// normalized sector name or keyword -> canonical sector
    sector_index: HashMap<String, String>,
    /// normalized regulator name or alias -> canonical regulator
    regulator_index: HashMap<String, String>,
}

const COMPANY_SUFFIXES: &[&str] = &["ltd", "ltd.", "limited", "inc", "inc.", "plc", "corp", "corp."];

impl RuleTables {
    pub fn from_cfg(cfg: RuleTablesCfg) -> CoreResult<Self> {
        if cfg.companies.is_empty() {
            return Err(CoreError::config("company alias table is empty"));
        }
        if cfg.sectors.is_empty() {
            return Err(CoreError::config("sector table is empty"));
        }
        if cfg.regulators.is_empty() {
            return Err(CoreError::config("regulator table is empty"));
        }

        let mut company_index = HashMap::new();
        for (ticker, c) in &cfg.companies {
            if ticker.trim().is_empty() || ticker != ticker.trim() {
                return Err(CoreError::config(format!("invalid ticker key `{ticker}`")));
            }
            if c.name.trim().is_empty() {
                return Err(CoreError::config(format!("company `{ticker}` has no name")));
            }
            let names = std::iter::once(ticker.as_str())
                .chain(std::iter::once(c.name.as_str()))
                .chain(c.aliases.iter().map(String::as_str));
            for alias in names {
                let key = normalize_phrase(alias);
                if key.is_empty() {
                    return Err(CoreError::config(format!(
                        "company `{ticker}` has an empty alias"
                    )));
                }
                match company_index.get(&key) {
                    Some(other) if other != ticker => {
                        return Err(CoreError::config(format!(
                            "alias `{alias}` maps to both `{other}` and `{ticker}`"
                        )));
                    }
                    _ => {
                        company_index.insert(key, ticker.clone());
                    }
                }
            }
        }

        let mut sector_index = HashMap::new();
        for (sector, s) in &cfg.sectors {
            if s.tickers.is_empty() {
                return Err(CoreError::config(format!("sector `{sector}` lists no tickers")));
            }
            if let Some(t) = s.tickers.iter().find(|t| !cfg.companies.contains_key(*t)) {
                return Err(CoreError::config(format!(
                    "sector `{sector}` references unknown ticker `{t}`"
                )));
            }
            for kw in std::iter::once(sector).chain(s.keywords.iter()) {
                let key = normalize_phrase(kw);
                if key.is_empty() {
                    return Err(CoreError::config(format!(
                        "sector `{sector}` has an empty keyword"
                    )));
                }
                match sector_index.get(&key) {
                    Some(other) if other != sector => {
                        return Err(CoreError::config(format!(
                            "keyword `{kw}` maps to both sectors `{other}` and `{sector}`"
                        )));
                    }
                    _ => {
                        sector_index.insert(key, sector.clone());
                    }
                }
            }
        }

        let mut regulator_index = HashMap::new();
        for (reg, r) in &cfg.regulators {
            if r.sectors.is_empty() {
                return Err(CoreError::config(format!("regulator `{reg}` affects no sectors")));
            }
            if let Some(s) = r.sectors.iter().find(|s| !cfg.sectors.contains_key(*s)) {
                return Err(CoreError::config(format!(
                    "regulator `{reg}` references unknown sector `{s}`"
                )));
            }
            for alias in std::iter::once(reg).chain(r.aliases.iter()) {
                let key = normalize_phrase(alias);
                if key.is_empty() {
                    return Err(CoreError::config(format!(
                        "regulator `{reg}` has an empty alias"
                    )));
                }
                match regulator_index.get(&key) {
                    Some(other) if other != reg => {
                        return Err(CoreError::config(format!(
                            "alias `{alias}` maps to both regulators `{other}` and `{reg}`"
                        )));
                    }
                    _ => {
                        regulator_index.insert(key, reg.clone());
                    }
                }
            }
        }

        // A phrase may name only one kind of entity.
        for key in sector_index.keys().chain(regulator_index.keys()) {
            if let Some(ticker) = company_index.get(key) {
                return Err(CoreError::config(format!(
                    "`{key}` is both a company alias of `{ticker}` and a sector or regulator alias"
                )));
            }
        }
        if let Some((key, sector)) = sector_index
            .iter()
            .find(|(k, _)| regulator_index.contains_key(*k))
        {
            return Err(CoreError::config(format!(
                "`{key}` is both a keyword of sector `{sector}` and a regulator alias"
            )));
        }

        Ok(Self {
            cfg,
            company_index,
            sector_index,
            regulator_index,
        })
    }

    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let cfg: RuleTablesCfg =
            toml::from_str(s).map_err(|e| CoreError::config(format!("rule tables: {e}")))?;
        Self::from_cfg(cfg)
    }

    pub fn raw(&self) -> &RuleTablesCfg {
        &self.cfg
    }

    /// Resolve a company mention or ticker to its ticker.
    /// Falls back to stripping a trailing legal suffix ("Ltd", "Limited").
    pub fn resolve_company(&self, mention: &str) -> Option<&str> {
        let key = normalize_phrase(mention);
        if let Some(t) = self.company_index.get(&key) {
            return Some(t.as_str());
        }
        let stripped = key
            .rsplit_once(' ')
            .filter(|(_, last)| COMPANY_SUFFIXES.contains(last))
            .map(|(head, _)| head)?;
        self.company_index.get(stripped).map(String::as_str)
    }

    /// Canonical sector for a sector name or keyword.
    pub fn resolve_sector(&self, mention: &str) -> Option<&str> {
        self.sector_index
            .get(&normalize_phrase(mention))
            .map(String::as_str)
    }

    /// Canonical regulator for a regulator name or alias.
    pub fn resolve_regulator(&self, mention: &str) -> Option<&str> {
        self.regulator_index
            .get(&normalize_phrase(mention))
            .map(String::as_str)
    }

    pub fn is_ticker(&self, s: &str) -> bool {
        self.cfg.companies.contains_key(s.trim())
    }

    pub fn company_name(&self, ticker: &str) -> Option<&str> {
        self.cfg.companies.get(ticker).map(|c| c.name.as_str())
    }

    pub fn sector_tickers(&self, sector: &str) -> &[String] {
        self.cfg
            .sectors
            .get(sector)
            .map(|s| s.tickers.as_slice())
            .unwrap_or(&[])
    }

    pub fn regulator_sectors(&self, regulator: &str) -> &[String] {
        self.cfg
            .regulators
            .get(regulator)
            .map(|r| r.sectors.as_slice())
            .unwrap_or(&[])
    }

    /// (alias, ticker) pairs including tickers and display names.
    pub fn company_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cfg.companies.iter().flat_map(|(ticker, c)| {
            std::iter::once(c.name.as_str())
                .chain(c.aliases.iter().map(String::as_str))
                .map(move |a| (a, ticker.as_str()))
        })
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.cfg.companies.keys().map(String::as_str)
    }

    /// (keyword, sector) pairs including the sector names.
    pub fn sector_keywords(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cfg.sectors.iter().flat_map(|(name, s)| {
            std::iter::once(name.as_str())
                .chain(s.keywords.iter().map(String::as_str))
                .map(move |k| (k, name.as_str()))
        })
    }

    /// (alias, regulator) pairs including the regulator names.
    pub fn regulator_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cfg.regulators.iter().flat_map(|(name, r)| {
            std::iter::once(name.as_str())
                .chain(r.aliases.iter().map(String::as_str))
                .map(move |a| (a, name.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLES: &str = r#"
[companies.HDFCBANK]
name = "HDFC Bank"
aliases = ["HDFC"]

[companies.ICICIBANK]
name = "ICICI Bank"

[sectors.Banking]
tickers = ["HDFCBANK", "ICICIBANK"]
keywords = ["banks"]

[regulators.RBI]
aliases = ["Reserve Bank of India"]
sectors = ["Banking"]
"#;

    #[test]
    fn resolves_aliases_case_insensitively() {
        let t = RuleTables::from_toml_str(TABLES).unwrap();
        assert_eq!(t.resolve_company("hdfc   bank"), Some("HDFCBANK"));
        assert_eq!(t.resolve_company("HDFCBANK"), Some("HDFCBANK"));
        assert_eq!(t.resolve_company("ICICI Bank Ltd"), Some("ICICIBANK"));
        assert_eq!(t.resolve_company("Yes Bank"), None);
        assert_eq!(t.resolve_sector("BANKS"), Some("Banking"));
        assert_eq!(t.resolve_regulator("reserve bank of india"), Some("RBI"));
        assert_eq!(t.sector_tickers("Banking").len(), 2);
        assert_eq!(t.regulator_sectors("RBI"), &["Banking".to_string()]);
    }

    #[test]
    fn unknown_sector_reference_is_fatal() {
        let bad = TABLES.replace(r#"sectors = ["Banking"]"#, r#"sectors = ["Insurance"]"#);
        let err = RuleTables::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("unknown sector `Insurance`"));
    }

    #[test]
    fn unknown_sector_ticker_is_fatal() {
        let bad = TABLES.replace(r#"["HDFCBANK", "ICICIBANK"]"#, r#"["HDFCBANK", "YESBANK"]"#);
        assert!(matches!(
            RuleTables::from_toml_str(&bad),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn conflicting_alias_is_fatal() {
        let bad = TABLES.replace(r#"name = "ICICI Bank""#, "name = \"ICICI Bank\"\naliases = [\"HDFC\"]");
        let err = RuleTables::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("maps to both"));
    }

    #[test]
    fn shared_regulator_alias_is_fatal() {
        let bad = format!(
            "{TABLES}\n[regulators.SEBI]\naliases = [\"Reserve Bank of India\"]\nsectors = [\"Banking\"]\n"
        );
        let err = RuleTables::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("maps to both regulators"), "{err}");
    }

    #[test]
    fn alias_in_two_tables_is_fatal() {
        let company_and_sector = TABLES.replace(r#"keywords = ["banks"]"#, r#"keywords = ["banks", "hdfc"]"#);
        let err = RuleTables::from_toml_str(&company_and_sector).unwrap_err();
        assert!(err.to_string().contains("company alias of `HDFCBANK`"), "{err}");

        let sector_and_regulator = TABLES.replace(
            r#"aliases = ["Reserve Bank of India"]"#,
            r#"aliases = ["Reserve Bank of India", "Banks"]"#,
        );
        let err = RuleTables::from_toml_str(&sector_and_regulator).unwrap_err();
        assert!(err.to_string().contains("regulator alias"), "{err}");
    }

    #[test]
    fn missing_tables_are_fatal() {
        assert!(RuleTables::from_toml_str("").is_err());
        assert!(RuleTables::from_toml_str("companies = 3").is_err());
    }
}
