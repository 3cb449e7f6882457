//! Environment-driven settings for building catalog pipelines.
//!
//! Every value has a default, so an empty environment yields a working
//! configuration. The source directory falls back to the hint `build.rs`
//! bakes in, then to `./data`. Tests go through [`CatalogConfig::from_lookup`]
//! instead of mutating the process environment.

use crate::source::FetchOptions;
use crate::split_list;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const SOURCE_DIR_ENV: &str = "CATALOG_SOURCE_DIR";
pub const DEFAULT_STOCK_ENV: &str = "CATALOG_DEFAULT_STOCK";
pub const STOCK_BY_CATEGORY_ENV: &str = "CATALOG_STOCK_BY_CATEGORY";
pub const FETCH_TIMEOUT_ENV: &str = "CATALOG_FETCH_TIMEOUT_SECS";

const DEFAULT_STOCK: i64 = 50;
const DEFAULT_STOCK_BY_CATEGORY: &str = "pan=100 salchicha=75 toppings=200 salsa=150 acompañante=80";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Directory holding the raw payload files.
    pub source_dir: PathBuf,
    /// Stock injected into items of categories without their own default.
    pub default_stock: i64,
    /// Per-category stock defaults, keyed by lowercased category name.
    pub stock_by_category: BTreeMap<String, i64>,
    pub fetch_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            default_stock: DEFAULT_STOCK,
            stock_by_category: parse_stock_table(DEFAULT_STOCK_BY_CATEGORY).unwrap_or_default(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = read(SOURCE_DIR_ENV) {
            config.source_dir = PathBuf::from(dir);
        }
        if let Some(value) = read(DEFAULT_STOCK_ENV) {
            config.default_stock = value
                .trim()
                .parse()
                .with_context(|| format!("{DEFAULT_STOCK_ENV} must be an integer, got '{value}'"))?;
        }
        if let Some(value) = read(STOCK_BY_CATEGORY_ENV) {
            config.stock_by_category = parse_stock_table(&value)
                .with_context(|| format!("parsing {STOCK_BY_CATEGORY_ENV}"))?;
        }
        if let Some(value) = read(FETCH_TIMEOUT_ENV) {
            let secs: u64 = value.trim().parse().with_context(|| {
                format!("{FETCH_TIMEOUT_ENV} must be a whole number of seconds, got '{value}'")
            })?;
            config.fetch_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::with_timeout(self.fetch_timeout)
    }
}

fn default_source_dir() -> PathBuf {
    option_env!("CATALOG_SOURCE_DIR_HINT")
        .filter(|hint| !hint.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Parse `category=value` pairs separated by commas or whitespace.
fn parse_stock_table(value: &str) -> Result<BTreeMap<String, i64>> {
    let mut table = BTreeMap::new();
    for entry in split_list(value) {
        let Some((category, stock)) = entry.split_once('=') else {
            bail!("expected category=value, got '{entry}'");
        };
        let category = category.trim();
        if category.is_empty() {
            bail!("missing category name in '{entry}'");
        }
        let stock: i64 = stock
            .trim()
            .parse()
            .with_context(|| format!("stock for '{category}' must be an integer"))?;
        table.insert(category.to_lowercase(), stock);
    }
    Ok(table)
}
