//! Catalog ingestion core for the hot-dog shop.
//!
//! Raw JSON payloads travel from a [`source::Fetchable`] through a chain of
//! adapters (identity, key normalization, defaults, reference resolution) into
//! a [`loader::CatalogStore`]. The [`loader::CatalogLoader`] then infers a
//! schema from each stored payload and builds runtime [`entity::EntityType`]s
//! whose behavior comes from a sealed [`entity::MethodRegistry`]. The helper
//! binaries under `src/bin` are thin wrappers over these modules.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

pub mod catalog;
pub mod config;
pub mod domain;
pub mod entity;
pub mod error;
pub mod loader;
pub mod source;

pub use catalog::{
    EntityId, IdentityFields, InferredSchema, assign_identity, enrich_flat, enrich_grouped,
    infer_flat_schema, infer_grouped_schema, normalize_key, normalize_keys,
};
pub use config::CatalogConfig;
pub use entity::{
    Entity, EntityType, EntityTypeDescriptor, MethodRegistry, Stocked, create_base_type,
    create_entity_type, create_types_from_schemas,
};
pub use error::{CatalogError, EntityError, RegistryError, StoreError, ValidationError};
pub use loader::{
    CatalogCollection, CatalogLoader, CatalogStore, CollectionSummary, MemoryStore,
    PayloadShape, SchemaOrigin, populate,
};
pub use source::{DirectorySource, FetchOptions, Fetchable, StaticSource};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

/// Install the stderr `tracing` subscriber used by the binaries.
///
/// `RUST_LOG` overrides the default `info` filter. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Split comma- or whitespace-delimited configuration lists into tokens.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a payload from stdin, accepting a JSON document or NDJSON.
///
/// Empty input is an error. A single JSON document (list or object) is
/// returned as-is; otherwise every non-blank line must be a JSON value and the
/// lines are collected into a list.
pub fn parse_payload(input: &str) -> Result<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("No input provided on stdin");
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(_) | Value::Object(_) => Ok(value),
            _ => bail!("Unsupported JSON input; expected object or array"),
        };
    }

    let mut records = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line)
            .with_context(|| format!("Unable to parse JSON from line {}", idx + 1))?;
        records.push(record);
    }

    if records.is_empty() {
        bail!("No JSON records found in input stream");
    }

    Ok(Value::Array(records))
}
