//! Decorators over [`Fetchable`] sources.
//!
//! Each adapter delegates the fetch to the source it wraps and applies one
//! transformation, returning a payload with the same shape contract so further
//! adapters can wrap it. Upstream errors pass through unmodified; adapters
//! never recover. The typical chain for a GROUPED catalog is identity ->
//! normalization -> default values; a dependent FLAT stream adds reference
//! resolution against the enriched catalog.

use crate::catalog::fields::{field, field_mut, resolve_key, value_text};
use crate::catalog::identity::{EntityId, IdentityFields, enrich_flat, enrich_grouped};
use crate::catalog::normalize::normalize_keys;
use crate::catalog::schema::{
    CATEGORY_FIELD, DISPLAY_NAME_FIELD, ITEMS_FIELD, type_name_for_category,
};
use crate::source::{FetchOptions, Fetchable};
use anyhow::Result;
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Which enrichment variant an [`IdentityAdapter`] applies; chosen by the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityLayout {
    Grouped,
    Flat { namespace_field: Option<String> },
}

/// Assigns deterministic identities to items that lack one.
pub struct IdentityAdapter<S> {
    inner: S,
    layout: IdentityLayout,
    fields: IdentityFields,
}

impl<S: Fetchable> IdentityAdapter<S> {
    pub fn grouped(inner: S) -> Self {
        Self::new(inner, IdentityLayout::Grouped)
    }

    pub fn flat(inner: S) -> Self {
        Self::new(
            inner,
            IdentityLayout::Flat {
                namespace_field: None,
            },
        )
    }

    pub fn new(inner: S, layout: IdentityLayout) -> Self {
        Self {
            inner,
            layout,
            fields: IdentityFields::default(),
        }
    }

    pub fn with_fields(mut self, fields: IdentityFields) -> Self {
        self.fields = fields;
        self
    }
}

impl<S: Fetchable> Fetchable for IdentityAdapter<S> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        let raw = self.inner.fetch(name, options)?;
        let (payload, modified) = match &self.layout {
            IdentityLayout::Grouped => enrich_grouped(raw, &self.fields)?,
            IdentityLayout::Flat { namespace_field } => {
                enrich_flat(raw, &self.fields, namespace_field.as_deref())?
            }
        };
        if modified {
            info!(payload = name, "assigned stable identities");
        }
        Ok(payload)
    }
}

/// Lowercases and strips diacritics from every key of the payload.
pub struct KeyNormalizationAdapter<S> {
    inner: S,
}

impl<S: Fetchable> KeyNormalizationAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Fetchable> Fetchable for KeyNormalizationAdapter<S> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        let raw = self.inner.fetch(name, options)?;
        debug!(payload = name, "normalized keys");
        Ok(normalize_keys(raw))
    }
}

/// Injects a default for `field` into every grouped item that lacks it.
///
/// Per-category defaults are looked up by lowercased category name and fall
/// back to the global default. Existing values, including explicit nulls, are
/// never overwritten. Payloads that are not a list pass through unchanged.
pub struct DefaultValueAdapter<S> {
    inner: S,
    field: String,
    default: Value,
    by_category: BTreeMap<String, Value>,
}

impl<S: Fetchable> DefaultValueAdapter<S> {
    pub fn new(inner: S, field: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            inner,
            field: field.into(),
            default: default.into(),
            by_category: BTreeMap::new(),
        }
    }

    pub fn with_category_defaults<I, K, V>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (category, value) in defaults {
            self.by_category
                .insert(category.as_ref().to_lowercase(), value.into());
        }
        self
    }

    fn default_for(&self, category: &str) -> &Value {
        self.by_category
            .get(&category.to_lowercase())
            .unwrap_or(&self.default)
    }

    fn fill_group(&self, group: &mut Map<String, Value>) {
        let category = field(group, CATEGORY_FIELD)
            .map(value_text)
            .unwrap_or_default();
        let value = self.default_for(&category).clone();
        let Some(Value::Array(items)) = field_mut(group, ITEMS_FIELD) else {
            return;
        };
        for item in items.iter_mut() {
            if let Value::Object(item) = item {
                if !item.contains_key(&self.field) {
                    item.insert(self.field.clone(), value.clone());
                }
            }
        }
    }
}

impl<S: Fetchable> Fetchable for DefaultValueAdapter<S> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        let mut payload = self.inner.fetch(name, options)?;
        if let Value::Array(groups) = &mut payload {
            for group in groups.iter_mut() {
                if let Value::Object(group) = group {
                    self.fill_group(group);
                }
            }
            debug!(payload = name, field = %self.field, "injected default values");
        }
        Ok(payload)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    /// A single name; an unresolved name becomes null, an explicit null stays null.
    Single,
    /// A list of names; unresolved names are dropped from the list.
    List,
}

/// A dependent-record field that names items of a reference category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceField {
    pub field: String,
    pub category: String,
    pub kind: ReferenceKind,
}

impl ReferenceField {
    pub fn single(field: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            category: category.into(),
            kind: ReferenceKind::Single,
        }
    }

    pub fn list(field: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            category: category.into(),
            kind: ReferenceKind::List,
        }
    }
}

/// `(category, name) -> identity` table built from a reference catalog.
///
/// Category keys go through [`type_name_for_category`] on both insert and
/// lookup, so `"pan"`, `"Pan"` and `"PAN"` name the same category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceLookup {
    by_category: BTreeMap<String, BTreeMap<String, EntityId>>,
}

impl ReferenceLookup {
    /// Build from a GROUPED payload or a `{category: [items]}` map; items
    /// without both an identity and a display name are ignored.
    pub fn from_payload(payload: &Value) -> Self {
        let mut lookup = Self::default();
        match payload {
            Value::Array(groups) => {
                for group in groups.iter().filter_map(Value::as_object) {
                    let Some(Value::String(category)) = field(group, CATEGORY_FIELD) else {
                        continue;
                    };
                    if category.is_empty() {
                        continue;
                    }
                    let Some(Value::Array(items)) = field(group, ITEMS_FIELD) else {
                        continue;
                    };
                    lookup.add_items(category, items);
                }
            }
            Value::Object(categories) => {
                for (category, items) in categories {
                    if let Value::Array(items) = items {
                        lookup.add_items(category, items);
                    }
                }
            }
            _ => {}
        }
        lookup
    }

    fn add_items(&mut self, category: &str, items: &[Value]) {
        let names = self.by_category.entry(type_name_for_category(category)).or_default();
        for item in items.iter().filter_map(Value::as_object) {
            if let (Some(id), Some(name)) = (item.get("id"), item.get(DISPLAY_NAME_FIELD)) {
                names.insert(value_text(name), EntityId(value_text(id)));
            }
        }
    }

    pub fn resolve(&self, category: &str, name: &str) -> Option<&EntityId> {
        self.by_category.get(&type_name_for_category(category))?.get(name)
    }

    /// `{id, nombre}` pointer for `name`, if it resolves.
    pub fn reference(&self, category: &str, name: &str) -> Option<Value> {
        self.resolve(category, name)
            .map(|id| json!({"id": id.as_str(), DISPLAY_NAME_FIELD: name}))
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rewrites named references in dependent records into `{id, nombre}` pointers.
///
/// The reference catalog is fetched once, on first use, and the lookup is kept
/// for the adapter's lifetime; build a fresh adapter to observe a reload.
/// Names missing from the lookup are dropped rather than reported.
pub struct ReferenceAdapter<S, R> {
    inner: S,
    reference: R,
    reference_name: String,
    fields: Vec<ReferenceField>,
    lookup: OnceCell<ReferenceLookup>,
}

impl<S: Fetchable, R: Fetchable> ReferenceAdapter<S, R> {
    pub fn new(
        inner: S,
        reference: R,
        reference_name: impl Into<String>,
        fields: Vec<ReferenceField>,
    ) -> Self {
        Self {
            inner,
            reference,
            reference_name: reference_name.into(),
            fields,
            lookup: OnceCell::new(),
        }
    }

    fn lookup(&self, options: &FetchOptions) -> Result<&ReferenceLookup> {
        self.lookup.get_or_try_init(|| {
            let payload = self.reference.fetch(&self.reference_name, options)?;
            let lookup = ReferenceLookup::from_payload(&payload);
            info!(
                reference = %self.reference_name,
                entries = lookup.len(),
                "built reference lookup"
            );
            Ok(lookup)
        })
    }

    fn rewrite_record(&self, lookup: &ReferenceLookup, record: Value) -> Value {
        let Value::Object(mut record) = record else {
            return record;
        };
        for spec in &self.fields {
            let Some(key) = resolve_key(&record, &spec.field).map(str::to_string) else {
                continue;
            };
            let replacement = match (spec.kind, &record[&key]) {
                (ReferenceKind::Single, Value::String(name)) => {
                    Some(self.resolve_one(lookup, spec, name).unwrap_or(Value::Null))
                }
                (ReferenceKind::List, Value::Array(names)) if names.iter().all(Value::is_string) => {
                    let resolved = names
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(|name| self.resolve_one(lookup, spec, name))
                        .collect();
                    Some(Value::Array(resolved))
                }
                _ => None,
            };
            if let Some(value) = replacement {
                record.insert(key, value);
            }
        }
        Value::Object(record)
    }

    fn resolve_one(&self, lookup: &ReferenceLookup, spec: &ReferenceField, name: &str) -> Option<Value> {
        let reference = lookup.reference(&spec.category, name);
        if reference.is_none() {
            warn!(
                field = %spec.field,
                category = %spec.category,
                item = name,
                "dropping unresolved reference"
            );
        }
        reference
    }
}

impl<S: Fetchable, R: Fetchable> Fetchable for ReferenceAdapter<S, R> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        let lookup = self.lookup(options)?;
        let payload = self.inner.fetch(name, options)?;
        Ok(match payload {
            Value::Array(records) => Value::Array(
                records
                    .into_iter()
                    .map(|record| self.rewrite_record(lookup, record))
                    .collect(),
            ),
            Value::Object(sections) => Value::Object(
                sections
                    .into_iter()
                    .map(|(key, value)| match value {
                        Value::Array(records) => (
                            key,
                            Value::Array(
                                records
                                    .into_iter()
                                    .map(|record| self.rewrite_record(lookup, record))
                                    .collect(),
                            ),
                        ),
                        other => (key, other),
                    })
                    .collect(),
            ),
            other => other,
        })
    }
}
