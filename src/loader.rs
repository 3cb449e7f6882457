//! Turns enriched payloads into collections of validated runtime entities.
//!
//! [`CatalogLoader`] infers a schema from the payload it is about to load,
//! falls back to a caller-supplied table when inference fails or finds
//! nothing, builds the entity types through the sealed registry, and fills a
//! [`CatalogCollection`]. Collections track their own changes and write back
//! through a [`CatalogStore`] in the payload shape they were loaded from.

use crate::catalog::fields::field;
use crate::catalog::identity::EntityId;
use crate::catalog::schema::{
    CATEGORY_FIELD, DISPLAY_NAME_FIELD, ITEMS_FIELD, InferredSchema, infer_flat_schema,
    infer_grouped_schema, type_name_for_category,
};
use crate::entity::registry::MethodRegistry;
use crate::entity::{
    ENTITY_TYPE_FIELD, Entity, EntityType, EntityTypeDescriptor, Stocked, create_base_type,
    create_types_from_schemas,
};
use crate::error::{CatalogError, StoreError};
use crate::source::{FetchOptions, Fetchable};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upstream payload name for a catalog (`"menu"` -> `"menu.json"`).
pub fn payload_name(catalog: &str) -> String {
    format!("{catalog}.json")
}

/// Key/value persistence keyed by catalog name.
pub trait CatalogStore {
    /// Fails with [`StoreError::NotPopulated`] when `name` was never saved.
    fn get(&self, name: &str) -> Result<Value, StoreError>;
    fn save(&mut self, name: &str, data: Value) -> Result<()>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    catalogs: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }
}

impl CatalogStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Value, StoreError> {
        self.catalogs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotPopulated {
                name: name.to_string(),
            })
    }

    fn save(&mut self, name: &str, data: Value) -> Result<()> {
        self.catalogs.insert(name.to_string(), data);
        Ok(())
    }
}

/// Fill `store` from `sources`, fetching `<name>.json` for each catalog.
///
/// Catalogs already in the store are kept unless `force` is set. Stops at the
/// first failing source.
pub fn populate(
    store: &mut dyn CatalogStore,
    sources: &[(&str, &dyn Fetchable)],
    options: &FetchOptions,
    force: bool,
) -> Result<()> {
    for (name, source) in sources {
        if !force && store.contains(name) {
            debug!(catalog = name, "catalog already populated");
            continue;
        }
        let payload = source
            .fetch(&payload_name(name), options)
            .with_context(|| format!("fetching catalog '{name}'"))?;
        store.save(name, payload)?;
        info!(catalog = name, "populated catalog");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    Grouped,
    Flat,
}

/// Where a collection's schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    Inferred,
    Fallback,
    Fixed,
}

/// The types a collection's entities are built from.
#[derive(Debug, Clone)]
pub struct CatalogTypes {
    pub base: Option<Arc<EntityType>>,
    pub types: BTreeMap<String, Arc<EntityType>>,
    pub origin: SchemaOrigin,
}

impl CatalogTypes {
    pub fn get(&self, type_name: &str) -> Option<&Arc<EntityType>> {
        self.types
            .get(type_name)
            .or_else(|| self.base.as_ref().filter(|base| base.name() == type_name))
    }

    /// Shared base first, then each type by name.
    pub fn descriptors(&self) -> Vec<EntityTypeDescriptor> {
        self.base
            .iter()
            .chain(self.types.values())
            .map(|ty| ty.descriptor())
            .collect()
    }
}

/// Builds collections with the behavior held by one sealed registry.
pub struct CatalogLoader<'r> {
    registry: &'r MethodRegistry,
}

impl<'r> CatalogLoader<'r> {
    pub fn new(registry: &'r MethodRegistry) -> Self {
        Self { registry }
    }

    /// Types for a GROUPED payload; a non-empty common set becomes the
    /// `base_name` type every category inherits from.
    pub fn grouped_types(
        &self,
        sample: &Value,
        base_name: &str,
        fallback: &InferredSchema,
    ) -> Result<CatalogTypes> {
        let (schema, origin) = match infer_grouped_schema(sample) {
            Ok(schema) if !schema.is_empty() => (schema, SchemaOrigin::Inferred),
            Ok(_) => {
                debug!(base = base_name, "no categories to infer from; using fallback schema");
                (fallback.clone(), SchemaOrigin::Fallback)
            }
            Err(err) => {
                warn!(base = base_name, error = %err, "schema inference failed; using fallback schema");
                (fallback.clone(), SchemaOrigin::Fallback)
            }
        };

        let base = if schema.common.is_empty() {
            None
        } else {
            Some(create_base_type(
                self.registry,
                base_name,
                schema.common.iter().cloned(),
                None,
            )?)
        };
        let types = create_types_from_schemas(self.registry, &schema.specific, base.as_ref())?;
        Ok(CatalogTypes {
            base,
            types,
            origin,
        })
    }

    /// Types for a FLAT payload holding a single entity type.
    pub fn flat_types(
        &self,
        sample: &Value,
        type_name: &str,
        fallback: &BTreeMap<String, Vec<String>>,
    ) -> Result<CatalogTypes> {
        let (schemas, origin) = match infer_flat_schema(sample, type_name) {
            Ok(schemas) if !schemas.is_empty() => (schemas, SchemaOrigin::Inferred),
            Ok(_) => {
                debug!(entity_type = type_name, "empty sample; using fallback schema");
                (fallback.clone(), SchemaOrigin::Fallback)
            }
            Err(err) => {
                warn!(entity_type = type_name, error = %err, "schema inference failed; using fallback schema");
                (fallback.clone(), SchemaOrigin::Fallback)
            }
        };
        let types = create_types_from_schemas(self.registry, &schemas, None)?;
        Ok(CatalogTypes {
            base: None,
            types,
            origin,
        })
    }

    /// Types from a fixed table; the payload is never consulted.
    pub fn fixed_types(&self, schemas: &BTreeMap<String, Vec<String>>) -> Result<CatalogTypes> {
        let types = create_types_from_schemas(self.registry, schemas, None)?;
        Ok(CatalogTypes {
            base: None,
            types,
            origin: SchemaOrigin::Fixed,
        })
    }

    /// Load a GROUPED payload; categories without a matching type are skipped.
    pub fn load_grouped(
        &self,
        name: &str,
        payload: Value,
        base_name: &str,
        fallback: &InferredSchema,
    ) -> Result<CatalogCollection> {
        let types = self.grouped_types(&payload, base_name, fallback)?;
        let mut collection = CatalogCollection::new(name, PayloadShape::Grouped, types);
        for group in records(payload)? {
            let category = match field(&group, CATEGORY_FIELD) {
                Some(Value::String(category)) if !category.is_empty() => category.clone(),
                _ => continue,
            };
            let type_name = type_name_for_category(&category);
            let Some(ty) = collection.types.get(&type_name).cloned() else {
                debug!(catalog = name, category = %category, "skipping category without a type");
                continue;
            };
            let Some(Value::Array(items)) = field(&group, ITEMS_FIELD) else {
                continue;
            };
            for item in items {
                let entity = build_entity(&ty, item, name)?;
                collection.insert_loaded(entity);
            }
        }
        info!(catalog = name, entities = collection.len(), "loaded grouped catalog");
        Ok(collection)
    }

    /// Load a FLAT payload of `type_name` records, inferring the schema.
    pub fn load_flat(
        &self,
        name: &str,
        payload: Value,
        type_name: &str,
        fallback: &BTreeMap<String, Vec<String>>,
    ) -> Result<CatalogCollection> {
        let types = self.flat_types(&payload, type_name, fallback)?;
        self.fill_flat(name, payload, type_name, types)
    }

    /// Load a FLAT payload of `type_name` records against a fixed schema.
    pub fn load_fixed(
        &self,
        name: &str,
        payload: Value,
        type_name: &str,
        schemas: &BTreeMap<String, Vec<String>>,
    ) -> Result<CatalogCollection> {
        let types = self.fixed_types(schemas)?;
        self.fill_flat(name, payload, type_name, types)
    }

    fn fill_flat(
        &self,
        name: &str,
        payload: Value,
        type_name: &str,
        types: CatalogTypes,
    ) -> Result<CatalogCollection> {
        let ty = types
            .get(type_name)
            .cloned()
            .with_context(|| format!("schema for catalog '{name}' has no type '{type_name}'"))?;
        let mut collection = CatalogCollection::new(name, PayloadShape::Flat, types);
        for record in records(payload)? {
            let entity = build_entity(&ty, &Value::Object(record), name)?;
            collection.insert_loaded(entity);
        }
        info!(catalog = name, entities = collection.len(), "loaded flat catalog");
        Ok(collection)
    }
}

/// The object records of a list payload; null counts as empty.
fn records(payload: Value) -> Result<Vec<Map<String, Value>>, CatalogError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(CatalogError::DataShape {
                detail: "expected a list".to_string(),
            });
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(CatalogError::DataShape {
                detail: "record is not an object".to_string(),
            }),
        })
        .collect()
}

fn build_entity(ty: &Arc<EntityType>, item: &Value, catalog: &str) -> Result<Entity> {
    let record = item.as_object().ok_or_else(|| CatalogError::DataShape {
        detail: format!("item in catalog '{catalog}' is not an object"),
    })?;
    Ok(ty.from_map(record)?)
}

/// Equality filter over identity, discriminator or attributes.
pub type Criteria<'a> = [(&'a str, Value)];

/// Entities of one catalog keyed by identity, with change tracking.
#[derive(Debug, Clone)]
pub struct CatalogCollection {
    name: String,
    shape: PayloadShape,
    types: CatalogTypes,
    order: Vec<EntityId>,
    items: BTreeMap<EntityId, Entity>,
    dirty: bool,
}

/// Serializable overview of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub shape: PayloadShape,
    pub schema: SchemaOrigin,
    pub count: usize,
    pub dirty: bool,
    pub types: Vec<EntityTypeDescriptor>,
    pub categories: BTreeMap<String, usize>,
}

impl CatalogCollection {
    pub fn new(name: impl Into<String>, shape: PayloadShape, types: CatalogTypes) -> Self {
        Self {
            name: name.into(),
            shape,
            types,
            order: Vec::new(),
            items: BTreeMap::new(),
            dirty: false,
        }
    }

    fn insert_loaded(&mut self, entity: Entity) {
        let id = entity.id().clone();
        if self.items.insert(id.clone(), entity).is_some() {
            warn!(catalog = %self.name, id = %id, "duplicate identity; keeping the later record");
        } else {
            self.order.push(id);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    pub fn types(&self) -> &CatalogTypes {
        &self.types
    }

    /// The type entities of `type_name` are built from.
    pub fn entity_type(&self, type_name: &str) -> Option<&Arc<EntityType>> {
        self.types.get(type_name)
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.items.get(id)
    }

    /// Every entity in load/insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Entities whose values equal every criterion.
    pub fn find(&self, criteria: &Criteria<'_>) -> Vec<&Entity> {
        self.all()
            .filter(|entity| {
                criteria
                    .iter()
                    .all(|(key, value)| entity.value_of(key).as_ref() == Some(value))
            })
            .collect()
    }

    /// Entities whose discriminator matches `category` (`"salsa"` finds `Salsa`).
    pub fn by_category(&self, category: &str) -> Vec<&Entity> {
        let type_name = type_name_for_category(category);
        self.all()
            .filter(|entity| entity.entity_type() == type_name)
            .collect()
    }

    /// First entity named `name`, optionally within one category.
    pub fn find_by_name(&self, name: &str, category: Option<&str>) -> Option<&Entity> {
        let type_name = category.map(type_name_for_category);
        self.all().find(|entity| {
            entity.text(DISPLAY_NAME_FIELD) == Some(name)
                && type_name
                    .as_deref()
                    .is_none_or(|type_name| entity.entity_type() == type_name)
        })
    }

    /// Distinct discriminators in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entity in self.all() {
            if !seen.iter().any(|known| known == entity.entity_type()) {
                seen.push(entity.entity_type().to_string());
            }
        }
        seen
    }

    pub fn category_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for entity in self.all() {
            *stats.entry(entity.entity_type().to_string()).or_insert(0) += 1;
        }
        stats
    }

    /// Entities whose stock is known and at or below `threshold`.
    pub fn low_stock(&self, threshold: i64) -> Vec<&Entity> {
        self.all()
            .filter(|entity| entity.stock().is_some_and(|stock| stock <= threshold))
            .collect()
    }

    /// Fails when another entity of `category` (any category when `None`)
    /// is already named `name`; `exclude_id` skips the entity being updated.
    pub fn validate_unique_name(
        &self,
        name: &str,
        category: Option<&str>,
        exclude_id: Option<&str>,
    ) -> Result<()> {
        let type_name = category.map(type_name_for_category);
        self.reject_name_clash(name, type_name.as_deref(), exclude_id)
    }

    /// Names are unique per discriminator; entities without a name are exempt.
    fn ensure_unique_name(&self, entity: &Entity) -> Result<()> {
        match entity.text(DISPLAY_NAME_FIELD) {
            Some(name) => self.reject_name_clash(
                name,
                Some(entity.entity_type()),
                Some(entity.id().as_str()),
            ),
            None => Ok(()),
        }
    }

    fn reject_name_clash(
        &self,
        name: &str,
        type_name: Option<&str>,
        exclude_id: Option<&str>,
    ) -> Result<()> {
        let clash = self.all().find(|entity| {
            entity.text(DISPLAY_NAME_FIELD) == Some(name)
                && Some(entity.id().as_str()) != exclude_id
                && type_name.is_none_or(|type_name| entity.entity_type() == type_name)
        });
        if let Some(existing) = clash {
            bail!(
                "a {} named '{name}' already exists in catalog '{}' (id '{}')",
                existing.entity_type(),
                self.name,
                existing.id()
            );
        }
        Ok(())
    }

    /// Validate and insert a new entity; rejects an identity already present.
    pub fn add(&mut self, entity: Entity) -> Result<()> {
        if self.exists(entity.id().as_str()) {
            bail!(
                "entity with id '{}' already exists in catalog '{}'",
                entity.id(),
                self.name
            );
        }
        entity.validate()?;
        self.ensure_unique_name(&entity)?;
        self.order.push(entity.id().clone());
        self.items.insert(entity.id().clone(), entity);
        self.dirty = true;
        Ok(())
    }

    /// Validate and replace an existing entity with the same identity.
    pub fn update(&mut self, entity: Entity) -> Result<()> {
        if !self.exists(entity.id().as_str()) {
            bail!(
                "entity with id '{}' not found in catalog '{}'",
                entity.id(),
                self.name
            );
        }
        entity.validate()?;
        self.ensure_unique_name(&entity)?;
        self.items.insert(entity.id().clone(), entity);
        self.dirty = true;
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<Entity> {
        let Some(entity) = self.items.remove(id) else {
            bail!("entity with id '{id}' not found in catalog '{}'", self.name);
        };
        self.order.retain(|known| known.as_str() != id);
        self.dirty = true;
        Ok(entity)
    }

    /// Delete every entity matching `criteria`; returns how many were removed.
    pub fn delete_where(&mut self, criteria: &Criteria<'_>) -> usize {
        let doomed: Vec<EntityId> = self
            .find(criteria)
            .into_iter()
            .map(|entity| entity.id().clone())
            .collect();
        for id in &doomed {
            self.items.remove(id);
        }
        self.order.retain(|id| self.items.contains_key(id));
        if !doomed.is_empty() {
            self.dirty = true;
        }
        doomed.len()
    }

    pub fn delete_category(&mut self, category: &str) -> usize {
        let type_name = type_name_for_category(category);
        self.delete_where(&[(ENTITY_TYPE_FIELD, Value::String(type_name))])
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.order.clear();
            self.dirty = true;
        }
    }

    /// The collection in the shape it was loaded from.
    ///
    /// GROUPED output has one `{categoria, opciones}` record per discriminator,
    /// with the category lowercased.
    pub fn to_payload(&self) -> Value {
        match self.shape {
            PayloadShape::Flat => Value::Array(
                self.all()
                    .map(|entity| Value::Object(entity.to_map()))
                    .collect(),
            ),
            PayloadShape::Grouped => {
                let groups = self
                    .categories()
                    .into_iter()
                    .map(|category| {
                        let items: Vec<Value> = self
                            .all()
                            .filter(|entity| entity.entity_type() == category)
                            .map(|entity| Value::Object(entity.to_map()))
                            .collect();
                        json!({
                            CATEGORY_FIELD: category.to_lowercase(),
                            ITEMS_FIELD: items,
                        })
                    })
                    .collect();
                Value::Array(groups)
            }
        }
    }

    /// Persist pending changes; returns whether anything was written.
    pub fn flush(&mut self, store: &mut dyn CatalogStore) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        store
            .save(&self.name, self.to_payload())
            .with_context(|| format!("saving catalog '{}'", self.name))?;
        self.dirty = false;
        debug!(catalog = %self.name, entities = self.len(), "flushed catalog");
        Ok(true)
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.name.clone(),
            shape: self.shape,
            schema: self.types.origin,
            count: self.len(),
            dirty: self.dirty,
            types: self.types.descriptors(),
            categories: self.category_stats(),
        }
    }
}

impl fmt::Display for CatalogCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.dirty { " (*)" } else { "" };
        write!(
            f,
            "CatalogCollection(count={}, source='{}'{marker})",
            self.len(),
            self.name
        )
    }
}
