//! Builds [`EntityType`]s from attribute lists and registered behavior.
//!
//! Types may only be built once the registry is sealed, so no type can miss a
//! registration that arrives later. A registered validator is composed with
//! its base type's validator, base first, unless the base is the universal
//! root; a type without a registered validator inherits its base's unchanged.

use crate::entity::registry::{MethodRegistry, Validator};
use crate::entity::{Entity, EntityType};
use crate::error::RegistryError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Build `type_name` over `base` (the root when `None`) with its registered
/// methods and composed validator.
pub fn create_entity_type<I>(
    registry: &MethodRegistry,
    type_name: &str,
    attributes: I,
    base: Option<&Arc<EntityType>>,
) -> Result<Arc<EntityType>, RegistryError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    build(registry, type_name, attributes, base, true)
}

/// Build an intermediate shared base type: validator only, no methods.
pub fn create_base_type<I>(
    registry: &MethodRegistry,
    type_name: &str,
    common_attributes: I,
    base: Option<&Arc<EntityType>>,
) -> Result<Arc<EntityType>, RegistryError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    build(registry, type_name, common_attributes, base, false)
}

/// Build one type per `{type_name: attributes}` entry, all over `base`.
pub fn create_types_from_schemas(
    registry: &MethodRegistry,
    schemas: &BTreeMap<String, Vec<String>>,
    base: Option<&Arc<EntityType>>,
) -> Result<BTreeMap<String, Arc<EntityType>>, RegistryError> {
    schemas
        .iter()
        .map(|(type_name, attributes)| {
            let ty = create_entity_type(registry, type_name, attributes.iter().cloned(), base)?;
            Ok((type_name.clone(), ty))
        })
        .collect()
}

fn build<I>(
    registry: &MethodRegistry,
    type_name: &str,
    attributes: I,
    base: Option<&Arc<EntityType>>,
    with_methods: bool,
) -> Result<Arc<EntityType>, RegistryError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    if !registry.is_sealed() {
        return Err(RegistryError::NotSealed {
            type_name: type_name.to_string(),
        });
    }
    let base = base.cloned().unwrap_or_else(EntityType::root);
    let methods = if with_methods {
        registry.methods(type_name)
    } else {
        BTreeMap::new()
    };
    let validator = compose_validator(&base, registry.validator(type_name));
    debug!(
        entity_type = type_name,
        base = base.name(),
        methods = methods.len(),
        validated = validator.is_some(),
        "built entity type"
    );
    Ok(Arc::new(EntityType::new(
        type_name.to_string(),
        attributes.into_iter().map(Into::into).collect(),
        base,
        methods,
        validator,
    )))
}

fn compose_validator(base: &EntityType, own: Option<Validator>) -> Option<Validator> {
    let parent = base.validator().cloned();
    match (own, parent) {
        (None, parent) => parent,
        (Some(own), _) if base.is_root() => Some(own),
        (Some(own), None) => Some(own),
        (Some(own), Some(parent)) => Some(Arc::new(move |entity: &Entity| {
            parent(entity)?;
            own(entity)
        })),
    }
}
