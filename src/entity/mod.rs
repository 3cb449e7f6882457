//! Runtime entity types built from data-derived schemas.
//!
//! There is no struct per catalog type. An [`EntityType`] carries a name, its
//! attribute names, an optional base type, and the behavior looked up in the
//! [`registry::MethodRegistry`] when the type was built. An [`Entity`] is an
//! identity plus a discriminator plus an ordered attribute map, dispatching
//! methods and validation through its type. Every chain ends at the universal
//! root type, which declares nothing and validates everything.

pub mod factory;
pub mod registry;

use crate::catalog::identity::EntityId;
use crate::catalog::schema::META_FIELDS;
use crate::error::{EntityError, ValidationError};
use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

pub use factory::{create_base_type, create_entity_type, create_types_from_schemas};
pub use registry::{Method, MethodRegistry, Validator};

/// Name of the universal root type.
pub const ROOT_TYPE_NAME: &str = "Entity";
/// Discriminator key in the map form of an entity.
pub const ENTITY_TYPE_FIELD: &str = "entity_type";
/// Quantity-on-hand attribute read by [`Stocked`].
pub const STOCK_FIELD: &str = "stock";

static ROOT: Lazy<Arc<EntityType>> = Lazy::new(|| {
    Arc::new(EntityType {
        name: ROOT_TYPE_NAME.to_string(),
        own_attributes: Vec::new(),
        attributes: Vec::new(),
        base: None,
        methods: BTreeMap::new(),
        validator: None,
    })
});

/// A runtime type: attributes, base type and the behavior attached at build time.
pub struct EntityType {
    name: String,
    own_attributes: Vec<String>,
    attributes: Vec<String>,
    base: Option<Arc<EntityType>>,
    methods: BTreeMap<String, Method>,
    validator: Option<Validator>,
}

/// Plain description of a type, rebuilt from the type rather than from instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeDescriptor {
    pub type_name: String,
    pub attribute_names: Vec<String>,
    pub base_type: Option<String>,
    pub methods: Vec<String>,
    pub has_validator: bool,
}

impl EntityType {
    pub(crate) fn new(
        name: String,
        own_attributes: Vec<String>,
        base: Arc<EntityType>,
        methods: BTreeMap<String, Method>,
        validator: Option<Validator>,
    ) -> Self {
        let mut attributes = base.attributes.clone();
        for attr in &own_attributes {
            if !attributes.contains(attr) {
                attributes.push(attr.clone());
            }
        }
        Self {
            name,
            own_attributes,
            attributes,
            base: Some(base),
            methods,
            validator,
        }
    }

    /// The universal root every chain ends at.
    pub fn root() -> Arc<EntityType> {
        Arc::clone(&ROOT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.base.is_none()
    }

    pub fn base(&self) -> Option<&Arc<EntityType>> {
        self.base.as_ref()
    }

    /// Inherited attributes first, then this type's own.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn own_attributes(&self) -> &[String] {
        &self.own_attributes
    }

    pub fn declares(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|attr| attr == attribute)
    }

    /// Resolve a method on this type or the nearest base that has it.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods
            .get(name)
            .or_else(|| self.base.as_deref().and_then(|base| base.method(name)))
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names = self
            .base
            .as_deref()
            .map(EntityType::method_names)
            .unwrap_or_default();
        for name in self.methods.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub(crate) fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// True when this type is `type_name` or inherits from it.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.name == type_name
            || self
                .base
                .as_deref()
                .is_some_and(|base| base.is_a(type_name))
    }

    pub fn descriptor(&self) -> EntityTypeDescriptor {
        EntityTypeDescriptor {
            type_name: self.name.clone(),
            attribute_names: self.own_attributes.clone(),
            base_type: self.base.as_ref().map(|base| base.name.clone()),
            methods: self.method_names(),
            has_validator: self.validator.is_some(),
        }
    }

    /// Build an instance; every declared attribute not supplied starts as null.
    ///
    /// Fails when `attributes` names something this type does not declare.
    pub fn instantiate<I>(
        self: &Arc<Self>,
        id: impl Into<EntityId>,
        attributes: I,
    ) -> Result<Entity, EntityError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entity = Entity::blank(Arc::clone(self), id.into());
        for (name, value) in attributes {
            entity.set(&name, value)?;
        }
        Ok(entity)
    }

    /// Rebuild an instance from its map form.
    ///
    /// Requires a non-empty `id`. A stored discriminator is ignored in favour
    /// of this type's name; keys the type does not declare are dropped.
    pub fn from_map(self: &Arc<Self>, record: &Map<String, Value>) -> Result<Entity, EntityError> {
        let id = match record.get("id") {
            Some(Value::String(id)) if !id.is_empty() => EntityId(id.clone()),
            _ => {
                return Err(EntityError::MissingIdentity {
                    entity_type: self.name.clone(),
                });
            }
        };
        let mut entity = Entity::blank(Arc::clone(self), id);
        for (key, value) in record {
            if META_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if entity.set(key, value.clone()).is_err() {
                debug!(entity_type = %self.name, attribute = %key, "dropping undeclared attribute");
            }
        }
        Ok(entity)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("base", &self.base.as_ref().map(|base| base.name.as_str()))
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// One catalog item: identity, discriminator and its type's attributes.
#[derive(Clone)]
pub struct Entity {
    id: EntityId,
    entity_type: String,
    attributes: Map<String, Value>,
    ty: Arc<EntityType>,
}

impl Entity {
    fn blank(ty: Arc<EntityType>, id: EntityId) -> Self {
        let attributes = ty
            .attributes
            .iter()
            .map(|attr| (attr.clone(), Value::Null))
            .collect();
        Self {
            id,
            entity_type: ty.name.clone(),
            attributes,
            ty,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<EntityId>) {
        self.id = id.into();
    }

    /// Discriminator; defaults to the type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn set_entity_type(&mut self, entity_type: impl Into<String>) {
        self.entity_type = entity_type.into();
    }

    pub fn ty(&self) -> &Arc<EntityType> {
        &self.ty
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// String value of `attribute`, if it holds one.
    pub fn text(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(Value::as_str)
    }

    pub fn set(&mut self, attribute: &str, value: Value) -> Result<(), EntityError> {
        match self.attributes.get_mut(attribute) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EntityError::UnknownAttribute {
                entity_type: self.ty.name.clone(),
                attribute: attribute.to_string(),
            }),
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Value used by equality filters: identity, discriminator or attribute.
    pub fn value_of(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::String(self.id.0.clone())),
            ENTITY_TYPE_FIELD => Some(Value::String(self.entity_type.clone())),
            _ => self.attributes.get(key).cloned(),
        }
    }

    /// Map form: `id`, `entity_type`, then every attribute in declaration order.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::with_capacity(self.attributes.len() + 2);
        map.insert("id".to_string(), Value::String(self.id.0.clone()));
        map.insert(
            ENTITY_TYPE_FIELD.to_string(),
            Value::String(self.entity_type.clone()),
        );
        for (key, value) in &self.attributes {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Run the type's composed validator; passes when none is registered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.ty.validator() {
            Some(validator) => validator(self),
            None => Ok(()),
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.ty.method(name).is_some()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .ty
            .method(name)
            .ok_or_else(|| EntityError::UnknownMethod {
                entity_type: self.entity_type.clone(),
                method: name.to_string(),
            })?;
        method(self, args)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(id='{}', entity_type='{}'",
            self.ty.name, self.id, self.entity_type
        )?;
        for (key, value) in &self.attributes {
            match value {
                Value::String(text) => write!(f, ", {key}='{text}'")?,
                other => write!(f, ", {key}={other}")?,
            }
        }
        f.write_str(")")
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

/// Quantity-on-hand access for entities whose type declares `stock`.
pub trait Stocked {
    /// `None` when the type has no stock attribute or it is not an integer.
    fn stock(&self) -> Option<i64>;
    fn set_stock(&mut self, stock: i64) -> Result<(), EntityError>;
}

impl Stocked for Entity {
    fn stock(&self) -> Option<i64> {
        self.get(STOCK_FIELD).and_then(Value::as_i64)
    }

    fn set_stock(&mut self, stock: i64) -> Result<(), EntityError> {
        self.set(STOCK_FIELD, json!(stock))
    }
}
