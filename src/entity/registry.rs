//! Process-wide table of behavior keyed by entity type name.
//!
//! Plugins register methods and at most one validator per type name during
//! startup; [`MethodRegistry::seal`] then freezes the table, and the entity
//! factory refuses to build types from an unsealed registry. Queries for an
//! unknown type name return an empty set or `None`, never an error.

use crate::entity::Entity;
use crate::error::{RegistryError, ValidationError};
use anyhow::Result;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Behavior attached to every instance of a type; receives the instance and call arguments.
pub type Method = Arc<dyn Fn(&Entity, &[Value]) -> Result<Value> + Send + Sync>;
/// Rejects an instance by naming the offending attribute.
pub type Validator = Arc<dyn Fn(&Entity) -> Result<(), ValidationError> + Send + Sync>;

#[derive(Default)]
struct Tables {
    methods: BTreeMap<String, BTreeMap<String, Method>>,
    validators: BTreeMap<String, Validator>,
}

/// Method/validator table with a load-then-freeze lifecycle.
#[derive(Default)]
pub struct MethodRegistry {
    tables: RwLock<Tables>,
    sealed: AtomicBool,
}

static GLOBAL: Lazy<MethodRegistry> = Lazy::new(MethodRegistry::new);

/// The registry shared by the whole process.
pub fn global() -> &'static MethodRegistry {
    &GLOBAL
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` as `method_name` on `type_name`, replacing any previous entry.
    pub fn register_method<F>(
        &self,
        type_name: &str,
        method_name: &str,
        method: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Entity, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.ensure_open(type_name, method_name)?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .methods
            .entry(type_name.to_string())
            .or_default()
            .insert(method_name.to_string(), Arc::new(method));
        Ok(())
    }

    /// Register or replace the validator for `type_name`.
    pub fn register_validator<F>(&self, type_name: &str, validator: F) -> Result<(), RegistryError>
    where
        F: Fn(&Entity) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.ensure_open(type_name, "validate")?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .validators
            .insert(type_name.to_string(), Arc::new(validator));
        Ok(())
    }

    /// Every method registered for `type_name`; empty when none were.
    pub fn methods(&self, type_name: &str) -> BTreeMap<String, Method> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.methods.get(type_name).cloned().unwrap_or_default()
    }

    pub fn validator(&self, type_name: &str) -> Option<Validator> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.validators.get(type_name).cloned()
    }

    pub fn has_methods(&self, type_name: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .methods
            .get(type_name)
            .is_some_and(|methods| !methods.is_empty())
    }

    pub fn has_validator(&self, type_name: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.validators.contains_key(type_name)
    }

    /// Type names with at least one method or a validator, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = tables
            .methods
            .keys()
            .chain(tables.validators.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Freeze the table; later registrations fail with [`RegistryError::Sealed`].
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Drop every registration and reopen the table. Test isolation only.
    pub fn clear(&self) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *tables = Tables::default();
        self.sealed.store(false, Ordering::Release);
    }

    fn ensure_open(&self, type_name: &str, member: &str) -> Result<(), RegistryError> {
        if self.is_sealed() {
            return Err(RegistryError::Sealed {
                type_name: type_name.to_string(),
                member: member.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_types_yield_empty_results() {
        let registry = MethodRegistry::new();
        assert!(registry.methods("Unregistered").is_empty());
        assert!(registry.validator("Unregistered").is_none());
        assert!(!registry.has_methods("Unregistered"));
        assert!(!registry.has_validator("Unregistered"));
    }

    #[test]
    fn registrations_are_listed_once_per_type() {
        let registry = MethodRegistry::new();
        registry
            .register_method("HotDog", "is_combo", |_, _| Ok(json!(false)))
            .unwrap();
        registry
            .register_method("HotDog", "has_salsas", |_, _| Ok(json!(true)))
            .unwrap();
        registry.register_validator("HotDog", |_| Ok(())).unwrap();
        registry.register_validator("Ingredient", |_| Ok(())).unwrap();

        assert_eq!(registry.registered_types(), vec!["HotDog", "Ingredient"]);
        let names: Vec<String> = registry.methods("HotDog").into_keys().collect();
        assert_eq!(names, vec!["has_salsas", "is_combo"]);
    }

    #[test]
    fn sealed_registry_rejects_registration_until_cleared() {
        let registry = MethodRegistry::new();
        registry.register_validator("Pan", |_| Ok(())).unwrap();
        registry.seal();
        assert!(registry.is_sealed());

        let err = registry
            .register_method("Pan", "grow", |_, _| Ok(Value::Null))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Sealed {
                type_name: "Pan".to_string(),
                member: "grow".to_string(),
            }
        );
        assert!(registry.register_validator("Pan", |_| Ok(())).is_err());

        registry.clear();
        assert!(!registry.is_sealed());
        assert!(registry.registered_types().is_empty());
        assert!(registry.register_validator("Pan", |_| Ok(())).is_ok());
    }
}
