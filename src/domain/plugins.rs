//! Validators and methods for the hot-dog catalog types.
//!
//! [`install`] registers everything into a given registry; [`bootstrap`] does
//! so exactly once for the process-wide registry and seals it. Each type gets
//! one validator that performs all of its checks in order and reports the
//! first failure.

use crate::catalog::fields::is_blank;
use crate::domain::{HOTDOG_TYPE, INGREDIENT_TYPE, SALE_TYPE};
use crate::entity::registry::{self, MethodRegistry};
use crate::entity::Entity;
use crate::error::{RegistryError, ValidationError};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::info;

static BOOTSTRAP: OnceCell<()> = OnceCell::new();

/// Install the plugin set into the process-wide registry and seal it.
///
/// Later calls are no-ops, so every entry point can call this first.
pub fn bootstrap() -> Result<&'static MethodRegistry> {
    let registry = registry::global();
    BOOTSTRAP.get_or_try_init(|| -> Result<()> {
        install(registry).context("registering catalog plugins")?;
        registry.seal();
        info!(types = registry.registered_types().len(), "sealed method registry");
        Ok(())
    })?;
    Ok(registry)
}

/// Register every catalog validator and method into `registry`.
pub fn install(registry: &MethodRegistry) -> Result<(), RegistryError> {
    registry.register_validator(INGREDIENT_TYPE, |entity| require_text(entity, "nombre"))?;

    registry.register_validator("Pan", validate_sized)?;
    registry.register_validator("Salchicha", validate_sized)?;
    registry.register_method("Salchicha", "matches_size", matches_size)?;
    registry.register_validator("Acompanante", |entity| {
        require_text(entity, "tipo")?;
        validate_sized(entity)
    })?;
    registry.register_validator("Salsa", require_declared_tipo)?;
    registry.register_validator("Toppings", require_declared_tipo)?;

    registry.register_validator(HOTDOG_TYPE, validate_hotdog)?;
    registry.register_method(HOTDOG_TYPE, "has_toppings", |entity, _| {
        Ok(Value::Bool(non_empty_list(entity.get("toppings"))))
    })?;
    registry.register_method(HOTDOG_TYPE, "has_salsas", |entity, _| {
        Ok(Value::Bool(non_empty_list(entity.get("salsas"))))
    })?;
    registry.register_method(HOTDOG_TYPE, "is_combo", |entity, _| {
        Ok(Value::Bool(
            entity.get("acompanante").is_some_and(|side| !side.is_null()),
        ))
    })?;

    registry.register_validator(SALE_TYPE, validate_sale)?;
    Ok(())
}

fn invalid(entity: &Entity, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(entity.entity_type(), field, message)
}

fn is_empty_text(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(text)) => text.trim().is_empty(),
        other => is_blank(other),
    }
}

fn require_text(entity: &Entity, field: &str) -> Result<(), ValidationError> {
    if !entity.ty().declares(field) {
        return Err(invalid(entity, field, "attribute is required"));
    }
    if is_empty_text(entity.get(field)) {
        return Err(invalid(entity, field, "must not be empty"));
    }
    Ok(())
}

fn require_positive(entity: &Entity, field: &str) -> Result<(), ValidationError> {
    match entity.get(field) {
        Some(value) if value.as_f64().is_some_and(|size| size > 0.0) => Ok(()),
        Some(value) => Err(invalid(
            entity,
            field,
            format!("must be positive, got {value}"),
        )),
        None => Err(invalid(entity, field, "attribute is required")),
    }
}

fn validate_sized(entity: &Entity) -> Result<(), ValidationError> {
    require_positive(entity, "tamano")?;
    require_text(entity, "unidad")
}

fn require_declared_tipo(entity: &Entity) -> Result<(), ValidationError> {
    if entity.ty().declares("tipo") {
        require_text(entity, "tipo")?;
    }
    Ok(())
}

fn matches_size(entity: &Entity, args: &[Value]) -> Result<Value> {
    let other = args.first().and_then(|other| other.get("tamano"));
    let matches = match (entity.get("tamano"), other) {
        (Some(own), Some(other)) => own == other,
        _ => false,
    };
    Ok(Value::Bool(matches))
}

fn non_empty_list(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty())
}

fn validate_hotdog(entity: &Entity) -> Result<(), ValidationError> {
    require_text(entity, "nombre")?;
    require_text(entity, "pan")?;
    require_text(entity, "salchicha")?;
    for field in ["toppings", "salsas"] {
        if entity.get(field).is_some_and(|value| !value.is_null() && !value.is_array()) {
            return Err(invalid(entity, field, "must be a list"));
        }
    }
    Ok(())
}

fn validate_sale(entity: &Entity) -> Result<(), ValidationError> {
    require_text(entity, "fecha")?;
    let items = match entity.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) => return Err(invalid(entity, "items", "must have at least one item")),
        Some(other) if !other.is_null() => {
            return Err(invalid(entity, "items", format!("must be a list, got {other}")));
        }
        _ => return Err(invalid(entity, "items", "attribute is required")),
    };

    for (index, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            return Err(invalid(
                entity,
                "items",
                format!("item at index {index} must be an object"),
            ));
        };
        for field in ["hotdog_id", "hotdog_nombre"] {
            if is_empty_text(item.get(field)) {
                return Err(invalid(
                    entity,
                    "items",
                    format!("item at index {index} must have non-empty '{field}'"),
                ));
            }
        }
        let quantity = item.get("cantidad");
        if !quantity.and_then(Value::as_i64).is_some_and(|qty| qty > 0) {
            let shown = quantity.map(Value::to_string).unwrap_or_else(|| "nothing".to_string());
            return Err(invalid(
                entity,
                "items",
                format!("item at index {index} must have positive integer 'cantidad', got {shown}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{create_base_type, create_entity_type};
    use serde_json::json;
    use std::sync::Arc;

    fn sealed_registry() -> MethodRegistry {
        let registry = MethodRegistry::new();
        install(&registry).unwrap();
        registry.seal();
        registry
    }

    fn entity(ty: &Arc<crate::entity::EntityType>, fields: Value) -> Entity {
        let mut record = fields.as_object().cloned().unwrap_or_default();
        record.insert("id".to_string(), json!("test-id"));
        ty.from_map(&record).unwrap()
    }

    #[test]
    fn sized_ingredients_check_base_then_size_then_unit() {
        let registry = sealed_registry();
        let base = create_base_type(&registry, INGREDIENT_TYPE, ["nombre"], None).unwrap();
        let pan = create_entity_type(&registry, "Pan", ["tipo", "tamano", "unidad"], Some(&base))
            .unwrap();

        let ok = entity(&pan, json!({"nombre": "simple", "tamano": 6, "unidad": "pulgadas"}));
        assert!(ok.validate().is_ok());

        let nameless = entity(&pan, json!({"nombre": " ", "tamano": -1, "unidad": "pulgadas"}));
        assert_eq!(nameless.validate().unwrap_err().field, "nombre");

        let negative = entity(&pan, json!({"nombre": "simple", "tamano": -1, "unidad": "cm"}));
        let err = negative.validate().unwrap_err();
        assert_eq!(err.field, "tamano");
        assert!(err.message.contains("-1"));

        let unitless = entity(&pan, json!({"nombre": "simple", "tamano": 6}));
        assert_eq!(unitless.validate().unwrap_err().field, "unidad");
    }

    #[test]
    fn side_dishes_also_need_a_kind() {
        let registry = sealed_registry();
        let side = create_entity_type(
            &registry,
            "Acompanante",
            ["nombre", "tipo", "tamano", "unidad"],
            None,
        )
        .unwrap();
        let err = entity(&side, json!({"nombre": "papas", "tamano": 1, "unidad": "porcion"}))
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "tipo");
    }

    #[test]
    fn sauces_only_check_kind_when_declared() {
        let registry = sealed_registry();
        let plain = create_entity_type(&registry, "Salsa", ["nombre", "base"], None).unwrap();
        assert!(entity(&plain, json!({"nombre": "tomate"})).validate().is_ok());

        let typed = create_entity_type(&registry, "Toppings", ["nombre", "tipo"], None).unwrap();
        assert_eq!(
            entity(&typed, json!({"nombre": "cebolla", "tipo": ""}))
                .validate()
                .unwrap_err()
                .field,
            "tipo"
        );
    }

    #[test]
    fn sausage_sizes_compare_against_another_record() {
        let registry = sealed_registry();
        let sausage =
            create_entity_type(&registry, "Salchicha", ["nombre", "tamano"], None).unwrap();
        let weiner = entity(&sausage, json!({"nombre": "weiner", "tamano": 6}));
        let other = json!({"nombre": "bratwurst", "tamano": 6});
        assert_eq!(weiner.call("matches_size", &[other]).unwrap(), json!(true));
        assert_eq!(
            weiner.call("matches_size", &[json!({"tamano": 8})]).unwrap(),
            json!(false)
        );
        assert_eq!(weiner.call("matches_size", &[]).unwrap(), json!(false));
    }

    #[test]
    fn hotdog_rules_and_methods() {
        let registry = sealed_registry();
        let hotdog = create_entity_type(
            &registry,
            HOTDOG_TYPE,
            ["nombre", "pan", "salchicha", "toppings", "salsas", "acompanante"],
            None,
        )
        .unwrap();

        let combo = entity(
            &hotdog,
            json!({
                "nombre": "especial",
                "pan": {"id": "p", "nombre": "simple"},
                "salchicha": {"id": "s", "nombre": "weiner"},
                "toppings": [{"id": "t", "nombre": "cebolla"}],
                "salsas": [],
                "acompanante": {"id": "a", "nombre": "papas"}
            }),
        );
        assert!(combo.validate().is_ok());
        assert_eq!(combo.call("has_toppings", &[]).unwrap(), json!(true));
        assert_eq!(combo.call("has_salsas", &[]).unwrap(), json!(false));
        assert_eq!(combo.call("is_combo", &[]).unwrap(), json!(true));

        let breadless = entity(&hotdog, json!({"nombre": "x", "pan": null, "salchicha": "s"}));
        assert_eq!(breadless.validate().unwrap_err().field, "pan");

        let bad_list = entity(
            &hotdog,
            json!({"nombre": "x", "pan": "p", "salchicha": "s", "toppings": "cebolla"}),
        );
        assert_eq!(bad_list.validate().unwrap_err().field, "toppings");
        assert_eq!(bad_list.call("is_combo", &[]).unwrap(), json!(false));
    }

    #[test]
    fn sales_require_date_and_well_formed_items() {
        let registry = sealed_registry();
        let sale = create_entity_type(&registry, SALE_TYPE, ["fecha", "items"], None).unwrap();

        let ok = entity(
            &sale,
            json!({
                "fecha": "2024-11-16T14:30:00",
                "items": [{"hotdog_id": "h1", "hotdog_nombre": "simple", "cantidad": 2}]
            }),
        );
        assert!(ok.validate().is_ok());

        let undated = entity(&sale, json!({"fecha": "", "items": []}));
        assert_eq!(undated.validate().unwrap_err().field, "fecha");

        let empty = entity(&sale, json!({"fecha": "2024-11-16", "items": []}));
        assert!(empty.validate().unwrap_err().message.contains("at least one"));

        let zero = entity(
            &sale,
            json!({
                "fecha": "2024-11-16",
                "items": [{"hotdog_id": "h1", "hotdog_nombre": "simple", "cantidad": 0}]
            }),
        );
        assert!(zero.validate().unwrap_err().message.contains("cantidad"));

        let fractional = entity(
            &sale,
            json!({
                "fecha": "2024-11-16",
                "items": [{"hotdog_id": "h1", "hotdog_nombre": "simple", "cantidad": 1.5}]
            }),
        );
        assert!(fractional.validate().is_err());

        let anonymous = entity(
            &sale,
            json!({"fecha": "2024-11-16", "items": [{"hotdog_nombre": "simple", "cantidad": 1}]}),
        );
        assert!(anonymous.validate().unwrap_err().message.contains("hotdog_id"));
    }

    #[test]
    fn install_fails_on_a_sealed_registry() {
        let registry = sealed_registry();
        assert!(matches!(
            install(&registry),
            Err(RegistryError::Sealed { .. })
        ));
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let first = bootstrap().unwrap();
        let second = bootstrap().unwrap();
        assert!(first.is_sealed());
        assert!(std::ptr::eq(first, second));
        assert!(first.has_validator(HOTDOG_TYPE));
    }
}
