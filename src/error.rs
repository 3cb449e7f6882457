//! Typed failures raised by the catalog core.
//!
//! Shape and natural-key errors are fatal to the batch that raised them;
//! callers treat them as startup failures. `ValidationError` is a
//! per-operation rejection that names the offending attribute. All of these
//! travel through `anyhow` untouched and can be recovered with
//! `downcast_ref`.

use thiserror::Error;

/// Failures raised while enriching raw payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// A GROUPED record is missing its category/items container, or the
    /// payload is not the list-of-records shape the stage expects.
    #[error("malformed grouped payload: {detail}")]
    DataShape { detail: String },
    /// An item needs an identity but has no natural-key field.
    #[error("item{} missing required field '{field}'", scope(.category))]
    MissingNaturalKey {
        category: Option<String>,
        field: String,
    },
    /// An item needs an identity but its natural-key field is empty.
    #[error("item{} has empty '{field}'", scope(.category))]
    EmptyNaturalKey {
        category: Option<String>,
        field: String,
    },
}

impl CatalogError {
    pub(crate) fn missing_container(field: &str) -> Self {
        CatalogError::DataShape {
            detail: format!("missing required field '{field}' in group"),
        }
    }
}

fn scope(category: &Option<String>) -> String {
    match category {
        Some(category) => format!(" in category '{category}'"),
        None => String::new(),
    }
}

/// Rejection raised by an entity validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{entity_type} '{field}': {message}")]
pub struct ValidationError {
    pub entity_type: String,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Misuse of the method/validator registry lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry is sealed; cannot register '{member}' for type '{type_name}'")]
    Sealed { type_name: String, member: String },
    #[error("registry must be sealed before building entity type '{type_name}'")]
    NotSealed { type_name: String },
}

/// Failures raised by entity instances outside of validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityError {
    #[error("{entity_type} record has no identity")]
    MissingIdentity { entity_type: String },
    #[error("{entity_type} has no attribute '{attribute}'")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },
    #[error("{entity_type} has no method '{method}'")]
    UnknownMethod { entity_type: String, method: String },
}

/// Failures raised by catalog persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("catalog '{name}' not initialized; populate the store first")]
    NotPopulated { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_messages_name_category_when_known() {
        let grouped = CatalogError::MissingNaturalKey {
            category: Some("Pan".to_string()),
            field: "nombre".to_string(),
        };
        assert_eq!(
            grouped.to_string(),
            "item in category 'Pan' missing required field 'nombre'"
        );

        let flat = CatalogError::EmptyNaturalKey {
            category: None,
            field: "nombre".to_string(),
        };
        assert_eq!(flat.to_string(), "item has empty 'nombre'");
    }

    #[test]
    fn validation_error_names_field() {
        let err = ValidationError::new("Pan", "tamano", "must be positive, got -1");
        assert!(err.to_string().contains("tamano"));
        assert!(err.to_string().starts_with("Pan"));
    }
}
