//! Deterministic identities for catalog items.
//!
//! An identity is a UUID-shaped string derived from `(category, natural key)`.
//! Reloading the same source always yields the same identities, and items that
//! share a natural key across categories never collide. The batch helpers
//! consume the payload and hand it back only when every item that needed an
//! identity received one, so a failing batch is never observed half-enriched.

use crate::catalog::fields::{field, field_mut, is_blank, resolve_key, value_text};
use crate::error::CatalogError;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Stable identifier for an individual catalog item.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId(value.to_string())
    }
}

/// Field names the enrichment helpers read and write.
///
/// Defaults match the raw GROUPED source (`Categoria`/`Opciones`); lookups are
/// tolerant of case and diacritics, so the same defaults work on payloads that
/// were already normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityFields {
    pub category_field: String,
    pub items_field: String,
    pub natural_key_field: String,
    pub id_field: String,
}

impl Default for IdentityFields {
    fn default() -> Self {
        Self {
            category_field: "Categoria".to_string(),
            items_field: "Opciones".to_string(),
            natural_key_field: "nombre".to_string(),
            id_field: "id".to_string(),
        }
    }
}

/// Derive the identity for `natural_key`, namespaced by `namespace` when given.
///
/// An empty namespace is treated as no namespace.
pub fn assign_identity(namespace: Option<&str>, natural_key: &str) -> EntityId {
    let seed = match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{ns}:{natural_key}"),
        None => natural_key.to_string(),
    };
    let digest = Md5::digest(seed.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    EntityId(Uuid::from_bytes(bytes).hyphenated().to_string())
}

/// Assign identities across a GROUPED payload.
///
/// Returns the payload plus whether any identity was added. Fails when a group
/// lacks its category/items fields or when an item needing an identity has no
/// usable natural key.
pub fn enrich_grouped(
    payload: Value,
    fields: &IdentityFields,
) -> Result<(Value, bool), CatalogError> {
    let Value::Array(mut groups) = payload else {
        return Err(CatalogError::DataShape {
            detail: "expected a list of category groups".to_string(),
        });
    };

    let mut modified = false;
    for group in groups.iter_mut() {
        let Value::Object(group) = group else {
            return Err(CatalogError::DataShape {
                detail: "category group is not an object".to_string(),
            });
        };
        let category = field(group, &fields.category_field)
            .ok_or_else(|| CatalogError::missing_container(&fields.category_field))?;
        let namespace = namespace_text(category);
        let category = value_text(category);
        if resolve_key(group, &fields.items_field).is_none() {
            return Err(CatalogError::missing_container(&fields.items_field));
        }
        let Some(Value::Array(items)) = field_mut(group, &fields.items_field) else {
            return Err(CatalogError::DataShape {
                detail: format!(
                    "field '{}' in group '{category}' is not a list",
                    fields.items_field
                ),
            });
        };

        for item in items.iter_mut() {
            let record = as_record(item)?;
            let scope = namespace.as_deref();
            modified |= assign_missing(record, scope, scope, fields)?;
        }
    }

    Ok((Value::Array(groups), modified))
}

/// Assign identities across a FLAT payload.
///
/// When `namespace_field` is set and present on an item, its value namespaces
/// the identity; otherwise the natural key alone seeds it.
pub fn enrich_flat(
    payload: Value,
    fields: &IdentityFields,
    namespace_field: Option<&str>,
) -> Result<(Value, bool), CatalogError> {
    let Value::Array(mut items) = payload else {
        return Err(CatalogError::DataShape {
            detail: "expected a list of items".to_string(),
        });
    };

    let mut modified = false;
    for item in items.iter_mut() {
        let record = as_record(item)?;
        let namespace = namespace_field
            .and_then(|name| field(record, name))
            .and_then(namespace_text);
        modified |= assign_missing(record, namespace.as_deref(), None, fields)?;
    }

    Ok((Value::Array(items), modified))
}

/// Namespace carried by a category value; null and empty text mean none.
fn namespace_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        other => Some(value_text(other)),
    }
}

fn as_record(item: &mut Value) -> Result<&mut Map<String, Value>, CatalogError> {
    match item {
        Value::Object(record) => Ok(record),
        _ => Err(CatalogError::DataShape {
            detail: "item is not an object".to_string(),
        }),
    }
}

fn assign_missing(
    record: &mut Map<String, Value>,
    namespace: Option<&str>,
    scope: Option<&str>,
    fields: &IdentityFields,
) -> Result<bool, CatalogError> {
    if !is_blank(field(record, &fields.id_field)) {
        return Ok(false);
    }

    let natural_key = field(record, &fields.natural_key_field).ok_or_else(|| {
        CatalogError::MissingNaturalKey {
            category: scope.map(str::to_string),
            field: fields.natural_key_field.clone(),
        }
    })?;
    if is_blank(Some(natural_key)) {
        return Err(CatalogError::EmptyNaturalKey {
            category: scope.map(str::to_string),
            field: fields.natural_key_field.clone(),
        });
    }

    let id = assign_identity(namespace, &value_text(natural_key));
    let id_key = resolve_key(record, &fields.id_field)
        .map(str::to_string)
        .unwrap_or_else(|| fields.id_field.clone());
    record.insert(id_key, Value::String(id.0));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_is_deterministic_and_uuid_shaped() {
        let first = assign_identity(Some("Pan"), "simple");
        let second = assign_identity(Some("Pan"), "simple");
        assert_eq!(first, second);

        let groups: Vec<usize> = first.as_str().split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert!(
            first
                .as_str()
                .chars()
                .all(|c| c == '-' || c.is_ascii_hexdigit())
        );
    }

    #[test]
    fn namespaces_keep_identities_apart() {
        let pan = assign_identity(Some("Pan"), "simple");
        let salsa = assign_identity(Some("Salsa"), "simple");
        let bare = assign_identity(None, "simple");
        assert_ne!(pan, salsa);
        assert_ne!(pan, bare);
        assert_eq!(assign_identity(Some(""), "simple"), bare);
    }

    #[test]
    fn identity_matches_md5_uuid_format() {
        assert_eq!(
            assign_identity(Some("Pan"), "simple").as_str(),
            "cdd0f64a-b192-29e3-ef8f-df41e2da3287"
        );
        assert_eq!(
            assign_identity(None, "simple").as_str(),
            "8dbdda48-fb87-48d6-746f-1965824e966a"
        );
    }

    #[test]
    fn null_categories_do_not_namespace() {
        let bare = json!(assign_identity(None, "simple").0);

        let grouped = json!([{"Categoria": null, "Opciones": [{"nombre": "simple"}]}]);
        let (enriched, _) = enrich_grouped(grouped, &IdentityFields::default()).unwrap();
        assert_eq!(enriched[0]["Opciones"][0]["id"], bare);

        let flat = json!([
            {"nombre": "simple", "tipo": null},
            {"nombre": "simple", "tipo": ""}
        ]);
        let (enriched, _) =
            enrich_flat(flat, &IdentityFields::default(), Some("tipo")).unwrap();
        assert_eq!(enriched[0]["id"], bare);
        assert_eq!(enriched[1]["id"], bare);
    }

    #[test]
    fn grouped_enrichment_fills_missing_ids_only() {
        let payload = json!([
            {"Categoria": "Pan", "Opciones": [
                {"nombre": "simple"},
                {"nombre": "integral", "id": "keep-me"},
                {"nombre": "largo", "id": ""}
            ]}
        ]);
        let (enriched, modified) = enrich_grouped(payload, &IdentityFields::default()).unwrap();
        assert!(modified);
        let items = enriched[0]["Opciones"].as_array().unwrap();
        assert_eq!(items[0]["id"], json!(assign_identity(Some("Pan"), "simple").0));
        assert_eq!(items[1]["id"], json!("keep-me"));
        assert_eq!(items[2]["id"], json!(assign_identity(Some("Pan"), "largo").0));

        let (again, modified_again) =
            enrich_grouped(enriched.clone(), &IdentityFields::default()).unwrap();
        assert!(!modified_again);
        assert_eq!(again, enriched);
    }

    #[test]
    fn grouped_enrichment_accepts_normalized_field_names() {
        let payload = json!([{"categoria": "Salsa", "opciones": [{"nombre": "tomate"}]}]);
        let (enriched, modified) = enrich_grouped(payload, &IdentityFields::default()).unwrap();
        assert!(modified);
        assert_eq!(
            enriched[0]["opciones"][0]["id"],
            json!(assign_identity(Some("Salsa"), "tomate").0)
        );
    }

    #[test]
    fn grouped_enrichment_rejects_missing_containers() {
        let missing_items = json!([{"Categoria": "Pan"}]);
        let err = enrich_grouped(missing_items, &IdentityFields::default()).unwrap_err();
        assert!(matches!(err, CatalogError::DataShape { .. }));
        assert!(err.to_string().contains("Opciones"));

        let missing_category = json!([{"Opciones": []}]);
        let err = enrich_grouped(missing_category, &IdentityFields::default()).unwrap_err();
        assert!(err.to_string().contains("Categoria"));
    }

    #[test]
    fn grouped_enrichment_rejects_missing_or_empty_natural_key() {
        let missing = json!([{"Categoria": "Pan", "Opciones": [{"tipo": "blanco"}]}]);
        let err = enrich_grouped(missing, &IdentityFields::default()).unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingNaturalKey {
                category: Some("Pan".to_string()),
                field: "nombre".to_string(),
            }
        );

        let empty = json!([{"Categoria": "Pan", "Opciones": [{"nombre": ""}]}]);
        let err = enrich_grouped(empty, &IdentityFields::default()).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyNaturalKey { .. }));
    }

    #[test]
    fn flat_enrichment_namespaces_by_item_field() {
        let payload = json!([
            {"nombre": "especial"},
            {"nombre": "simple", "tipo": "Pan"}
        ]);
        let (enriched, modified) =
            enrich_flat(payload, &IdentityFields::default(), Some("tipo")).unwrap();
        assert!(modified);
        assert_eq!(enriched[0]["id"], json!(assign_identity(None, "especial").0));
        assert_eq!(
            enriched[1]["id"],
            json!(assign_identity(Some("Pan"), "simple").0)
        );
    }

    #[test]
    fn flat_enrichment_rejects_items_without_natural_key() {
        let payload = json!([{"nombre": "ok"}, {"pan": "simple"}]);
        let err = enrich_flat(payload, &IdentityFields::default(), None).unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingNaturalKey {
                category: None,
                field: "nombre".to_string(),
            }
        );
    }

    #[test]
    fn entity_id_round_trips_as_plain_string() {
        let id = EntityId("a1b2".to_string());
        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, "\"a1b2\"");
        let parsed: EntityId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed, id);
    }
}
