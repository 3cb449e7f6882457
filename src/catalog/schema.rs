//! Schema inference over enriched, normalized payloads.
//!
//! Each category contributes the attribute names of its first sample item.
//! Attributes present in every category form the common set that becomes a
//! shared base type; the remainder per category becomes that category's
//! specific set. Later items are not consulted. Callers that need a schema
//! even when inference fails keep their own fallback table.

use crate::catalog::fields::{capitalize, field};
use crate::catalog::normalize::normalize_key;
use crate::error::CatalogError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Grouping key of a normalized GROUPED record.
pub const CATEGORY_FIELD: &str = "categoria";
/// Items container of a normalized GROUPED record.
pub const ITEMS_FIELD: &str = "opciones";
/// Display-name attribute; always ordered first.
pub const DISPLAY_NAME_FIELD: &str = "nombre";
/// Grouping key, identity and discriminator never become attributes.
pub const META_FIELDS: &[&str] = &[CATEGORY_FIELD, "id", "entity_type"];

/// Common attributes plus each type's specific attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferredSchema {
    pub common: Vec<String>,
    pub specific: BTreeMap<String, Vec<String>>,
}

impl InferredSchema {
    pub fn is_empty(&self) -> bool {
        self.specific.is_empty()
    }

    /// Every attribute of `type_name`: common first, then specific.
    pub fn attributes_of(&self, type_name: &str) -> Option<Vec<String>> {
        let specific = self.specific.get(type_name)?;
        Some(self.common.iter().chain(specific).cloned().collect())
    }
}

/// Type name a category materializes as (`"pan"` -> `"Pan"`, `"Acompañante"` -> `"Acompanante"`).
pub fn type_name_for_category(category: &str) -> String {
    capitalize(&normalize_key(category))
}

/// Attribute names per category type, taken from each category's first item.
///
/// Groups without a category are skipped, as are categories with no items.
pub fn category_attributes(payload: &Value) -> Result<BTreeMap<String, Vec<String>>, CatalogError> {
    let groups = payload.as_array().ok_or_else(|| CatalogError::DataShape {
        detail: "expected a list of category groups".to_string(),
    })?;

    let mut per_category = BTreeMap::new();
    for group in groups {
        let group = group.as_object().ok_or_else(|| CatalogError::DataShape {
            detail: "category group is not an object".to_string(),
        })?;
        let category = match field(group, CATEGORY_FIELD) {
            None | Some(Value::Null) => continue,
            Some(Value::String(name)) if name.is_empty() => continue,
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(CatalogError::DataShape {
                    detail: format!("category name {other} is not a string"),
                });
            }
        };
        let first = match field(group, ITEMS_FIELD) {
            Some(Value::Array(items)) => match items.first() {
                Some(first) => first,
                None => continue,
            },
            None | Some(Value::Null) => continue,
            Some(_) => {
                return Err(CatalogError::DataShape {
                    detail: format!("items of category '{category}' are not a list"),
                });
            }
        };
        let first = first.as_object().ok_or_else(|| CatalogError::DataShape {
            detail: format!("first item of category '{category}' is not an object"),
        })?;
        per_category.insert(type_name_for_category(&category), ordered_attributes(first));
    }
    Ok(per_category)
}

/// Intersection of every category's attributes, in the first category's order.
pub fn find_common_attributes(per_category: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let mut categories = per_category.values();
    let Some(first) = categories.next() else {
        return Vec::new();
    };
    let others: Vec<BTreeSet<&String>> = categories.map(|attrs| attrs.iter().collect()).collect();
    first
        .iter()
        .filter(|attr| others.iter().all(|set| set.contains(attr)))
        .cloned()
        .collect()
}

/// Split a GROUPED sample into common and per-category attributes.
pub fn infer_grouped_schema(payload: &Value) -> Result<InferredSchema, CatalogError> {
    let per_category = category_attributes(payload)?;
    let common = find_common_attributes(&per_category);
    let specific = per_category
        .into_iter()
        .map(|(type_name, attrs)| {
            let own = attrs
                .into_iter()
                .filter(|attr| !common.contains(attr))
                .collect();
            (type_name, own)
        })
        .collect();
    Ok(InferredSchema { common, specific })
}

/// Single-type schema from the first record of a FLAT sample.
///
/// Returns an empty map for an empty sample.
pub fn infer_flat_schema(
    payload: &Value,
    type_name: &str,
) -> Result<BTreeMap<String, Vec<String>>, CatalogError> {
    let records = payload.as_array().ok_or_else(|| CatalogError::DataShape {
        detail: "expected a list of records".to_string(),
    })?;
    let Some(first) = records.first() else {
        return Ok(BTreeMap::new());
    };
    let first = first.as_object().ok_or_else(|| CatalogError::DataShape {
        detail: "first record is not an object".to_string(),
    })?;
    Ok(BTreeMap::from([(
        type_name.to_string(),
        ordered_attributes(first),
    )]))
}

fn ordered_attributes(record: &Map<String, Value>) -> Vec<String> {
    let mut attrs = Vec::with_capacity(record.len());
    if record.contains_key(DISPLAY_NAME_FIELD) {
        attrs.push(DISPLAY_NAME_FIELD.to_string());
    }
    attrs.extend(
        record
            .keys()
            .filter(|key| key.as_str() != DISPLAY_NAME_FIELD)
            .filter(|key| !META_FIELDS.contains(&key.as_str()))
            .cloned(),
    );
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {"categoria": "Pan", "opciones": [
                {"id": "1", "tipo": "blanco", "nombre": "simple", "tamano": 6, "unidad": "pulgadas", "stock": 10},
                {"id": "2", "nombre": "extra", "ignored": true}
            ]},
            {"categoria": "salsa", "opciones": [
                {"id": "3", "nombre": "tomate", "base": "tomate", "color": "rojo", "stock": 5}
            ]},
            {"categoria": "toppings", "opciones": []}
        ])
    }

    #[test]
    fn grouped_inference_splits_common_and_specific() {
        let schema = infer_grouped_schema(&sample()).unwrap();
        assert_eq!(schema.common, vec!["nombre", "stock"]);
        assert_eq!(schema.specific["Pan"], vec!["tipo", "tamano", "unidad"]);
        assert_eq!(schema.specific["Salsa"], vec!["base", "color"]);
        assert!(!schema.specific.contains_key("Toppings"));
    }

    #[test]
    fn common_and_specific_partition_each_category() {
        let payload = sample();
        let per_category = category_attributes(&payload).unwrap();
        let schema = infer_grouped_schema(&payload).unwrap();
        for (type_name, attrs) in &per_category {
            let specific = &schema.specific[type_name];
            let union: BTreeSet<&String> = schema.common.iter().chain(specific).collect();
            let expected: BTreeSet<&String> = attrs.iter().collect();
            assert_eq!(union, expected, "partition for {type_name}");
            assert!(specific.iter().all(|attr| !schema.common.contains(attr)));
        }
    }

    #[test]
    fn display_name_leads_and_meta_fields_are_excluded() {
        let per_category = category_attributes(&sample()).unwrap();
        assert_eq!(per_category["Pan"][0], "nombre");
        for attrs in per_category.values() {
            assert!(attrs.iter().all(|attr| !META_FIELDS.contains(&attr.as_str())));
        }
    }

    #[test]
    fn zero_categories_yield_empty_common_set() {
        let schema = infer_grouped_schema(&json!([])).unwrap();
        assert!(schema.common.is_empty());
        assert!(schema.is_empty());
    }

    #[test]
    fn malformed_groups_raise_instead_of_guessing() {
        assert!(infer_grouped_schema(&json!({"categoria": "Pan"})).is_err());
        assert!(infer_grouped_schema(&json!(["Pan"])).is_err());
        assert!(infer_grouped_schema(&json!([{"categoria": 7, "opciones": [{}]}])).is_err());
    }

    #[test]
    fn type_names_are_capitalized_without_diacritics() {
        assert_eq!(type_name_for_category("pan"), "Pan");
        assert_eq!(type_name_for_category("TOPPINGS"), "Toppings");
        assert_eq!(type_name_for_category("Acompañante"), "Acompanante");
    }

    #[test]
    fn flat_inference_uses_first_record() {
        let payload = json!([
            {"pan": "simple", "nombre": "especial", "id": "x", "toppings": []},
            {"nombre": "otro", "salsas": []}
        ]);
        let schema = infer_flat_schema(&payload, "HotDog").unwrap();
        assert_eq!(schema["HotDog"], vec!["nombre", "pan", "toppings"]);
        assert!(infer_flat_schema(&json!([]), "HotDog").unwrap().is_empty());
    }

    #[test]
    fn attributes_of_joins_common_and_specific() {
        let schema = infer_grouped_schema(&sample()).unwrap();
        assert_eq!(
            schema.attributes_of("Salsa").unwrap(),
            vec!["nombre", "stock", "base", "color"]
        );
        assert!(schema.attributes_of("Missing").is_none());
    }
}
