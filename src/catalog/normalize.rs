//! Recursive key normalization for raw payloads.
//!
//! Keys are folded to plain lowercase ASCII-ish text: the tilde letter is
//! substituted first, then any remaining diacritics are stripped by
//! decomposing and dropping combining marks. Values are never touched, so
//! category names and display names keep their original spelling.

use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Normalize a single key (`"Tamaño"` -> `"tamano"`).
pub fn normalize_key(key: &str) -> String {
    let substituted = key.replace(['ñ', 'Ñ'], "n");
    let stripped: String = substituted
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    stripped.to_lowercase()
}

/// Normalize every map key in an arbitrarily nested JSON value.
///
/// When two keys collapse to the same normalized form the later one wins,
/// matching map insertion semantics.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut normalized = Map::with_capacity(map.len());
            for (key, inner) in map {
                normalized.insert(normalize_key(&key), normalize_keys(inner));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        leaf => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_key_folds_tilde_and_accents() {
        assert_eq!(normalize_key("Tamaño"), "tamano");
        assert_eq!(normalize_key("Categoría"), "categoria");
        assert_eq!(normalize_key("AÑO"), "ano");
        assert_eq!(normalize_key("Acompañante"), "acompanante");
        assert_eq!(normalize_key("presentación"), "presentacion");
    }

    #[test]
    fn normalize_keys_recurses_and_leaves_values_alone() {
        let raw = json!([
            {
                "Categoria": "Acompañante",
                "Opciones": [{"Nombre": "Papas", "Tamaño": 2, "Extras": {"Añadido": "Sí"}}]
            }
        ]);
        let normalized = normalize_keys(raw);
        assert_eq!(
            normalized,
            json!([
                {
                    "categoria": "Acompañante",
                    "opciones": [{"nombre": "Papas", "tamano": 2, "extras": {"anadido": "Sí"}}]
                }
            ])
        );
    }

    #[test]
    fn normalize_keys_is_idempotent() {
        let raw = json!({"Año": [{"Descripción": null, "ÑU": [1, {"Éxito": true}]}], "plain": "x"});
        let once = normalize_keys(raw);
        let twice = normalize_keys(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_keys_passes_scalars_through() {
        assert_eq!(normalize_keys(json!("Tamaño")), json!("Tamaño"));
        assert_eq!(normalize_keys(json!(42)), json!(42));
        assert_eq!(normalize_keys(Value::Null), Value::Null);
    }
}
