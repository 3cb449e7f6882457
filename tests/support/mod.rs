#![allow(dead_code)]

use anyhow::{Context, Result};
use catalogforge::domain::plugins;
use catalogforge::error::ValidationError;
use catalogforge::{FetchOptions, Fetchable, MethodRegistry, StaticSource};
use serde_json::{Value, json};
use std::cell::Cell;
use std::fs;
use std::path::Path;

/// Raw ingredient payload as the upstream system serves it.
pub fn raw_ingredients() -> Value {
    json!([
        {"Categoria": "Pan", "Opciones": [
            {"nombre": "simple", "tipo": "blanco", "Tamaño": 6, "unidad": "pulgadas"},
            {"nombre": "integral", "tipo": "integral", "Tamaño": 8, "unidad": "pulgadas", "stock": 3}
        ]},
        {"Categoria": "Salchicha", "Opciones": [
            {"nombre": "weiner", "tipo": "cerdo", "Tamaño": 6, "unidad": "pulgadas"}
        ]},
        {"Categoria": "Toppings", "Opciones": [
            {"nombre": "cebolla", "tipo": "vegetal", "Presentación": "picada"}
        ]},
        {"Categoria": "Salsa", "Opciones": [
            {"nombre": "mostaza", "base": "mostaza", "color": "amarillo"}
        ]},
        {"Categoria": "Acompañante", "Opciones": [
            {"nombre": "papas", "tipo": "frito", "Tamaño": 1, "unidad": "porcion"}
        ]}
    ])
}

/// Raw menu payload referencing ingredients by display name.
pub fn raw_menu() -> Value {
    json!([
        {
            "nombre": "especial",
            "Pan": "simple",
            "Salchicha": "weiner",
            "toppings": ["cebolla", "pepinillo"],
            "salsas": ["mostaza"],
            "Acompañante": "papas"
        },
        {
            "nombre": "sencillo",
            "pan": "simple",
            "salchicha": "weiner",
            "toppings": [],
            "salsas": [],
            "acompañante": null
        }
    ])
}

pub fn raw_source() -> StaticSource {
    StaticSource::new()
        .with("ingredientes.json", raw_ingredients())
        .with("menu.json", raw_menu())
}

/// Write both raw payloads as `<name>.json` under `dir`.
pub fn write_payloads(dir: &Path) -> Result<()> {
    for (name, payload) in [("ingredientes.json", raw_ingredients()), ("menu.json", raw_menu())] {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec_pretty(&payload)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Counts how often the wrapped source is asked for a payload.
pub struct CountingSource {
    inner: StaticSource,
    fetches: Cell<usize>,
}

impl CountingSource {
    pub fn new(inner: StaticSource) -> Self {
        Self {
            inner,
            fetches: Cell::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl Fetchable for CountingSource {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        self.fetches.set(self.fetches.get() + 1);
        self.inner.fetch(name, options)
    }
}

/// Private registry with the full catalog plugin set, sealed.
pub fn catalog_registry() -> MethodRegistry {
    let registry = MethodRegistry::new();
    plugins::install(&registry).expect("plugins install into a fresh registry");
    registry.seal();
    registry
}

/// Registry with only the two validators the Pan-over-Ingredient scenario needs.
pub fn scenario_registry() -> MethodRegistry {
    let registry = MethodRegistry::new();
    registry
        .register_validator("Ingredient", |entity| match entity.text("nombre") {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::new(
                entity.entity_type(),
                "nombre",
                "must not be empty",
            )),
        })
        .expect("registry is open");
    registry
        .register_validator("Pan", |entity| {
            match entity.get("tamano").and_then(Value::as_f64) {
                Some(size) if size > 0.0 => Ok(()),
                _ => Err(ValidationError::new(entity.entity_type(), "tamano", "must be positive")),
            }
        })
        .expect("registry is open");
    registry.seal();
    registry
}
