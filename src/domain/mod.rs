//! The hot-dog catalog: names, fallback schemas and pipeline assembly.
//!
//! Three catalogs make up the store. Ingredients arrive GROUPED by category
//! and get identities, normalized keys and stock defaults. The menu arrives
//! FLAT and additionally has its ingredient names resolved against the
//! enriched ingredient stream. Sales have no upstream source and a fixed
//! schema.

pub mod plugins;

use crate::catalog::schema::InferredSchema;
use crate::config::CatalogConfig;
use crate::entity::registry::MethodRegistry;
use crate::loader::{CatalogCollection, CatalogLoader, CatalogStore, payload_name};
use crate::source::{
    DefaultValueAdapter, Fetchable, IdentityAdapter, KeyNormalizationAdapter, ReferenceAdapter,
    ReferenceField,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const INGREDIENTS_CATALOG: &str = "ingredientes";
pub const MENU_CATALOG: &str = "menu";
pub const SALES_CATALOG: &str = "ventas";

pub const INGREDIENT_TYPE: &str = "Ingredient";
pub const HOTDOG_TYPE: &str = "HotDog";
pub const SALE_TYPE: &str = "Venta";

fn attrs(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Ingredient schema used when inference fails or finds no categories.
pub fn ingredient_fallback() -> InferredSchema {
    let sized = attrs(&["tipo", "tamano", "unidad"]);
    InferredSchema {
        common: attrs(&["nombre"]),
        specific: BTreeMap::from([
            ("Pan".to_string(), sized.clone()),
            ("Salchicha".to_string(), sized.clone()),
            ("Acompanante".to_string(), sized),
            ("Salsa".to_string(), attrs(&["base", "color"])),
            ("Toppings".to_string(), attrs(&["tipo", "presentacion"])),
        ]),
    }
}

/// Menu schema used when the menu sample is empty or inference fails.
pub fn hotdog_fallback() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(
        HOTDOG_TYPE.to_string(),
        attrs(&["nombre", "pan", "salchicha", "toppings", "salsas", "acompanante"]),
    )])
}

/// Sales are never inferred.
pub fn sale_schema() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(SALE_TYPE.to_string(), attrs(&["fecha", "items"]))])
}

/// Menu fields that name ingredients, with the category each one points into.
pub fn menu_reference_fields() -> Vec<ReferenceField> {
    vec![
        ReferenceField::single("pan", "Pan"),
        ReferenceField::single("salchicha", "Salchicha"),
        ReferenceField::list("toppings", "Toppings"),
        ReferenceField::list("salsas", "Salsa"),
        ReferenceField::single("acompanante", "Acompañante"),
    ]
}

/// The enriched upstream streams, ready to populate a store.
pub struct CatalogSources {
    /// Shared so the menu's reference stage reads the same enriched stream.
    pub ingredients: Rc<dyn Fetchable>,
    pub menu: Box<dyn Fetchable>,
}

impl CatalogSources {
    /// `(catalog, source)` pairs in the order they should be populated.
    pub fn named(&self) -> Vec<(&'static str, &dyn Fetchable)> {
        vec![
            (INGREDIENTS_CATALOG, self.ingredients.as_ref()),
            (MENU_CATALOG, self.menu.as_ref()),
        ]
    }
}

/// Assemble both adapter chains over one upstream source.
///
/// Ingredients: identity (grouped) -> key normalization -> stock defaults.
/// Menu: identity (flat) -> key normalization -> ingredient references.
pub fn build_sources(upstream: Rc<dyn Fetchable>, config: &CatalogConfig) -> CatalogSources {
    let ingredients: Rc<dyn Fetchable> = Rc::new(
        DefaultValueAdapter::new(
            KeyNormalizationAdapter::new(IdentityAdapter::grouped(Rc::clone(&upstream))),
            crate::entity::STOCK_FIELD,
            config.default_stock,
        )
        .with_category_defaults(config.stock_by_category.clone()),
    );
    let menu = ReferenceAdapter::new(
        KeyNormalizationAdapter::new(IdentityAdapter::flat(upstream)),
        Rc::clone(&ingredients),
        payload_name(INGREDIENTS_CATALOG),
        menu_reference_fields(),
    );
    CatalogSources {
        ingredients,
        menu: Box::new(menu),
    }
}

/// Ingredient collection with a shared `Ingredient` base over inferred categories.
pub fn load_ingredients(
    registry: &MethodRegistry,
    store: &dyn CatalogStore,
) -> Result<CatalogCollection> {
    let payload = store
        .get(INGREDIENTS_CATALOG)
        .with_context(|| format!("loading {INGREDIENTS_CATALOG}"))?;
    CatalogLoader::new(registry).load_grouped(
        INGREDIENTS_CATALOG,
        payload,
        INGREDIENT_TYPE,
        &ingredient_fallback(),
    )
}

pub fn load_menu(registry: &MethodRegistry, store: &dyn CatalogStore) -> Result<CatalogCollection> {
    let payload = store
        .get(MENU_CATALOG)
        .with_context(|| format!("loading {MENU_CATALOG}"))?;
    CatalogLoader::new(registry).load_flat(MENU_CATALOG, payload, HOTDOG_TYPE, &hotdog_fallback())
}

/// Sales collection; an unpopulated store yields an empty collection.
pub fn load_sales(registry: &MethodRegistry, store: &dyn CatalogStore) -> Result<CatalogCollection> {
    let payload = store.get(SALES_CATALOG).unwrap_or_else(|_| serde_json::json!([]));
    CatalogLoader::new(registry).load_fixed(SALES_CATALOG, payload, SALE_TYPE, &sale_schema())
}
