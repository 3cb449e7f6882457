//! Raw catalog payload handling.
//!
//! This module owns the leaf transformations every fetched payload goes
//! through before it becomes entities: deterministic identity assignment,
//! recursive key normalization, and schema inference over the normalized
//! shape. `fields` holds the tolerant field lookup the other stages share so a
//! stage works the same whether it runs before or after key normalization.

pub mod fields;
pub mod identity;
pub mod normalize;
pub mod schema;

pub use identity::{
    EntityId, IdentityFields, assign_identity, enrich_flat, enrich_grouped,
};
pub use normalize::{normalize_key, normalize_keys};
pub use schema::{
    CATEGORY_FIELD, DISPLAY_NAME_FIELD, ITEMS_FIELD, InferredSchema, META_FIELDS,
    category_attributes, find_common_attributes, infer_flat_schema, infer_grouped_schema,
    type_name_for_category,
};
