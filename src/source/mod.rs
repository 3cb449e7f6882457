//! The "fetch a named payload" capability and the sources that provide it.
//!
//! Everything upstream of the adapter chain implements [`Fetchable`]. Adapters
//! in [`adapters`] wrap a fetchable, delegate, and transform exactly one
//! aspect of the result, so chains compose by nesting. Transport retries and
//! timeouts belong to the concrete source; the options are only forwarded.

pub mod adapters;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub use adapters::{
    DefaultValueAdapter, IdentityAdapter, IdentityLayout, KeyNormalizationAdapter,
    ReferenceAdapter, ReferenceField, ReferenceKind, ReferenceLookup,
};

/// Transport parameters forwarded untouched through the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Anything that can produce a JSON payload by name.
pub trait Fetchable {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value>;
}

impl<T: Fetchable + ?Sized> Fetchable for &T {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        (**self).fetch(name, options)
    }
}

impl<T: Fetchable + ?Sized> Fetchable for Box<T> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        (**self).fetch(name, options)
    }
}

impl<T: Fetchable + ?Sized> Fetchable for Rc<T> {
    fn fetch(&self, name: &str, options: &FetchOptions) -> Result<Value> {
        (**self).fetch(name, options)
    }
}

/// In-memory payloads keyed by name; every fetch hands out a fresh copy.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    payloads: BTreeMap<String, Value>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, payload: Value) -> Self {
        self.insert(name, payload);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, payload: Value) {
        self.payloads.insert(name.into(), payload);
    }
}

impl Fetchable for StaticSource {
    fn fetch(&self, name: &str, _options: &FetchOptions) -> Result<Value> {
        self.payloads
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("payload '{name}' not found"))
    }
}

/// Reads `<root>/<name>` as JSON.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Fetchable for DirectorySource {
    fn fetch(&self, name: &str, _options: &FetchOptions) -> Result<Value> {
        let path = self.root.join(name);
        let data =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("File {} does not contain valid JSON", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn static_source_returns_copies_and_errors_on_unknown_names() {
        let source = StaticSource::new().with("menu.json", json!([{"nombre": "simple"}]));
        let options = FetchOptions::default();
        let mut first = source.fetch("menu.json", &options).unwrap();
        first[0]["nombre"] = json!("changed");
        let second = source.fetch("menu.json", &options).unwrap();
        assert_eq!(second[0]["nombre"], json!("simple"));

        let err = source.fetch("ventas.json", &options).unwrap_err();
        assert!(err.to_string().contains("ventas.json"));
    }

    #[test]
    fn directory_source_reads_json_files() {
        let temp = TempDir::new().expect("temp dir");
        std::fs::write(
            temp.path().join("ingredientes.json"),
            r#"[{"Categoria": "Pan", "Opciones": []}]"#,
        )
        .unwrap();
        std::fs::write(temp.path().join("broken.json"), "{not json").unwrap();

        let source = DirectorySource::new(temp.path());
        let options = FetchOptions::with_timeout(Duration::from_secs(1));
        let payload = source.fetch("ingredientes.json", &options).unwrap();
        assert_eq!(payload[0]["Categoria"], json!("Pan"));

        let err = source.fetch("broken.json", &options).unwrap_err();
        assert!(format!("{err:#}").contains("valid JSON"));
        assert!(source.fetch("missing.json", &options).is_err());
    }

    #[test]
    fn shared_handles_delegate_to_the_same_source() {
        let source: Rc<dyn Fetchable> =
            Rc::new(StaticSource::new().with("menu.json", json!([])));
        let boxed: Box<dyn Fetchable> = Box::new(Rc::clone(&source));
        assert_eq!(
            boxed.fetch("menu.json", &FetchOptions::default()).unwrap(),
            json!([])
        );
    }
}
