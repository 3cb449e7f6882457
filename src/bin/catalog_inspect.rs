//! Load every catalog from a directory of raw payloads and describe it.
//!
//! Runs the full pipeline once: enrich the raw files through the adapter
//! chains, populate an in-memory store, bootstrap the behavior registry, and
//! load each catalog. Prints a JSON object keyed by catalog name holding each
//! collection's summary (types, origin of the schema, per-category counts).
//! Logs go to stderr; `RUST_LOG` controls verbosity.

use anyhow::{Context, Result, bail};
use catalogforge::domain::{
    self, INGREDIENTS_CATALOG, MENU_CATALOG, SALES_CATALOG, build_sources, plugins,
};
use catalogforge::{CatalogConfig, DirectorySource, Fetchable, MemoryStore, init_tracing, populate};
use serde_json::{Map, Value};
use std::env;
use std::path::PathBuf;
use std::rc::Rc;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse()?;

    let mut config = CatalogConfig::from_env()?;
    if let Some(dir) = args.source_dir {
        config.source_dir = dir;
    }
    if !config.source_dir.is_dir() {
        bail!(
            "source directory {} does not exist. Set CATALOG_SOURCE_DIR or pass --source-dir.",
            config.source_dir.display()
        );
    }

    let upstream: Rc<dyn Fetchable> = Rc::new(DirectorySource::new(&config.source_dir));
    let sources = build_sources(upstream, &config);
    let mut store = MemoryStore::new();
    populate(&mut store, &sources.named(), &config.fetch_options(), false)?;

    let registry = plugins::bootstrap()?;
    let collections = [
        domain::load_ingredients(registry, &store)?,
        domain::load_menu(registry, &store)?,
        domain::load_sales(registry, &store)?,
    ];

    let mut report = Map::new();
    for collection in &collections {
        if args
            .catalogs
            .as_ref()
            .is_some_and(|wanted| !wanted.iter().any(|name| name == collection.name()))
        {
            continue;
        }
        let summary = serde_json::to_value(collection.summary())
            .with_context(|| format!("serializing summary of {}", collection.name()))?;
        report.insert(collection.name().to_string(), summary);
    }

    let report = Value::Object(report);
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");
    Ok(())
}

struct CliArgs {
    source_dir: Option<PathBuf>,
    catalogs: Option<Vec<String>>,
    pretty: bool,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        let mut args = env::args_os().skip(1);
        let mut source_dir = None;
        let mut catalogs: Option<Vec<String>> = None;
        let mut pretty = false;

        while let Some(arg_os) = args.next() {
            let arg = arg_os
                .into_string()
                .map_err(|_| anyhow::anyhow!("argument is not valid UTF-8"))?;
            match arg.as_str() {
                "--source-dir" => {
                    source_dir = Some(PathBuf::from(next_value(&mut args, "--source-dir")?));
                }
                "--catalog" => {
                    let name = next_value(&mut args, "--catalog")?;
                    if ![INGREDIENTS_CATALOG, MENU_CATALOG, SALES_CATALOG].contains(&name.as_str())
                    {
                        bail!(
                            "unknown catalog '{name}' (expected {INGREDIENTS_CATALOG}|{MENU_CATALOG}|{SALES_CATALOG})"
                        );
                    }
                    catalogs.get_or_insert_with(Vec::new).push(name);
                }
                "--pretty" => pretty = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => bail!("unknown flag: {other}"),
            }
        }

        Ok(CliArgs {
            source_dir,
            catalogs,
            pretty,
        })
    }
}

fn next_value(args: &mut impl Iterator<Item = std::ffi::OsString>, flag: &str) -> Result<String> {
    args.next()
        .map(|os| {
            os.into_string()
                .map_err(|_| anyhow::anyhow!("value for {flag} is not valid UTF-8"))
        })
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn print_usage() {
    eprintln!(
        "Usage: catalog-inspect [--source-dir DIR] [--catalog NAME]... [--pretty]\n\n\
Reads ingredientes.json and menu.json from DIR (default: $CATALOG_SOURCE_DIR),\n\
loads every catalog and prints a JSON summary per catalog."
    );
}
