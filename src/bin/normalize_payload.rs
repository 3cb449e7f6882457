//! Run one raw payload through the identity and key-normalization stages.
//!
//! Reads JSON (a document or NDJSON) from a file or stdin, assigns
//! deterministic identities in GROUPED layout (the default) or FLAT layout
//! (`--flat`), normalizes every key, and prints the result as JSON. Useful for
//! checking what the adapter chain will make of a payload before it is loaded.

use anyhow::{Context, Result, bail};
use catalogforge::catalog::{IdentityFields, enrich_flat, enrich_grouped, normalize_keys};
use catalogforge::{init_tracing, parse_payload};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::info;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse()?;
    let input = read_input(args.file.as_ref())?;
    let payload = parse_payload(&input)?;

    let fields = IdentityFields::default();
    let (enriched, modified) = if args.flat {
        enrich_flat(payload, &fields, args.namespace.as_deref())?
    } else {
        enrich_grouped(payload, &fields)?
    };
    if modified {
        info!("assigned missing identities");
    }
    let normalized = normalize_keys(enriched);

    let rendered = if args.compact {
        serde_json::to_string(&normalized)?
    } else {
        serde_json::to_string_pretty(&normalized)?
    };
    println!("{rendered}");
    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            if !path.is_file() {
                bail!("input file not found: {}", path.display());
            }
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

struct CliArgs {
    file: Option<PathBuf>,
    flat: bool,
    namespace: Option<String>,
    compact: bool,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        let mut args = env::args_os().skip(1);
        let mut file = None;
        let mut flat = false;
        let mut namespace = None;
        let mut compact = false;

        while let Some(arg_os) = args.next() {
            let arg = arg_os
                .into_string()
                .map_err(|_| anyhow::anyhow!("argument is not valid UTF-8"))?;
            match arg.as_str() {
                "--file" => file = Some(PathBuf::from(next_value(&mut args, "--file")?)),
                "--flat" => flat = true,
                "--namespace" => namespace = Some(next_value(&mut args, "--namespace")?),
                "--compact" => compact = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => bail!("unknown flag: {other}"),
            }
        }

        if namespace.is_some() && !flat {
            bail!("--namespace only applies with --flat");
        }

        Ok(CliArgs {
            file,
            flat,
            namespace,
            compact,
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
        "Usage: normalize-payload [--file PATH] [--flat [--namespace FIELD]] [--compact]\n\n\
Reads a payload (stdin by default), assigns identities and normalizes keys.\n\
--namespace names the field whose value namespaces each FLAT identity."
    );
}
