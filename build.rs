use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=CATALOG_SOURCE_DIR_HINT");

    let hint = env::var("CATALOG_SOURCE_DIR_HINT").ok().or_else(|| {
        env::var("CARGO_MANIFEST_DIR")
            .ok()
            .map(|root| format!("{root}/data"))
    });

    if let Some(raw_hint) = hint {
        let candidate = PathBuf::from(raw_hint);
        let canonical = candidate.canonicalize().unwrap_or(candidate);

        println!(
            "cargo:rustc-env=CATALOG_SOURCE_DIR_HINT={}",
            canonical.display()
        );
    }
}
