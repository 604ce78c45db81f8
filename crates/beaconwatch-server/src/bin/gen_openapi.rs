//! Writes the OpenAPI specification to `openapi.json` at the workspace root.
//!
//! Run with: cargo run --bin gen-openapi -p beaconwatch-server

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let json = beaconwatch_server::api::get_openapi_json()?;

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .context("could not find the workspace root")?;
    let output_path = workspace_root.join("openapi.json");

    fs::write(&output_path, &json)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    println!("Written to: {}", output_path.display());

    let spec: serde_json::Value = serde_json::from_str(&json)?;
    if let Some(paths) = spec["paths"].as_object() {
        println!("Paths: {}", paths.len());
    }
    if let Some(schemas) = spec["components"]["schemas"].as_object() {
        println!("Schemas: {}", schemas.len());
    }
    Ok(())
}
