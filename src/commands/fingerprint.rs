use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::Context;

/// Print the fingerprint an apply would record for a SQL file
pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let content = read_input(file)?;
    let fingerprint = reconcile::fingerprint(&content);

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({ "file": file.display().to_string(), "fingerprint": fingerprint })
        );
    } else {
        println!("{fingerprint}");
    }
    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read SQL from stdin")?;
        return Ok(content);
    }
    fs::read_to_string(file).with_context(|| format!("Could not read {}", file.display()))
}
