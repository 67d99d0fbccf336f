//! Show or write the effective configuration.

use anyhow::Context;
use tarantino_common::config::{config_file_path, AppConfig};

pub fn run(app: &AppConfig, init: bool) -> anyhow::Result<()> {
    if init {
        app.save()
            .with_context(|| format!("Failed to write {}", config_file_path().display()))?;
        println!("Wrote {}", config_file_path().display());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(app)?);
    Ok(())
}
