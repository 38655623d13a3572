//! `workshop init`: write the default config.

use anyhow::Context;
use std::fmt::Write;
use std::fs;

use workshop_config::EngineConfig;

pub fn run(config: &EngineConfig) -> anyhow::Result<String> {
    let path = config.config_path();
    let mut out = String::new();

    fs::create_dir_all(config.workbenches_dir())
        .with_context(|| format!("Failed to create {}", config.workbenches_dir().display()))?;

    if path.exists() {
        writeln!(out, "Config already exists at {}", path.display())?;
        writeln!(out, "Edit it manually or delete it and re-run init.")?;
    } else {
        fs::write(&path, EngineConfig::default_toml())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writeln!(out, "Created {}", path.display())?;
    }
    writeln!(out, "Workbenches live in {}", config.workbenches_dir().display())?;
    Ok(out)
}
