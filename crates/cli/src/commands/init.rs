//! `spendwise init`: write a default config file.

use anyhow::Context;
use spendwise_config::AppConfig;
use std::path::Path;

pub fn run(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Edit it, or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set api_key (or export GOOGLE_API_KEY)");
    println!("  2. Replace the demo user's token");
    println!("  3. Run: spendwise serve");
    Ok(())
}
