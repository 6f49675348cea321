use super::Store;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use presence_core::config::{PresenceConfig, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the resolved tunables
    Show,

    /// Validate the tunables for common mistakes
    Validate,

    /// Write the default tunables to the --config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(store: &Store, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(store, json),
        ConfigSubcommand::Validate => validate(store, json),
        ConfigSubcommand::Init { force } => init(store, force),
    }
}

fn load(store: &Store) -> anyhow::Result<PresenceConfig> {
    match &store.config {
        Some(path) => PresenceConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PresenceConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(store: &Store, json: bool) -> anyhow::Result<()> {
    let config = load(store)?;
    if json {
        print_json(&config)?;
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(store: &Store, json: bool) -> anyhow::Result<()> {
    let config = load(store)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(store: &Store, force: bool) -> anyhow::Result<()> {
    let path: &Path = store
        .config
        .as_deref()
        .context("--config (or PRESENCE_CONFIG) is required")?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PresenceConfig::default()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
